//! Arbitrary-precision integers with a small-value fast path (spec §4.1).
//!
//! Values that fit in an `i64` are kept inline (`Repr::Small`); only
//! operations whose result overflows `i64` promote to an arbitrary-precision
//! `BigInt` (`Repr::Big`). This mirrors the `INTNUM_L`/`INTNUM_BV` split in
//! the original `IntNum`/`ExprTerm` implementation without hand-rolling a
//! bignum: `num-bigint` already implements two's-complement bitwise and
//! shift operators on signed values, which is exactly the semantics
//! `extract`/`shl`/`shr` need.

use crate::error::AsmError;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;

/// Maximum shift distance. Larger counts can't correspond to anything a
/// real assembly expression should produce and are rejected rather than
/// building multi-gigabyte `BigInt`s.
const MAX_SHIFT: u32 = 1 << 20;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Repr {
    Small(i64),
    Big(BigInt),
}

/// An arbitrary-precision signed integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntNum(Repr);

impl IntNum {
    pub fn from_i64(v: i64) -> Self {
        IntNum(Repr::Small(v))
    }

    pub fn from_u64(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => IntNum(Repr::Small(v)),
            Err(_) => IntNum(Repr::Big(BigInt::from(v))),
        }
    }

    pub fn zero() -> Self {
        IntNum(Repr::Small(0))
    }

    pub fn one() -> Self {
        IntNum(Repr::Small(1))
    }

    fn from_big(v: BigInt) -> Self {
        match v.to_i64() {
            Some(small) => IntNum(Repr::Small(small)),
            None => IntNum(Repr::Big(v)),
        }
    }

    fn as_big(&self) -> BigInt {
        match &self.0 {
            Repr::Small(v) => BigInt::from(*v),
            Repr::Big(v) => v.clone(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match &self.0 {
            Repr::Small(v) => *v == 0,
            Repr::Big(v) => v.is_zero(),
        }
    }

    /// -1, 0, or 1.
    pub fn sign(&self) -> i32 {
        match &self.0 {
            Repr::Small(v) => match v.cmp(&0) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            },
            Repr::Big(v) => {
                if v.is_negative() {
                    -1
                } else if v.is_zero() {
                    0
                } else {
                    1
                }
            }
        }
    }

    /// Convert to a host `i64`, failing if the value doesn't fit.
    pub fn get_i64(&self) -> Result<i64, AsmError> {
        match &self.0 {
            Repr::Small(v) => Ok(*v),
            Repr::Big(v) => v.to_i64().ok_or(AsmError::IntNumOverflow),
        }
    }

    /// Convert to a host `u64`, failing on overflow or a negative value.
    pub fn get_u64(&self) -> Result<u64, AsmError> {
        if self.sign() < 0 {
            return Err(AsmError::IntNumOverflow);
        }
        match &self.0 {
            Repr::Small(v) => u64::try_from(*v).map_err(|_| AsmError::IntNumOverflow),
            Repr::Big(v) => v.to_u64().ok_or(AsmError::IntNumOverflow),
        }
    }

    pub fn to_str_radix(&self, radix: u32) -> String {
        debug_assert!(matches!(radix, 2 | 8 | 10 | 16), "unsupported radix");
        self.as_big().to_str_radix(radix)
    }

    // -- binary arithmetic --------------------------------------------

    pub fn add(&self, rhs: &IntNum) -> IntNum {
        if let (Repr::Small(a), Repr::Small(b)) = (&self.0, &rhs.0) {
            if let Some(r) = a.checked_add(*b) {
                return IntNum(Repr::Small(r));
            }
        }
        IntNum::from_big(self.as_big() + rhs.as_big())
    }

    pub fn sub(&self, rhs: &IntNum) -> IntNum {
        if let (Repr::Small(a), Repr::Small(b)) = (&self.0, &rhs.0) {
            if let Some(r) = a.checked_sub(*b) {
                return IntNum(Repr::Small(r));
            }
        }
        IntNum::from_big(self.as_big() - rhs.as_big())
    }

    pub fn mul(&self, rhs: &IntNum) -> IntNum {
        if let (Repr::Small(a), Repr::Small(b)) = (&self.0, &rhs.0) {
            if let Some(r) = a.checked_mul(*b) {
                return IntNum(Repr::Small(r));
            }
        }
        IntNum::from_big(self.as_big() * rhs.as_big())
    }

    pub fn neg(&self) -> IntNum {
        if let Repr::Small(a) = &self.0 {
            if let Some(r) = a.checked_neg() {
                return IntNum(Repr::Small(r));
            }
        }
        IntNum::from_big(-self.as_big())
    }

    pub fn not(&self) -> IntNum {
        IntNum::from_big(!self.as_big())
    }

    /// Unsigned division, truncating toward zero on the magnitude (the
    /// unsigned interpretation of both operands).
    pub fn div(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        if rhs.is_zero() {
            return Err(AsmError::DivideByZero);
        }
        let a = self.as_big().magnitude().clone();
        let b = rhs.as_big().magnitude().clone();
        Ok(IntNum::from_big(BigInt::from_biguint(Sign::Plus, a / b)))
    }

    /// Signed division, truncating toward zero.
    pub fn signdiv(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        if rhs.is_zero() {
            return Err(AsmError::DivideByZero);
        }
        Ok(IntNum::from_big(self.as_big() / rhs.as_big()))
    }

    pub fn modulo(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        if rhs.is_zero() {
            return Err(AsmError::DivideByZero);
        }
        let a = self.as_big().magnitude().clone();
        let b = rhs.as_big().magnitude().clone();
        Ok(IntNum::from_big(BigInt::from_biguint(Sign::Plus, a % b)))
    }

    pub fn signmod(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        if rhs.is_zero() {
            return Err(AsmError::DivideByZero);
        }
        Ok(IntNum::from_big(self.as_big() % rhs.as_big()))
    }

    pub fn shl(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        let amt = shift_amount(rhs)?;
        Ok(IntNum::from_big(self.as_big() << amt))
    }

    pub fn shr(&self, rhs: &IntNum) -> Result<IntNum, AsmError> {
        let amt = shift_amount(rhs)?;
        Ok(IntNum::from_big(self.as_big() >> amt))
    }

    pub fn bitand(&self, rhs: &IntNum) -> IntNum {
        IntNum::from_big(self.as_big() & rhs.as_big())
    }

    pub fn bitor(&self, rhs: &IntNum) -> IntNum {
        IntNum::from_big(self.as_big() | rhs.as_big())
    }

    pub fn bitxor(&self, rhs: &IntNum) -> IntNum {
        IntNum::from_big(self.as_big() ^ rhs.as_big())
    }

    pub fn nor(&self, rhs: &IntNum) -> IntNum {
        self.bitor(rhs).not()
    }

    pub fn xnor(&self, rhs: &IntNum) -> IntNum {
        self.bitxor(rhs).not()
    }

    // -- relational / logical, all return 0 or 1 -----------------------

    pub fn lt(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self.as_big() < rhs.as_big())
    }
    pub fn le(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self.as_big() <= rhs.as_big())
    }
    pub fn gt(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self.as_big() > rhs.as_big())
    }
    pub fn ge(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self.as_big() >= rhs.as_big())
    }
    pub fn eq_(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self == rhs)
    }
    pub fn ne_(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(self != rhs)
    }

    pub fn lnot(&self) -> IntNum {
        bool_to_intnum(self.is_zero())
    }
    pub fn land(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(!self.is_zero() && !rhs.is_zero())
    }
    pub fn lor(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(!self.is_zero() || !rhs.is_zero())
    }
    pub fn lxor(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(!self.is_zero() != !rhs.is_zero())
    }
    pub fn lnor(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(!(!self.is_zero() || !rhs.is_zero()))
    }
    pub fn lxnor(&self, rhs: &IntNum) -> IntNum {
        bool_to_intnum(!self.is_zero() == !rhs.is_zero())
    }

    /// Ternary: `self != 0 ? t : f`.
    pub fn cond(&self, t: &IntNum, f: &IntNum) -> IntNum {
        if self.is_zero() {
            f.clone()
        } else {
            t.clone()
        }
    }

    /// Extract `width` bits starting at bit `shift`, as an unsigned value.
    pub fn extract(&self, width: u32, shift: u32) -> Result<IntNum, AsmError> {
        if shift >= MAX_SHIFT || width >= MAX_SHIFT {
            return Err(AsmError::ShiftOutOfRange);
        }
        let shifted = self.as_big() >> shift;
        let mask = (BigInt::from(1) << width) - BigInt::from(1);
        Ok(IntNum::from_big(shifted & mask))
    }
}

fn shift_amount(rhs: &IntNum) -> Result<u32, AsmError> {
    let v = rhs.get_i64().map_err(|_| AsmError::ShiftOutOfRange)?;
    if v < 0 || v as u64 > MAX_SHIFT as u64 {
        return Err(AsmError::ShiftOutOfRange);
    }
    Ok(v as u32)
}

fn bool_to_intnum(b: bool) -> IntNum {
    IntNum::from_i64(if b { 1 } else { 0 })
}

impl PartialOrd for IntNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IntNum {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Repr::Small(a), Repr::Small(b)) = (&self.0, &other.0) {
            return a.cmp(b);
        }
        self.as_big().cmp(&other.as_big())
    }
}

impl fmt::Display for IntNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            Repr::Small(v) => write!(f, "{v}"),
            Repr::Big(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for IntNum {
    fn from(v: i64) -> Self {
        IntNum::from_i64(v)
    }
}

impl From<i32> for IntNum {
    fn from(v: i32) -> Self {
        IntNum::from_i64(v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_path_stays_small_until_overflow() {
        let a = IntNum::from_i64(i64::MAX);
        let b = IntNum::from_i64(1);
        let sum = a.add(&b);
        assert_eq!(sum.get_i64(), Err(AsmError::IntNumOverflow));
        assert_eq!(sum.to_str_radix(10), "9223372036854775808");
    }

    #[test]
    fn div_by_zero() {
        let a = IntNum::from_i64(10);
        let z = IntNum::zero();
        assert_eq!(a.div(&z), Err(AsmError::DivideByZero));
        assert_eq!(a.signdiv(&z), Err(AsmError::DivideByZero));
    }

    #[test]
    fn sign_queries() {
        assert_eq!(IntNum::from_i64(-5).sign(), -1);
        assert_eq!(IntNum::zero().sign(), 0);
        assert_eq!(IntNum::from_i64(5).sign(), 1);
    }

    #[test]
    fn extract_bitfield() {
        // 0b1011_0100, extract width=4 shift=4 -> 0b1011 = 11
        let v = IntNum::from_i64(0b1011_0100);
        let e = v.extract(4, 4).unwrap();
        assert_eq!(e.get_u64().unwrap(), 0b1011);
    }

    #[test]
    fn signed_vs_unsigned_division_differ_on_sign() {
        let a = IntNum::from_i64(-7);
        let b = IntNum::from_i64(2);
        // unsigned treats both as magnitudes: 7 / 2 = 3
        assert_eq!(a.div(&b).unwrap().get_i64().unwrap(), 3);
        // signed truncates toward zero: -7 / 2 = -3
        assert_eq!(a.signdiv(&b).unwrap().get_i64().unwrap(), -3);
    }

    #[test]
    fn logical_ops_are_boolean() {
        let t = IntNum::from_i64(5);
        let z = IntNum::zero();
        assert_eq!(t.land(&z).get_i64().unwrap(), 0);
        assert_eq!(t.lor(&z).get_i64().unwrap(), 1);
        assert_eq!(t.lnot().get_i64().unwrap(), 0);
        assert_eq!(z.lnot().get_i64().unwrap(), 1);
    }

    #[test]
    fn big_values_round_trip_through_string() {
        let big = IntNum::from_i64(i64::MAX).mul(&IntNum::from_i64(4));
        assert!(big.get_i64().is_err());
        let s = big.to_str_radix(16);
        assert!(!s.is_empty());
    }
}
