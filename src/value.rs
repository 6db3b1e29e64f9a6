//! A bounded slot inside a bytecode, filled by a resolved expression
//! during `output` (spec §4.5 / C5).

use crate::bytecode::Location;
use crate::error::AsmError;
use crate::expr::{Expr, Op, TermKind};
use crate::symbol::{SymbolId, SymbolTable};

/// A deferred write into a bytecode's `fixed` bytes.
///
/// Before [`Value::finalize`] runs, `abs` holds the whole expression.
/// After, per spec §3 invariant, exactly one of `{pure_abs, rel(+anchor)(+wrt)}`
/// holds: either `rel` is `None` and `abs` is the whole value, or `rel` is
/// `Some` and `abs` holds only the residual integer/register-free part.
#[derive(Clone, Debug)]
pub struct Value {
    pub size: u32,
    pub signed: bool,
    pub jump_target: bool,
    pub ip_rel: bool,
    pub curpos_rel: bool,
    pub seg_of: bool,
    pub rshift: u32,
    /// Bytes from the end of this value to the end of the instruction —
    /// used to bias IP-relative fixups (spec §4.4.1, `output`).
    pub next_insn: u32,

    abs: Option<Expr>,
    rel: Option<SymbolId>,
    /// Subtract anchor: the second half of a `sym_a - sym_b` pair that
    /// didn't collapse into an absolute difference (spec §4.5 step 2).
    anchor: Option<Location>,
    wrt: Option<SymbolId>,
}

impl Value {
    pub fn new(size: u32, abs: Expr) -> Self {
        Value {
            size,
            signed: false,
            jump_target: false,
            ip_rel: false,
            curpos_rel: false,
            seg_of: false,
            rshift: 0,
            next_insn: 0,
            abs: Some(abs),
            rel: None,
            anchor: None,
            wrt: None,
        }
    }

    pub fn rel(&self) -> Option<SymbolId> {
        self.rel
    }

    pub fn anchor(&self) -> Option<Location> {
        self.anchor
    }

    pub fn wrt(&self) -> Option<SymbolId> {
        self.wrt
    }

    pub fn abs(&self) -> Option<&Expr> {
        self.abs.as_ref()
    }

    pub fn is_pure_abs(&self) -> bool {
        self.rel.is_none() && self.anchor.is_none() && self.wrt.is_none()
    }

    /// Inline any EQU-typed symbol this value's expression still refers to
    /// (spec §4.3, §9: EQU usages are substituted, after cycle check,
    /// before the value is finalized). A no-op once `finalize` has already
    /// consumed `abs`.
    pub fn expand_equ(&mut self, symbols: &SymbolTable) -> Result<(), AsmError> {
        if let Some(expr) = self.abs.as_mut() {
            symbols.expand_equ(expr)?;
        }
        Ok(())
    }

    /// Separate a finalized expression into absolute / relative /
    /// subtract-anchor parts (spec §4.5, algorithm sketch).
    pub fn finalize(&mut self, _loc: Location) -> Result<(), AsmError> {
        let mut expr = match self.abs.take() {
            Some(e) => e,
            None => return Ok(()),
        };
        expr.simplify(true);

        // step 4: top-level SEGOFF extracts the segment.
        if expr.is_op(Op::SegOff) && !self.seg_of {
            let children = expr.children();
            if children.len() == 2 {
                self.seg_of = true;
                expr = children[0].clone();
            }
        }

        // step 3: top-level WRT extracts the WRT symbol.
        if expr.is_op(Op::Wrt) {
            let children = expr.children();
            if children.len() == 2 {
                if let Some(sym) = children[1].get_symbol() {
                    self.wrt = Some(sym);
                    expr = children[0].clone();
                } else {
                    return Err(AsmError::TooComplex);
                }
            }
        }

        // step 5: `rel >> const` becomes rshift.
        if expr.is_op(Op::Shr) {
            let children = expr.children();
            if children.len() == 2 {
                if let Some(n) = children[1].get_intnum() {
                    if let Ok(shift) = n.get_i64() {
                        self.rshift = shift.max(0) as u32;
                        expr = children[0].clone();
                    }
                }
            }
        }

        // seg_of and rshift together are forbidden on every value, not
        // just jump targets (DESIGN.md open question 2).
        if self.seg_of && self.rshift != 0 {
            return Err(AsmError::TooComplex);
        }

        // pure absolute: no symbol/location anywhere and fits as-is.
        let sym_count = count_relative_terms(&expr);
        match sym_count {
            0 => {
                self.abs = Some(expr);
                Ok(())
            }
            1 => {
                let (rel, anchor, residual) = extract_single_relative(expr)?;
                self.rel = rel;
                self.anchor = anchor;
                self.abs = residual;
                Ok(())
            }
            2 => {
                let (rel, anchor, residual) = extract_paired_relative(expr)?;
                self.rel = rel;
                self.anchor = anchor;
                self.abs = residual;
                Ok(())
            }
            _ => Err(AsmError::TooComplex),
        }
    }
}

fn count_relative_terms(e: &Expr) -> usize {
    e.terms()
        .iter()
        .filter(|t| matches!(t.kind, TermKind::Symbol(_) | TermKind::Location(_)))
        .count()
}

/// Exactly one symbol/location survives: it becomes `rel`, and whatever
/// remains (after subtracting it back out) becomes the residual absolute
/// part, or `None` if nothing remains.
fn extract_single_relative(
    expr: Expr,
) -> Result<(Option<SymbolId>, Option<Location>, Option<Expr>), AsmError> {
    if let Some(sym) = expr.get_symbol() {
        return Ok((Some(sym), None, None));
    }
    // a bare bytecode-local location (the common case for a same-section
    // jump target) becomes the anchor, with no residual.
    if let Some(loc) = expr.get_location() {
        return Ok((None, Some(loc), None));
    }
    // the symbol/location is buried inside an ADD tree; pull it out of
    // the children and leave the rest as the absolute residual.
    if expr.is_op(Op::Add) {
        let children = expr.children();
        let mut rel = None;
        let mut anchor = None;
        let mut rest: Vec<Expr> = Vec::new();
        for c in children {
            if rel.is_none() && anchor.is_none() {
                if let Some(sym) = c.get_symbol() {
                    rel = Some(sym);
                    continue;
                }
                if let Some(loc) = c.get_location() {
                    anchor = Some(loc);
                    continue;
                }
            }
            rest.push(c);
        }
        let residual = fold_add(rest);
        return Ok((rel, anchor, residual));
    }
    Err(AsmError::TooComplex)
}

/// Two symbols/locations survive: they must form `sym_a - sym_b` (spec
/// §4.5 step 2, `is_neg1_sym`), collapsing into a relative-minus-anchor
/// pair (same-section differences are folded to an absolute integer by
/// the backend once both offsets are known, not here).
fn extract_paired_relative(
    expr: Expr,
) -> Result<(Option<SymbolId>, Option<Location>, Option<Expr>), AsmError> {
    if !expr.is_op(Op::Add) {
        return Err(AsmError::TooComplex);
    }
    let children = expr.children();
    let mut rel = None;
    let mut anchor = None;
    let mut rest = Vec::new();
    for c in children {
        if let Some(sym) = c.get_symbol() {
            if rel.is_none() {
                rel = Some(sym);
            } else {
                return Err(AsmError::TooComplex);
            }
            continue;
        }
        if is_neg1_times_location(&c) {
            if let Some(loc) = negated_location(&c) {
                anchor = Some(loc);
                continue;
            }
        }
        rest.push(c);
    }
    let residual = fold_add(rest);
    Ok((rel, anchor, residual))
}

fn is_neg1_times_location(e: &Expr) -> bool {
    if !e.is_op(Op::Mul) {
        return false;
    }
    let children = e.children();
    children.len() == 2
        && children
            .iter()
            .any(|c| matches!(c.get_intnum(), Some(n) if n.get_i64() == Ok(-1)))
        && children.iter().any(|c| {
            c.terms()
                .last()
                .map(|t| matches!(t.kind, TermKind::Location(_)))
                .unwrap_or(false)
        })
}

fn negated_location(e: &Expr) -> Option<Location> {
    let children = e.children();
    children.iter().find_map(|c| match c.terms().last() {
        Some(t) => match t.kind {
            TermKind::Location(loc) => Some(loc),
            _ => None,
        },
        None => None,
    })
}

fn fold_add(mut parts: Vec<Expr>) -> Option<Expr> {
    if parts.is_empty() {
        return None;
    }
    if parts.len() == 1 {
        return Some(parts.pop().unwrap());
    }
    let mut acc = parts.pop().unwrap();
    while let Some(p) = parts.pop() {
        acc = Expr::binary(Op::Add, p, acc);
    }
    acc.simplify(true);
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::BytecodeId;
    use crate::intnum::IntNum;

    #[test]
    fn pure_absolute_stays_abs() {
        let mut v = Value::new(32, Expr::from_int(IntNum::from_i64(7)));
        v.finalize(Location::new(BytecodeId::from_u32(0), 0)).unwrap();
        assert!(v.is_pure_abs());
        assert_eq!(v.abs().unwrap().get_intnum().unwrap().get_i64().unwrap(), 7);
    }

    #[test]
    fn single_symbol_becomes_relative() {
        let mut table = crate::symbol::SymbolTable::new();
        let sym = table.get_or_insert("foo");
        let mut v = Value::new(32, Expr::from_symbol(sym));
        v.finalize(Location::new(BytecodeId::from_u32(0), 0)).unwrap();
        assert_eq!(v.rel(), Some(sym));
        assert!(v.abs().is_none());
    }

    #[test]
    fn seg_of_and_rshift_together_is_too_complex() {
        let mut v = Value::new(32, Expr::from_int(IntNum::from_i64(1)));
        v.seg_of = true;
        v.rshift = 4;
        let err = v.finalize(Location::new(BytecodeId::from_u32(0), 0)).unwrap_err();
        assert!(matches!(err, AsmError::TooComplex));
    }

    #[test]
    fn equ_symbol_expands_before_finalize() {
        let mut table = crate::symbol::SymbolTable::new();
        let x = table.get_or_insert("x");
        table
            .define_equ_checked(x, Expr::from_int(IntNum::from_i64(7)), crate::sourceloc::SourceLoc::new(1))
            .unwrap();
        let mut v = Value::new(32, Expr::from_symbol(x));
        v.expand_equ(&table).unwrap();
        v.finalize(Location::new(BytecodeId::from_u32(0), 0)).unwrap();
        assert!(v.is_pure_abs());
        assert_eq!(v.abs().unwrap().get_intnum().unwrap().get_i64().unwrap(), 7);
    }
}
