//! The bytecode container (spec §4.4 / C4): fixed bytes, fixups, a tail
//! generator, and a `multiple` repeat count.
//!
//! `Contents` replaces the original's class hierarchy and virtual
//! `clone()` with a tagged enum (spec §9, "Polymorphic contents"), the
//! same trade Cranelift's `InstructionData` makes for opcodes instead of
//! a `Box<dyn Instruction>` per instruction.

use crate::contents::Contents;
use crate::error::AsmError;
use crate::expr::Expr;
use crate::sourceloc::SourceLoc;
use crate::span::SpanId;
use crate::value::Value;
use cranelift_entity::entity_impl;
use smallvec::SmallVec;

/// A dense reference to a [`Bytecode`] within its owning section.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeId(u32);
entity_impl!(BytecodeId, "bc");

/// Address within a section, as `(bytecode, offset within its fixed
/// bytes)`. Valid only once its bytecode has been placed (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub bc: BytecodeId,
    pub offset: u32,
}

impl Location {
    pub fn new(bc: BytecodeId, offset: u32) -> Self {
        Location { bc, offset }
    }
}

/// A deferred write into `fixed`, recorded by `append_fixed`.
#[derive(Clone, Debug)]
pub struct Fixup {
    pub off: u32,
    pub value: Value,
    pub loc: SourceLoc,
}

/// Sentinel offset for a not-yet-placed bytecode (spec §3: "before
/// optimization, `offset` is sentinel-invalid").
pub const UNKNOWN_OFFSET: u64 = u64::MAX;

/// A contiguous unit of output: fixed bytes + fixups + optional
/// polymorphic tail, repeated `multiple` times (spec §3, Entity:
/// Bytecode).
#[derive(Clone, Debug)]
pub struct Bytecode {
    pub contents: Option<Contents>,
    pub fixed: Vec<u8>,
    pub fixups: SmallVec<[Fixup; 2]>,
    pub multiple: Option<Expr>,
    pub mult_int: i64,
    pub len: u64,
    pub offset: u64,
    pub line: u32,
    pub index: u32,
    pub loc: SourceLoc,
}

impl Bytecode {
    pub fn new(line: u32) -> Self {
        Bytecode {
            contents: None,
            fixed: Vec::new(),
            fixups: SmallVec::new(),
            multiple: None,
            mult_int: 1,
            len: 0,
            offset: UNKNOWN_OFFSET,
            line,
            index: 0,
            loc: SourceLoc::default(),
        }
    }

    pub fn transform(&mut self, contents: Contents) {
        self.contents = Some(contents);
    }

    pub fn set_multiple(&mut self, e: Expr) {
        self.multiple = Some(e);
    }

    pub fn multiply_multiple(&mut self, e: Expr) {
        self.multiple = Some(match self.multiple.take() {
            Some(cur) => Expr::binary(crate::expr::Op::Mul, cur, e),
            None => e,
        });
    }

    /// Write `size/8` zero bytes into `fixed` and record a fixup for the
    /// value that will eventually fill them (spec §4.4, Construction).
    pub fn append_fixed(&mut self, value: Value, loc: SourceLoc) {
        let off = self.fixed.len() as u32;
        self.fixed.resize(self.fixed.len() + (value.size as usize) / 8, 0);
        self.fixups.push(Fixup { off, value, loc });
    }

    /// Inline any EQU-typed symbol still referenced by this bytecode's
    /// fixups, `multiple` count, or contents, before `finalize` classifies
    /// those expressions (spec §4.3 / §9, EQU-expansion pass).
    pub fn expand_equ(&mut self, symbols: &crate::symbol::SymbolTable) -> Result<(), AsmError> {
        for fixup in self.fixups.iter_mut() {
            fixup.value.expand_equ(symbols)?;
        }
        if let Some(multiple) = self.multiple.as_mut() {
            symbols.expand_equ(multiple)?;
        }
        if let Some(contents) = &mut self.contents {
            contents.expand_equ(symbols)?;
        }
        Ok(())
    }

    /// Finalize every fixup, then the contents, then the `multiple`
    /// expression (spec §4.4, `finalize`).
    pub fn finalize(&mut self, self_id: BytecodeId) -> Result<(), AsmError> {
        for fixup in self.fixups.iter_mut() {
            let loc = Location::new(self_id, fixup.off);
            fixup.value.finalize(loc)?;
            if fixup.value.jump_target
                && (fixup.value.seg_of || fixup.value.rshift != 0 || fixup.value.curpos_rel)
            {
                return Err(AsmError::InvalidJumpTarget);
            }
            if fixup.value.jump_target {
                fixup.value.curpos_rel = true;
            }
        }

        if let Some(contents) = &mut self.contents {
            contents.finalize(self_id, &self.fixed)?;
        }

        if let Some(multiple) = self.multiple.take() {
            let mut val = Value::new(0, multiple);
            val.finalize(Location::new(self_id, 0))?;
            match val.abs() {
                Some(abs) if val.is_pure_abs() => {
                    if let Some(n) = abs.get_intnum() {
                        self.multiple = Some(Expr::from_int(n.clone()));
                    } else if abs.get_float().is_some() {
                        return Err(AsmError::MultipleContainsFloat);
                    } else {
                        return Err(AsmError::MultipleNotAbsolute);
                    }
                }
                None if val.is_pure_abs() => {
                    // semantic zero
                    self.multiple = Some(Expr::from_int(crate::intnum::IntNum::zero()));
                }
                _ => return Err(AsmError::MultipleNotAbsolute),
            }
        }
        Ok(())
    }

    /// Delegate to contents; resolve the `multiple` expression if it's
    /// already constant (spec §4.4, `calc_len`).
    pub fn calc_len(
        &mut self,
        self_id: BytecodeId,
        add_span: &mut dyn FnMut(BytecodeId, SpanId, i64, i64, i64),
    ) -> Result<(), AsmError> {
        self.len = match &mut self.contents {
            Some(contents) => contents.calc_len(self_id, &self.fixed, add_span)?,
            None => self.fixed.len() as u64,
        };

        if let Some(multiple) = &self.multiple {
            if let Some(n) = multiple.get_intnum() {
                let v = n.get_i64().map_err(|_| AsmError::MultipleNegative)?;
                if v < 0 {
                    return Err(AsmError::MultipleNegative);
                }
                self.mult_int = v;
            } else if multiple.get_float().is_some() {
                return Err(AsmError::MultipleContainsFloat);
            } else {
                // non-constant: register a span (id=0) and assume zero
                // until resolved (spec §4.4, `calc_len`).
                add_span(self_id, SpanId::MULTIPLE, 0, i64::MIN, i64::MAX);
                self.mult_int = 0;
            }
        }
        Ok(())
    }

    /// `span_id == MULTIPLE` updates the multiple's resolved value; else
    /// delegate to contents (spec §4.4, `expand`).
    pub fn expand(
        &mut self,
        self_id: BytecodeId,
        span_id: SpanId,
        old_val: i64,
        new_val: i64,
    ) -> Result<ExpandResult, AsmError> {
        if span_id == SpanId::MULTIPLE {
            let grew = new_val > old_val;
            self.mult_int = new_val;
            return Ok(ExpandResult {
                did_grow: grew,
                neg_thres: i64::MIN,
                pos_thres: i64::MAX,
                no_more_growth: true,
            });
        }
        match &mut self.contents {
            Some(contents) => contents.expand(self_id, &mut self.len, span_id, old_val, new_val),
            None => Err(AsmError::InternalLengthMismatch {
                expected: self.len as usize,
                written: 0,
            }),
        }
    }

    /// Recompute length for a SPECIAL_OFFSET bytecode so the next byte
    /// lands at `offset` (spec §4.4, `update_offset`).
    pub fn update_offset(
        &mut self,
        self_id: BytecodeId,
        offset: u64,
    ) -> Result<u64, AsmError> {
        if let Some(contents) = &self.contents {
            if contents.special_kind() == crate::contents::SpecialKind::Offset {
                let old = self.len as i64;
                let result = self.expand(self_id, SpanId::OFFSET, old, offset as i64)?;
                let _ = result;
            }
        }
        self.offset = offset;
        Ok(offset + self.len * self.mult_int as u64)
    }

    /// Walk fixed bytes, emitting runs between fixups and the fixup
    /// values themselves, then the (possibly repeated) tail (spec §4.4,
    /// `output`).
    pub fn output(
        &self,
        self_id: BytecodeId,
        sink: &mut dyn crate::backend::OutputSink,
    ) -> Result<(), AsmError> {
        let mut pos = 0usize;
        for fixup in &self.fixups {
            if fixup.off as usize > pos {
                sink.output_bytes(&self.fixed[pos..fixup.off as usize]);
            }
            let size_bytes = (fixup.value.size / 8) as usize;
            let slice = &self.fixed[fixup.off as usize..fixup.off as usize + size_bytes];
            sink.output_value(&fixup.value, slice, Location::new(self_id, fixup.off));
            pos = fixup.off as usize + size_bytes;
        }
        if pos < self.fixed.len() {
            sink.output_bytes(&self.fixed[pos..]);
        }

        if self.mult_int == 0 {
            return Ok(());
        }
        if let Some(contents) = &self.contents {
            if contents.special_kind() == crate::contents::SpecialKind::Reserve {
                sink.output_gap((self.len * self.mult_int as u64) as usize);
                return Ok(());
            }
            for _ in 0..self.mult_int {
                let written = contents.output(self_id, sink)?;
                if written as u64 != self.len {
                    return Err(AsmError::InternalLengthMismatch {
                        expected: self.len as usize,
                        written,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Result of a contents `expand` call (spec §4.4.1 `expand`): whether the
/// encoding grew, and the new live thresholds for the span (or a signal
/// that no further growth is possible, spec §4.6 requirement 5).
#[derive(Clone, Copy, Debug)]
pub struct ExpandResult {
    pub did_grow: bool,
    pub neg_thres: i64,
    pub pos_thres: i64,
    pub no_more_growth: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intnum::IntNum;

    #[test]
    fn empty_bytecode_has_no_contents_and_multiple_one() {
        let bc = Bytecode::new(1);
        assert!(bc.contents.is_none());
        assert!(bc.multiple.is_none());
        assert_eq!(bc.mult_int, 1);
        assert_eq!(bc.offset, UNKNOWN_OFFSET);
    }

    #[test]
    fn append_fixed_reserves_bytes_and_records_fixup() {
        let mut bc = Bytecode::new(1);
        let v = Value::new(32, Expr::from_int(IntNum::from_i64(7)));
        bc.append_fixed(v, SourceLoc::new(1));
        assert_eq!(bc.fixed.len(), 4);
        assert_eq!(bc.fixups.len(), 1);
        assert_eq!(bc.fixups[0].off, 0);
    }

    #[test]
    fn finalize_resolves_constant_multiple() {
        let mut bc = Bytecode::new(1);
        bc.set_multiple(Expr::from_int(IntNum::from_i64(3)));
        bc.finalize(BytecodeId::from_u32(0)).unwrap();
        assert_eq!(
            bc.multiple.as_ref().unwrap().get_intnum().unwrap().get_i64().unwrap(),
            3
        );
    }

    #[test]
    fn negative_multiple_is_rejected_at_calc_len() {
        let mut bc = Bytecode::new(1);
        bc.set_multiple(Expr::from_int(IntNum::from_i64(-1)));
        bc.finalize(BytecodeId::from_u32(0)).unwrap();
        let mut add_span = |_: BytecodeId, _: SpanId, _: i64, _: i64, _: i64| {};
        let err = bc
            .calc_len(BytecodeId::from_u32(0), &mut add_span)
            .unwrap_err();
        assert!(matches!(err, AsmError::MultipleNegative));
    }
}
