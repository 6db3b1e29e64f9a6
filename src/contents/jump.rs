//! The illustrative jump bytecode (spec §4.4.1): short vs. near opcode
//! selection under a span-dependent displacement, grounded directly on
//! `X86Jmp::{finalize,calc_len,expand,output}`.

use crate::bytecode::{BytecodeId, ExpandResult, Location};
use crate::error::AsmError;
use crate::span::SpanId;
use crate::symbol::SymbolTable;
use crate::value::Value;

/// Which encoding a jump has settled on (or not yet settled on).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JumpSelector {
    /// Not yet decided; treated as `Short` until widened.
    Unspecified,
    Short,
    Near,
}

/// The span id this contents registers for its own displacement
/// (distinct from the bytecode-wide `SpanId::MULTIPLE`/`SpanId::OFFSET`).
const DISPLACEMENT_SPAN: SpanId = SpanId::new(2);

#[derive(Clone, Debug)]
pub struct JumpContents {
    pub common: Vec<u8>,
    pub short_opcode: Vec<u8>,
    pub near_opcode: Vec<u8>,
    /// Width of the near-form displacement: 2 (16-bit mode) or 4 (32-bit).
    pub near_disp_bytes: u32,
    pub target: Value,
    pub selector: JumpSelector,
}

impl JumpContents {
    pub fn new(
        common: Vec<u8>,
        short_opcode: Vec<u8>,
        near_opcode: Vec<u8>,
        near_disp_bytes: u32,
        target: Value,
    ) -> Self {
        JumpContents {
            common,
            short_opcode,
            near_opcode,
            near_disp_bytes,
            target,
            selector: JumpSelector::Unspecified,
        }
    }

    /// Inline any EQU-typed symbol the jump target still refers to, before
    /// `finalize` classifies it as absolute/relative (spec §4.3).
    pub fn expand_equ(&mut self, symbols: &SymbolTable) -> Result<(), AsmError> {
        self.target.expand_equ(symbols)
    }

    /// Adjust the target to be IP-relative, anchored at the start of
    /// this bytecode; without a resolvable same-section target, default
    /// the selector to `Near` (spec §4.4.1, `finalize`).
    pub fn finalize(&mut self, self_id: BytecodeId, _fixed: &[u8]) -> Result<(), AsmError> {
        self.target.ip_rel = true;
        self.target.finalize(Location::new(self_id, 0))?;
        if self.target.anchor().is_none() {
            // no bytecode-local anchor to measure against (either a
            // cross-section symbol or an already-resolved absolute) —
            // the optimizer can't remeasure it, so commit to Near.
            self.selector = JumpSelector::Near;
        }
        Ok(())
    }

    /// Live displacement from this bytecode to its target, measured
    /// against the thresholds `calc_len` registered (target offset minus
    /// this bytecode's own offset, un-adjusted for instruction length —
    /// the thresholds already carry that bias). Only resolvable when the
    /// target finalized to a same-section anchor; anything else defaulted
    /// to `Near` in `finalize` and never reaches the heap.
    pub fn remeasure(&self, self_id: BytecodeId, offsets: &dyn Fn(BytecodeId) -> u64) -> i64 {
        match self.target.anchor() {
            Some(loc) => {
                let target_off = offsets(loc.bc) + loc.offset as u64;
                let source_off = offsets(self_id);
                target_off as i64 - source_off as i64
            }
            None => 0,
        }
    }

    fn short_len(&self) -> u64 {
        (self.common.len() + self.short_opcode.len() + 1) as u64
    }

    fn near_len(&self) -> u64 {
        (self.common.len() + self.near_opcode.len() + self.near_disp_bytes as usize) as u64
    }

    /// Short -> common + short_opcode_len + 1 byte displacement; Near ->
    /// common + near_opcode_len + (2 or 4) bytes; Unspecified -> initially
    /// Short, registering a span with thresholds `(-128+len, 127+len)`
    /// (spec §4.4.1, `calc_len`).
    pub fn calc_len(
        &mut self,
        self_id: BytecodeId,
        _fixed: &[u8],
        add_span: &mut dyn FnMut(BytecodeId, SpanId, i64, i64, i64),
    ) -> Result<u64, AsmError> {
        match self.selector {
            JumpSelector::Near => Ok(self.near_len()),
            JumpSelector::Short | JumpSelector::Unspecified => {
                let len = self.short_len();
                if self.selector == JumpSelector::Unspecified {
                    self.selector = JumpSelector::Short;
                }
                add_span(
                    self_id,
                    DISPLACEMENT_SPAN,
                    0,
                    -128 + len as i64,
                    127 + len as i64,
                );
                Ok(len)
            }
        }
    }

    /// Upgrade Short -> Near; no further growth possible afterward (spec
    /// §4.4.1, `expand`, span 1).
    pub fn expand(
        &mut self,
        _bc: BytecodeId,
        len: &mut u64,
        span_id: SpanId,
        _old_val: i64,
        _new_val: i64,
    ) -> Result<ExpandResult, AsmError> {
        if span_id != DISPLACEMENT_SPAN {
            return Err(AsmError::InternalLengthMismatch {
                expected: *len as usize,
                written: 0,
            });
        }
        if self.selector == JumpSelector::Near {
            return Ok(ExpandResult {
                did_grow: false,
                neg_thres: i64::MIN,
                pos_thres: i64::MAX,
                no_more_growth: true,
            });
        }
        self.selector = JumpSelector::Near;
        *len = self.near_len();
        Ok(ExpandResult {
            did_grow: true,
            neg_thres: i64::MIN,
            pos_thres: i64::MAX,
            no_more_growth: true,
        })
    }

    /// Emit common prefix, opcode, then the target at size 8 or (16/32)
    /// bits, biased so the stored displacement is relative to the end of
    /// the instruction (spec §4.4.1, `output`).
    pub fn output(
        &self,
        self_id: BytecodeId,
        sink: &mut dyn crate::backend::OutputSink,
    ) -> Result<usize, AsmError> {
        sink.output_bytes(&self.common);
        let (opcode, disp_size) = match self.selector {
            JumpSelector::Short | JumpSelector::Unspecified => (&self.short_opcode, 1u32),
            JumpSelector::Near => (&self.near_opcode, self.near_disp_bytes),
        };
        sink.output_bytes(opcode);
        let mut target = self.target.clone();
        target.size = disp_size * 8;
        target.next_insn = 0;
        let zero_bytes = vec![0u8; disp_size as usize];
        sink.output_value(&target, &zero_bytes, Location::new(self_id, 0));
        Ok(self.common.len() + opcode.len() + disp_size as usize)
    }
}
