//! Polymorphic bytecode contents (spec §3, Entity: Contents; §4.4.1 for
//! the illustrative jump variant).
//!
//! Each case used to be a `Contents` subclass with a virtual `clone()`;
//! here it's one arm of a tagged enum (spec §9, "Polymorphic contents"),
//! dispatched by a plain `match` instead of vtable indirection. This is
//! the same shape Cranelift's `InstructionData` uses for opcodes instead
//! of per-opcode trait objects.

mod align;
mod data;
mod jump;
mod org;
mod reserve;

pub use align::AlignContents;
pub use data::DataContents;
pub use jump::{JumpContents, JumpSelector};
pub use org::OrgContents;
pub use reserve::ReserveContents;

use crate::bytecode::{BytecodeId, ExpandResult};
use crate::error::AsmError;
use crate::span::SpanId;

/// `Bytecode::Contents::SpecialType` (spec §3, §4.4 `update_offset`):
/// marks contents whose length the optimizer must recompute once the
/// bytecode's final offset is known, versus contents whose `len` fills
/// with uninitialized bytes rather than real output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialKind {
    None,
    Reserve,
    Offset,
}

/// The tagged variant over contents kinds (spec §3, Entity: Contents).
#[derive(Clone, Debug)]
pub enum Contents {
    Data(DataContents),
    Reserve(ReserveContents),
    Align(AlignContents),
    Org(OrgContents),
    Jump(JumpContents),
}

impl Contents {
    /// Inline any EQU-typed symbol a contents variant still refers to,
    /// before `finalize` classifies its expressions (spec §4.3). Only the
    /// jump variant carries a symbolic expression of its own; the others
    /// are resolved entirely at append time.
    pub fn expand_equ(&mut self, symbols: &crate::symbol::SymbolTable) -> Result<(), AsmError> {
        match self {
            Contents::Jump(c) => c.expand_equ(symbols),
            Contents::Data(_) | Contents::Reserve(_) | Contents::Align(_) | Contents::Org(_) => Ok(()),
        }
    }

    pub fn finalize(&mut self, bc: BytecodeId, fixed: &[u8]) -> Result<(), AsmError> {
        match self {
            Contents::Data(c) => c.finalize(),
            Contents::Reserve(c) => c.finalize(),
            Contents::Align(c) => c.finalize(),
            Contents::Org(c) => c.finalize(),
            Contents::Jump(c) => c.finalize(bc, fixed),
        }
    }

    pub fn calc_len(
        &mut self,
        bc: BytecodeId,
        fixed: &[u8],
        add_span: &mut dyn FnMut(BytecodeId, SpanId, i64, i64, i64),
    ) -> Result<u64, AsmError> {
        match self {
            Contents::Data(c) => c.calc_len(),
            Contents::Reserve(c) => c.calc_len(),
            Contents::Align(_) => Ok(0), // resolved in update_offset
            Contents::Org(_) => Ok(0),
            Contents::Jump(c) => c.calc_len(bc, fixed, add_span),
        }
    }

    pub fn expand(
        &mut self,
        bc: BytecodeId,
        len: &mut u64,
        span_id: SpanId,
        old_val: i64,
        new_val: i64,
    ) -> Result<ExpandResult, AsmError> {
        match self {
            Contents::Align(c) => c.expand(len, new_val),
            Contents::Org(c) => c.expand(len, new_val),
            Contents::Jump(c) => c.expand(bc, len, span_id, old_val, new_val),
            Contents::Data(_) | Contents::Reserve(_) => Err(AsmError::InternalLengthMismatch {
                expected: *len as usize,
                written: 0,
            }),
        }
    }

    pub fn output(
        &self,
        bc: BytecodeId,
        sink: &mut dyn crate::backend::OutputSink,
    ) -> Result<usize, AsmError> {
        match self {
            Contents::Data(c) => c.output(sink),
            Contents::Reserve(_) => Ok(0),
            Contents::Align(c) => c.output(sink),
            Contents::Org(_) => Ok(0),
            Contents::Jump(c) => c.output(bc, sink),
        }
    }

    pub fn special_kind(&self) -> SpecialKind {
        match self {
            Contents::Data(_) | Contents::Jump(_) => SpecialKind::None,
            Contents::Reserve(_) => SpecialKind::Reserve,
            Contents::Align(_) | Contents::Org(_) => SpecialKind::Offset,
        }
    }
}
