//! Error kinds surfaced by the core (spec §7).
//!
//! Expression-level numeric errors and finalize/optimize errors are
//! reported against a [`SourceLoc`] and the offending pass continues with
//! other bytecodes (the caller decides, via a [`crate::object::DiagnosticSink`],
//! whether to surface them). `InternalLengthMismatch` and friends are
//! returned as `Err` from the optimizer entry point instead, since spec §7
//! calls those unrecoverable.

use crate::sourceloc::SourceLoc;
use thiserror::Error;

/// All error kinds the core can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsmError {
    #[error("expression too complex to finalize into a value")]
    TooComplex,

    #[error("jump target value retains a forbidden modifier (seg_of, rshift, or curpos_rel)")]
    InvalidJumpTarget,

    #[error("multiple is negative")]
    MultipleNegative,

    #[error("multiple expression is not absolute")]
    MultipleNotAbsolute,

    #[error("multiple expression must not contain a floating point value")]
    MultipleContainsFloat,

    #[error("value out of range for its encoding")]
    ValueOutOfRange,

    #[error("divide by zero")]
    DivideByZero,

    #[error("shift amount out of range")]
    ShiftOutOfRange,

    #[error("symbol `{name}` redefined")]
    SymbolRedefined {
        name: String,
        previous: SourceLoc,
    },

    #[error("symbol `{name}` already declared extern")]
    ExternAlreadyDefined {
        name: String,
        declared: SourceLoc,
    },

    #[error("circular EQU reference through symbol `{name}`")]
    EquCircular { name: String },

    #[error("internal error: contents wrote {written} bytes but calc_len promised {expected}")]
    InternalLengthMismatch { expected: usize, written: usize },

    #[error("host integer overflow converting intnum")]
    IntNumOverflow,
}

/// A diagnostic: an [`AsmError`] paired with the source location that
/// produced it. Pushed to a [`crate::object::DiagnosticSink`] rather than
/// aborting the pass, per spec §7's continuation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: AsmError,
    pub loc: SourceLoc,
}

impl Diagnostic {
    pub fn new(error: AsmError, loc: SourceLoc) -> Self {
        Diagnostic { error, loc }
    }
}

/// Result alias for internal errors that halt processing (spec §7:
/// `InternalLengthMismatch` and invariant violations).
pub type AsmResult<T> = Result<T, AsmError>;
