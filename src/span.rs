//! Span identifiers (spec §3, Entity: Span).
//!
//! A span is registered by a bytecode's `calc_len` via `add_span` and
//! tracked by the optimizer ([`crate::optimize`]) until its thresholds
//! stop being crossed. `SpanId` is scoped to the bytecode that registered
//! it — two different bytecodes may each have a span `SpanId::new(2)`
//! without clashing, since the optimizer always pairs a span with its
//! owning [`crate::bytecode::BytecodeId`].

/// A span identifier, scoped to its owning bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanId(u32);

impl SpanId {
    /// Reserved id for a bytecode's own `multiple` expression (spec §4.4,
    /// `calc_len`: "register a span (id=0) over the multiple expression").
    pub const MULTIPLE: SpanId = SpanId(0);

    /// Reserved id used internally by `update_offset` to re-expand a
    /// SPECIAL_OFFSET bytecode (spec §4.4, `update_offset`).
    pub const OFFSET: SpanId = SpanId(1);

    pub const fn new(raw: u32) -> Self {
        SpanId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}
