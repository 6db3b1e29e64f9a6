//! The backend (object-writer) boundary (spec §6, "To backend").
//!
//! After optimization, the driver walks sections and bytecodes and calls
//! [`Bytecode::output`](crate::bytecode::Bytecode::output) with a sink.
//! The sink turns symbolic [`Value`]s into relocation records; the core
//! guarantees every non-relocatable value has been fully reduced to an
//! absolute integer by the time `output` runs.

use crate::bytecode::Location;
use crate::value::Value;

/// Receives bytes and fixup values as a section is serialized.
///
/// Mirrors the `RelocSink`/`CodeSink` split Cranelift uses in
/// `binemit::memorysink`: literal bytes go through one method, symbolic
/// fixups through another so the sink can turn them into relocations.
pub trait OutputSink {
    /// A run of literal bytes with no symbolic content.
    fn output_bytes(&mut self, bytes: &[u8]);

    /// `len` uninitialized bytes from a `SPECIAL_RESERVE` bytecode —
    /// never a fill of zeros (spec §3, Entity: Contents, "Reserve").
    fn output_gap(&mut self, len: usize);

    /// A fixup's resolved bits. `bytes` holds the current (placeholder)
    /// contents of the slot; `loc` is where it sits in the section. A
    /// symbolic `value` becomes a relocation entry; a purely absolute one
    /// is written out directly by the sink.
    fn output_value(&mut self, value: &Value, bytes: &[u8], loc: Location);
}

/// An [`OutputSink`] that concatenates everything into one in-memory
/// buffer and records relocations as plain tuples — good enough for
/// tests and for embedding in a driver that doesn't need a real object
/// format.
#[derive(Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
    pub relocations: Vec<(usize, crate::symbol::SymbolId)>,
}

impl OutputSink for MemorySink {
    fn output_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn output_gap(&mut self, len: usize) {
        self.bytes.resize(self.bytes.len() + len, 0);
    }

    fn output_value(&mut self, value: &Value, bytes: &[u8], _loc: Location) {
        if let Some(sym) = value.rel() {
            self.relocations.push((self.bytes.len(), sym));
        }
        self.bytes.extend_from_slice(bytes);
    }
}
