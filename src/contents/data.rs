//! Data / fixed-only contents: no tail generator, length already known
//! (spec §3, Entity: Contents, "Data / fixed only").

use crate::error::AsmError;

/// Extra bytes appended after a bytecode's `fixed` buffer — used for
/// `AppendData`/`AppendLEB128`-style helpers whose encoded length is
/// already fully determined at append time (spec §6).
#[derive(Clone, Debug, Default)]
pub struct DataContents {
    pub tail: Vec<u8>,
}

impl DataContents {
    pub fn new(tail: Vec<u8>) -> Self {
        DataContents { tail }
    }

    pub fn finalize(&mut self) -> Result<(), AsmError> {
        Ok(())
    }

    pub fn calc_len(&self) -> Result<u64, AsmError> {
        Ok(self.tail.len() as u64)
    }

    pub fn output(&self, sink: &mut dyn crate::backend::OutputSink) -> Result<usize, AsmError> {
        sink.output_bytes(&self.tail);
        Ok(self.tail.len())
    }
}
