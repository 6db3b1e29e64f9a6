//! `SPECIAL_RESERVE` contents: a gap of `len * multiple` uninitialized
//! bytes, never a fill of zeros (spec §3, Entity: Contents, "Reserve").

use crate::error::AsmError;

#[derive(Clone, Copy, Debug)]
pub struct ReserveContents {
    /// Size in bytes of a single reserved item (e.g. `resb`=1, `resd`=4).
    pub item_size: u32,
}

impl ReserveContents {
    pub fn new(item_size: u32) -> Self {
        ReserveContents { item_size }
    }

    pub fn finalize(&mut self) -> Result<(), AsmError> {
        Ok(())
    }

    pub fn calc_len(&self) -> Result<u64, AsmError> {
        Ok(self.item_size as u64)
    }
}
