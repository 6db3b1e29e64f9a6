//! The architecture-module boundary (spec §6, "To architecture module").
//!
//! The core never knows what a register *is* beyond an opaque identity —
//! it only needs to compare register terms for equality inside `Expr` and
//! hand them back to the architecture callback that materializes a
//! bytecode. This is the same shape Cranelift uses for `RegUnit`/`RealReg`:
//! a dense index minted by the target-specific layer, opaque to the
//! target-independent core.

use crate::error::AsmError;
use crate::expr::Expr;
use crate::sourceloc::SourceLoc;
use cranelift_entity::entity_impl;

/// An opaque register identity, minted and interpreted by the
/// architecture module. The core only ever stores and compares these.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(u32);
entity_impl!(RegId, "reg");

/// An opaque instruction-prefix identity (e.g. x86 `LOCK`/`REP`), minted
/// and interpreted by the architecture module the same way as [`RegId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefixId(u32);
entity_impl!(PrefixId, "prefix");

/// An effective-address operand, opaque to the core beyond the
/// displacement expression it wraps (`CreateEffAddr`, spec §6).
#[derive(Clone, Debug)]
pub struct EffAddr {
    pub disp: Expr,
}

/// Callbacks the core invokes on the architecture module while a
/// frontend is building bytecodes (spec §6, "To architecture module").
///
/// The core holds no opinion about instruction encoding; `do_append` is
/// the only entry point that actually produces [`Bytecode`]s, and is free
/// to push more than one (e.g. a prefix bytecode followed by the
/// instruction bytecode).
pub trait ArchCallbacks {
    /// Opaque in-progress instruction, built up by the frontend (prefixes,
    /// then operands) between `create_insn`/`create_empty_insn` and the
    /// architecture module's own consumption of it — opaque to the core the
    /// same way [`RegId`] is: minted and interpreted entirely by the
    /// architecture module.
    type Insn;

    /// Look up `mnemonic`'s instruction-info entry and start building an
    /// instruction from it, or `None` if this architecture has no such
    /// mnemonic (`CreateInsn`, spec §6).
    fn create_insn(&self, mnemonic: &str) -> Option<Self::Insn>;

    /// Start an instruction with no mnemonic yet known — used when a
    /// prefix (e.g. `LOCK`) is seen before the instruction it modifies
    /// (`CreateEmptyInsn`, spec §6).
    fn create_empty_insn(&self) -> Self::Insn;

    /// Build an effective-address operand from a displacement expression
    /// (`CreateEffAddr`, spec §6).
    fn create_eff_addr(&self, expr: Expr) -> Result<EffAddr, AsmError>;

    /// Resolve a register name to its identity, if this architecture
    /// defines one by that name.
    fn lookup_reg(&self, name: &str) -> Option<RegId>;

    /// Resolve a segment-register name.
    fn lookup_segreg(&self, name: &str) -> Option<RegId>;

    /// Resolve a target-modifier name (e.g. `WRT`, NASM-style `..gotoff`).
    fn lookup_target_modifier(&self, name: &str) -> Option<RegId>;

    /// Resolve an instruction-prefix name (e.g. `LOCK`, `REP`).
    fn lookup_prefix(&self, name: &str) -> Option<PrefixId>;

    /// Emit one or more bytecodes implementing `insn` into `section`,
    /// attributed to `loc`.
    fn do_append(
        &self,
        section: &mut crate::object::Section,
        insn: &str,
        operands: &[Expr],
        loc: SourceLoc,
    ) -> Result<(), AsmError>;

    /// A byte pattern used to pad code sections (e.g. x86 NOP sleds);
    /// `Fill()` in spec §6.
    fn fill_pattern(&self) -> &[u8];
}

/// A minimal [`ArchCallbacks`] used by the core's own tests: it has no
/// registers and appends a single empty data bytecode per instruction.
#[cfg(test)]
pub(crate) struct NullArch;

#[cfg(test)]
impl ArchCallbacks for NullArch {
    type Insn = ();

    fn create_insn(&self, _mnemonic: &str) -> Option<Self::Insn> {
        None
    }
    fn create_empty_insn(&self) -> Self::Insn {}
    fn create_eff_addr(&self, expr: Expr) -> Result<EffAddr, AsmError> {
        Ok(EffAddr { disp: expr })
    }
    fn lookup_reg(&self, _name: &str) -> Option<RegId> {
        None
    }
    fn lookup_segreg(&self, _name: &str) -> Option<RegId> {
        None
    }
    fn lookup_target_modifier(&self, _name: &str) -> Option<RegId> {
        None
    }
    fn lookup_prefix(&self, _name: &str) -> Option<PrefixId> {
        None
    }
    fn do_append(
        &self,
        _section: &mut crate::object::Section,
        _insn: &str,
        _operands: &[Expr],
        _loc: SourceLoc,
    ) -> Result<(), AsmError> {
        Ok(())
    }
    fn fill_pattern(&self) -> &[u8] {
        &[0x90]
    }
}
