//! The symbol table (spec §4.3 / C3).
//!
//! Symbols are arena-allocated in a [`SymbolTable`] and referenced from
//! [`crate::expr::Expr`] terms by [`SymbolId`], a dense entity index rather
//! than a pointer — the same non-owning-handle shape Cranelift uses for
//! `Value`/`Inst`/`Block` references into a `Function`. This gives symbols
//! stable identity independent of any `Vec` reallocation and makes cloning
//! an `Expr` a plain `Vec` copy (spec §9, "shared symbols with
//! reference-back from expressions").

use crate::error::AsmError;
use crate::expr::Expr;
use crate::sourceloc::SourceLoc;
use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;

/// A tiny bitflags stand-in scoped to this module's two bitsets. Spelled
/// out rather than pulled in as a dependency since the full bitflags
/// feature set (serde impls, iteration, Debug formatting) isn't needed for
/// two 5-bit sets.
macro_rules! bitset {
    (
        $(#[$meta:meta])*
        pub struct $name:ident : $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name($repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

/// A dense reference to a [`Symbol`] owned by a [`SymbolTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);
entity_impl!(SymbolId, "sym");

/// What a symbol was defined as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolType {
    Unknown,
    Equ,
    Label,
    Special,
}

/// Code location a label symbol resolves to. Kept abstract here: the
/// bytecode module owns the concrete `(bytecode, offset)` pair.
pub use crate::bytecode::Location;

bitset! {
    /// `status` bitset (spec §3, Entity: Symbol).
    pub struct Status: u8 {
        const USED    = 0b001;
        const DEFINED = 0b010;
        const VALUED  = 0b100;
    }
}

bitset! {
    /// `visibility` bitset (spec §3, Entity: Symbol).
    pub struct Visibility: u8 {
        const LOCAL  = 0b00001;
        const GLOBAL = 0b00010;
        const COMMON = 0b00100;
        const EXTERN = 0b01000;
        const DLOCAL = 0b10000;
    }
}

/// A named entry in the symbol table.
#[derive(Clone, Debug)]
pub struct Symbol {
    name: String,
    ty: SymbolType,
    status: Status,
    visibility: Visibility,
    equ: Option<Expr>,
    loc: Option<Location>,
    def_loc: SourceLoc,
    decl_loc: SourceLoc,
    use_loc: SourceLoc,
}

impl Symbol {
    fn new(name: String) -> Self {
        Symbol {
            name,
            ty: SymbolType::Unknown,
            status: Status::empty(),
            visibility: Visibility::empty(),
            equ: None,
            loc: None,
            def_loc: SourceLoc::default(),
            decl_loc: SourceLoc::default(),
            use_loc: SourceLoc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol_type(&self) -> SymbolType {
        self.ty
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_defined(&self) -> bool {
        self.status.contains(Status::DEFINED)
    }

    pub fn is_used(&self) -> bool {
        self.status.contains(Status::USED)
    }

    pub fn mark_used(&mut self, loc: SourceLoc) {
        self.status.insert(Status::USED);
        if self.use_loc.is_default() {
            self.use_loc = loc;
        }
    }

    pub fn equ(&self) -> Option<&Expr> {
        self.equ.as_ref()
    }

    pub fn location(&self) -> Option<Location> {
        self.loc
    }

    pub fn def_loc(&self) -> SourceLoc {
        self.def_loc
    }

    pub fn decl_loc(&self) -> SourceLoc {
        self.decl_loc
    }

    /// Unchecked EQU definition. Precondition: `!is_defined()`.
    pub fn define_equ(&mut self, expr: Expr, loc: SourceLoc) {
        assert!(!self.is_defined(), "symbol `{}` already defined", self.name);
        self.ty = SymbolType::Equ;
        self.equ = Some(expr);
        self.def_loc = loc;
        self.status.insert(Status::DEFINED | Status::VALUED);
    }

    /// Unchecked label definition. Precondition: `!is_defined()`.
    pub fn define_label(&mut self, at: Location, loc: SourceLoc) {
        assert!(!self.is_defined(), "symbol `{}` already defined", self.name);
        self.ty = SymbolType::Label;
        self.loc = Some(at);
        self.def_loc = loc;
        self.status.insert(Status::DEFINED | Status::VALUED);
    }

    /// Unchecked special-symbol definition. Precondition: `!is_defined()`.
    pub fn define_special(&mut self, visibility: Visibility, loc: SourceLoc) {
        assert!(!self.is_defined(), "symbol `{}` already defined", self.name);
        self.ty = SymbolType::Special;
        self.visibility.insert(visibility);
        self.def_loc = loc;
        self.status.insert(Status::DEFINED);
    }

    /// Returns an error if defining now would violate the one-definition
    /// rule, without mutating anything.
    fn define_check(&self, name: &str) -> Result<(), AsmError> {
        if self.is_defined() {
            return Err(AsmError::SymbolRedefined {
                name: name.to_string(),
                previous: self.def_loc,
            });
        }
        Ok(())
    }

    /// §4.3 declaration matrix: can `new_vis` be added to the symbol's
    /// current visibility set?
    fn ok_to_declare(&self, new_vis: Visibility) -> bool {
        if new_vis.contains(Visibility::DLOCAL) {
            return true;
        }
        if new_vis.contains(Visibility::GLOBAL) {
            return true;
        }
        if self.is_defined() {
            // DEFINED accepts only GLOBAL, handled above.
            return false;
        }
        let cur = self.visibility;
        if cur.contains(Visibility::EXTERN) && cur.contains(Visibility::COMMON) {
            // forbidden state; no further declarations accepted.
            return false;
        }
        if new_vis.contains(Visibility::EXTERN) {
            return cur.is_empty() || cur.contains(Visibility::EXTERN);
        }
        if new_vis.contains(Visibility::COMMON) {
            return cur.is_empty() || cur.contains(Visibility::COMMON);
        }
        false
    }

    fn declare(&mut self, vis: Visibility, loc: SourceLoc) {
        self.visibility.insert(vis);
        if self.decl_loc.is_default() {
            self.decl_loc = loc;
        }
    }
}

/// Arena of [`Symbol`]s, indexed by [`SymbolId`], with first-seen-order
/// name interning (spec §5: "symbol table insertions preserve first-seen
/// order for reproducible output").
#[derive(Default)]
pub struct SymbolTable {
    symbols: PrimaryMap<SymbolId, Symbol>,
    by_name: FxHashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: PrimaryMap::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Look up or create an `Unknown`-typed symbol by name.
    pub fn get_or_insert(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.symbols.push(Symbol::new(name.to_string()));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn mark_used(&mut self, id: SymbolId, loc: SourceLoc) {
        self.symbols[id].mark_used(loc);
    }

    /// Checked EQU definition: reports `SymbolRedefined`/`ExternAlreadyDefined`
    /// rather than defining over an existing definition.
    pub fn define_equ_checked(
        &mut self,
        id: SymbolId,
        expr: Expr,
        loc: SourceLoc,
    ) -> Result<(), AsmError> {
        self.define_check(id, loc)?;
        self.symbols[id].define_equ(expr, loc);
        Ok(())
    }

    pub fn define_label_checked(
        &mut self,
        id: SymbolId,
        at: Location,
        loc: SourceLoc,
    ) -> Result<(), AsmError> {
        self.define_check(id, loc)?;
        self.symbols[id].define_label(at, loc);
        Ok(())
    }

    pub fn define_special_checked(
        &mut self,
        id: SymbolId,
        visibility: Visibility,
        loc: SourceLoc,
    ) -> Result<(), AsmError> {
        self.define_check(id, loc)?;
        self.symbols[id].define_special(visibility, loc);
        Ok(())
    }

    fn define_check(&self, id: SymbolId, loc: SourceLoc) -> Result<(), AsmError> {
        let sym = &self.symbols[id];
        sym.define_check(&sym.name)?;
        if sym.visibility.contains(Visibility::EXTERN) {
            return Err(AsmError::ExternAlreadyDefined {
                name: sym.name.clone(),
                declared: if sym.decl_loc.is_default() { loc } else { sym.decl_loc },
            });
        }
        Ok(())
    }

    /// Declare a visibility on a symbol, checked against the §4.3 matrix.
    /// `GLOBAL` is always accepted and additive.
    pub fn declare(&mut self, id: SymbolId, vis: Visibility, loc: SourceLoc) -> Result<(), AsmError> {
        let sym = &mut self.symbols[id];
        if !sym.ok_to_declare(vis) {
            return Err(AsmError::ExternAlreadyDefined {
                name: sym.name.clone(),
                declared: sym.decl_loc,
            });
        }
        sym.declare(vis, loc);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter()
    }

    /// Inline every EQU-typed symbol term inside `expr`, recursively
    /// through the EQU chain, tracking which symbols are mid-expansion to
    /// detect cycles (spec §4.3, "Cycles through EQU chains must be
    /// detected by the EQU-expansion pass"; spec §9, "track a
    /// currently-expanding set during substitution"). Label/extern/common
    /// symbol terms are left untouched — they resolve later, as relative
    /// references, in `Value::finalize`.
    pub fn expand_equ(&self, expr: &mut Expr) -> Result<(), AsmError> {
        let mut expanding = rustc_hash::FxHashSet::default();
        self.expand_equ_inner(expr, &mut expanding)
    }

    fn expand_equ_inner(
        &self,
        expr: &mut Expr,
        expanding: &mut rustc_hash::FxHashSet<SymbolId>,
    ) -> Result<(), AsmError> {
        expr.expand_symbols(&mut |sym| {
            let s = self.get(sym);
            if s.symbol_type() != SymbolType::Equ {
                return Ok(None);
            }
            if !expanding.insert(sym) {
                return Err(AsmError::EquCircular { name: s.name().to_string() });
            }
            let mut sub = s.equ().cloned().expect("Equ symbol always carries an expr");
            self.expand_equ_inner(&mut sub, expanding)?;
            expanding.remove(&sym);
            Ok(Some(sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourceloc::SourceLoc;

    #[test]
    fn interning_preserves_first_seen_order() {
        let mut table = SymbolTable::new();
        let a = table.get_or_insert("foo");
        let b = table.get_or_insert("bar");
        let a2 = table.get_or_insert("foo");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        let names: Vec<_> = table.iter().map(|(_, s)| s.name().to_string()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut table = SymbolTable::new();
        let id = table.get_or_insert("x");
        table
            .define_equ_checked(id, Expr::from_int(crate::intnum::IntNum::one()), SourceLoc::new(1))
            .unwrap();
        let err = table
            .define_equ_checked(id, Expr::from_int(crate::intnum::IntNum::zero()), SourceLoc::new(2))
            .unwrap_err();
        assert!(matches!(err, AsmError::SymbolRedefined { .. }));
    }

    #[test]
    fn declare_matrix_extern_then_global() {
        let mut table = SymbolTable::new();
        let id = table.get_or_insert("sym");
        table.declare(id, Visibility::EXTERN, SourceLoc::new(1)).unwrap();
        table.declare(id, Visibility::GLOBAL, SourceLoc::new(2)).unwrap();
        assert!(table.get(id).visibility().contains(Visibility::EXTERN));
        assert!(table.get(id).visibility().contains(Visibility::GLOBAL));
    }

    #[test]
    fn declare_common_after_extern_is_rejected() {
        let mut table = SymbolTable::new();
        let id = table.get_or_insert("sym");
        table.declare(id, Visibility::EXTERN, SourceLoc::new(1)).unwrap();
        assert!(table.declare(id, Visibility::COMMON, SourceLoc::new(2)).is_err());
    }

    #[test]
    fn extern_then_define_is_reported() {
        let mut table = SymbolTable::new();
        let id = table.get_or_insert("sym");
        table.declare(id, Visibility::EXTERN, SourceLoc::new(1)).unwrap();
        let err = table
            .define_label_checked(id, Location::new(crate::bytecode::BytecodeId::from_u32(0), 0), SourceLoc::new(2))
            .unwrap_err();
        assert!(matches!(err, AsmError::ExternAlreadyDefined { .. }));
    }
}
