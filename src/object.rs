//! The frontend-facing API (spec §6, "To frontend (parser)"): object
//! construction, section switching, symbol declaration, and the
//! bytecode-building helpers a parser calls while it consumes directives.

use crate::bytecode::{Bytecode, Location};
use crate::contents::{AlignContents, Contents, DataContents, OrgContents, ReserveContents};
use crate::error::{AsmError, Diagnostic};
use crate::expr::Expr;
use crate::intnum::IntNum;
use crate::sourceloc::SourceLoc;
use crate::symbol::{SymbolId, SymbolTable, Visibility};
use crate::value::Value;
use cranelift_entity::EntityRef;

/// Receives diagnostics the core can't treat as fatal (spec §7 Policy:
/// "the offending pass continues with other bytecodes"). The frontend
/// decides formatting and whether a fatal flag should stop later passes.
pub trait DiagnosticSink {
    fn report(&mut self, diag: Diagnostic);

    /// Checked cooperatively between passes (spec §5, "Cancellation").
    fn is_fatal(&self) -> bool {
        false
    }
}

/// A [`DiagnosticSink`] that just collects everything — handy for tests
/// and for frontends that want to batch diagnostics before formatting.
#[derive(Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }
}

/// One output section: a totally ordered (spec §5) run of bytecodes.
#[derive(Default)]
pub struct Section {
    pub name: String,
    pub bytecodes: Vec<Bytecode>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Section {
            name: name.into(),
            bytecodes: Vec::new(),
        }
    }

    fn push(&mut self, bc: Bytecode) -> Location {
        let idx = self.bytecodes.len();
        self.bytecodes.push(bc);
        Location::new(crate::bytecode::BytecodeId::new(idx), 0)
    }
}

/// The translation unit: sections, symbols, and the bytecode-building
/// helpers a frontend drives while parsing (spec §6).
pub struct Object {
    sections: Vec<Section>,
    current: usize,
    pub symbols: SymbolTable,
}

impl Object {
    pub fn new() -> Self {
        let mut obj = Object {
            sections: Vec::new(),
            current: 0,
            symbols: SymbolTable::new(),
        };
        obj.sections.push(Section::new(".text"));
        obj
    }

    pub fn switch_section(&mut self, name: &str) -> usize {
        if let Some(i) = self.sections.iter().position(|s| s.name == name) {
            self.current = i;
            return i;
        }
        self.sections.push(Section::new(name));
        self.current = self.sections.len() - 1;
        self.current
    }

    pub fn current_section(&self) -> &Section {
        &self.sections[self.current]
    }

    pub fn current_section_mut(&mut self) -> &mut Section {
        &mut self.sections[self.current]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    // -- symbol declarations (spec §4.3, checked against the matrix) ---

    pub fn declare_extern(&mut self, name: &str, loc: SourceLoc) -> Result<(), AsmError> {
        let id = self.symbols.get_or_insert(name);
        self.symbols.declare(id, Visibility::EXTERN, loc)
    }

    pub fn declare_global(&mut self, name: &str, loc: SourceLoc) -> Result<(), AsmError> {
        let id = self.symbols.get_or_insert(name);
        self.symbols.declare(id, Visibility::GLOBAL, loc)
    }

    pub fn declare_common(&mut self, name: &str, loc: SourceLoc) -> Result<(), AsmError> {
        let id = self.symbols.get_or_insert(name);
        self.symbols.declare(id, Visibility::COMMON, loc)
    }

    pub fn define_label(&mut self, name: &str, loc: SourceLoc) -> Result<SymbolId, AsmError> {
        let id = self.symbols.get_or_insert(name);
        let at = self.current_section_mut().push_marker();
        self.symbols.define_label_checked(id, at, loc)?;
        Ok(id)
    }

    pub fn define_equ(&mut self, name: &str, expr: Expr, loc: SourceLoc) -> Result<SymbolId, AsmError> {
        let id = self.symbols.get_or_insert(name);
        self.symbols.define_equ_checked(id, expr, loc)?;
        Ok(id)
    }

    // -- bytecode-building helpers (spec §6) ---------------------------

    pub fn append_byte(&mut self, b: u8, line: u32) {
        self.append_data(vec![b], line);
    }

    pub fn append_data(&mut self, bytes: Vec<u8>, line: u32) {
        let mut bc = Bytecode::new(line);
        bc.transform(Contents::Data(DataContents::new(bytes)));
        self.current_section_mut().push(bc);
    }

    /// LEB128-encodes `n` now. This core only supports LEB128 of a
    /// compile-time-constant value — a symbolic LEB128 fixup would need
    /// its own span-dependent contents variant, which is out of scope.
    pub fn append_leb128(&mut self, n: &IntNum, signed: bool, line: u32) -> Result<(), AsmError> {
        let bytes = if signed {
            encode_sleb128(n)?
        } else {
            encode_uleb128(n)?
        };
        self.append_data(bytes, line);
        Ok(())
    }

    pub fn append_align(
        &mut self,
        boundary: u64,
        fill: Option<u8>,
        max_skip: Option<u64>,
        line: u32,
    ) {
        let mut bc = Bytecode::new(line);
        bc.transform(Contents::Align(AlignContents::new(boundary, fill, max_skip)));
        self.current_section_mut().push(bc);
    }

    pub fn append_org(&mut self, target_offset: u64, fill: u8, line: u32) {
        let mut bc = Bytecode::new(line);
        bc.transform(Contents::Org(OrgContents::new(target_offset, fill)));
        self.current_section_mut().push(bc);
    }

    pub fn append_fill(&mut self, n: u64, pattern: u8, line: u32) {
        self.append_data(vec![pattern; n as usize], line);
    }

    pub fn append_skip(&mut self, n: u64, item_size: u32, line: u32) {
        let mut bc = Bytecode::new(line);
        bc.transform(Contents::Reserve(ReserveContents::new(item_size)));
        bc.set_multiple(Expr::from_int(IntNum::from_u64(n)));
        self.current_section_mut().push(bc);
    }

    /// A non-constant `count` widens its bytecode's repeat count once,
    /// during `finalize`/`calc_len`, but the optimizer has no way to
    /// remeasure it against a later-resolved symbol the way it remeasures
    /// a jump displacement — use a constant count for predictable results.
    pub fn append_multiple(&mut self, bc: &mut Bytecode, count: Expr) {
        bc.set_multiple(count);
    }

    /// Append a fixup-bearing bytecode carrying `value` — the primitive
    /// architecture callbacks (`DoAppend`) build on to emit an
    /// instruction's symbolic operand (spec §6).
    pub fn append_value(&mut self, value: Value, loc: SourceLoc, line: u32) {
        let mut bc = Bytecode::new(line);
        bc.append_fixed(value, loc);
        self.current_section_mut().push(bc);
    }

    /// Run the span-dependent optimizer over every section, reporting
    /// recoverable errors to `sink` and continuing with the next section
    /// (spec §7 Policy: finalize/optimize errors are reported against
    /// the owning bytecode and the pass continues).
    pub fn optimize(&mut self, sink: &mut dyn DiagnosticSink) {
        for section in &mut self.sections {
            if sink.is_fatal() {
                break;
            }
            for bc in &mut section.bytecodes {
                if let Err(e) = bc.expand_equ(&self.symbols) {
                    sink.report(Diagnostic::new(e, bc.loc));
                }
            }
            if let Err(e) = crate::optimize::optimize(&mut section.bytecodes) {
                let loc = section
                    .bytecodes
                    .first()
                    .map(|bc| bc.loc)
                    .unwrap_or_default();
                sink.report(Diagnostic::new(e, loc));
            }
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::new()
    }
}

impl Section {
    /// A zero-size marker bytecode, used so a label can reference "here"
    /// without forcing a real bytecode boundary on the next directive.
    fn push_marker(&mut self) -> Location {
        let bc = Bytecode::new(0);
        self.push(bc)
    }
}

fn encode_uleb128(n: &IntNum) -> Result<Vec<u8>, AsmError> {
    let mut v = n.get_u64()?;
    let mut out = Vec::new();
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            break;
        }
    }
    Ok(out)
}

fn encode_sleb128(n: &IntNum) -> Result<Vec<u8>, AsmError> {
    let mut v = n.get_i64()?;
    let mut out = Vec::new();
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if !done {
            byte |= 0x80;
        }
        out.push(byte);
        if done {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_round_trip_small_values() {
        assert_eq!(encode_uleb128(&IntNum::from_i64(0)).unwrap(), vec![0x00]);
        assert_eq!(encode_uleb128(&IntNum::from_i64(127)).unwrap(), vec![0x7f]);
        assert_eq!(encode_uleb128(&IntNum::from_i64(128)).unwrap(), vec![0x80, 0x01]);
        assert_eq!(encode_sleb128(&IntNum::from_i64(-1)).unwrap(), vec![0x7f]);
        assert_eq!(encode_sleb128(&IntNum::from_i64(-129)).unwrap(), vec![0xff, 0x7e]);
    }

    #[test]
    fn extern_then_label_is_rejected() {
        let mut obj = Object::new();
        obj.declare_extern("sym", SourceLoc::new(1)).unwrap();
        let err = obj.define_label("sym", SourceLoc::new(2)).unwrap_err();
        assert!(matches!(err, AsmError::ExternAlreadyDefined { .. }));
    }

    #[test]
    fn sections_are_created_on_first_switch() {
        let mut obj = Object::new();
        assert_eq!(obj.current_section().name, ".text");
        obj.switch_section(".data");
        assert_eq!(obj.current_section().name, ".data");
        obj.switch_section(".text");
        assert_eq!(obj.current_section().name, ".text");
        assert_eq!(obj.sections().len(), 2);
    }

    #[test]
    fn equ_is_expanded_and_folds_to_a_constant() {
        // .equ X, 1+2*3 ; .long X -> 07 00 00 00
        let mut obj = Object::new();
        let one = Expr::from_int(IntNum::from_i64(1));
        let two_mul_three = crate::expr::Expr::binary(
            crate::expr::Op::Mul,
            Expr::from_int(IntNum::from_i64(2)),
            Expr::from_int(IntNum::from_i64(3)),
        );
        let equ_expr = crate::expr::Expr::binary(crate::expr::Op::Add, one, two_mul_three);
        let x = obj.define_equ("X", equ_expr, SourceLoc::new(1)).unwrap();

        let value = crate::value::Value::new(32, Expr::from_symbol(x));
        obj.append_value(value, SourceLoc::new(2), 2);

        let mut sink = CollectingSink::default();
        obj.optimize(&mut sink);
        assert!(sink.diagnostics.is_empty());

        let fixup = &obj.current_section().bytecodes[0].fixups[0];
        assert!(fixup.value.is_pure_abs());
        assert_eq!(fixup.value.abs().unwrap().get_intnum().unwrap().get_i64().unwrap(), 7);
    }

    #[test]
    fn equ_cycle_is_rejected() {
        // .equ A, B ; .equ B, A ; .long A -> EquCircular
        let mut obj = Object::new();
        let a = obj.symbols.get_or_insert("A");
        let b = obj.symbols.get_or_insert("B");
        obj.symbols
            .define_equ_checked(a, Expr::from_symbol(b), SourceLoc::new(1))
            .unwrap();
        obj.symbols
            .define_equ_checked(b, Expr::from_symbol(a), SourceLoc::new(2))
            .unwrap();

        let value = crate::value::Value::new(32, Expr::from_symbol(a));
        obj.append_value(value, SourceLoc::new(3), 3);

        let mut sink = CollectingSink::default();
        obj.optimize(&mut sink);
        assert_eq!(sink.diagnostics.len(), 1);
        assert!(matches!(sink.diagnostics[0].error, AsmError::EquCircular { .. }));
    }

    #[test]
    fn align_then_data_optimizes_to_expected_offsets() {
        let mut obj = Object::new();
        obj.append_data(vec![0u8; 5], 1);
        obj.append_align(8, Some(0), None, 2);
        obj.append_data(vec![0u8; 1], 3);
        let mut sink = CollectingSink::default();
        obj.optimize(&mut sink);
        assert!(sink.diagnostics.is_empty());
        let bcs = &obj.current_section().bytecodes;
        assert_eq!(bcs[0].offset, 0);
        assert_eq!(bcs[1].offset, 5);
        assert_eq!(bcs[1].len, 3); // pad 5 -> 8
        assert_eq!(bcs[2].offset, 8);
    }
}
