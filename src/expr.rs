//! The expression tree (spec §4.2 / C2): a flat, post-order (RPN) vector
//! of terms, each carrying a depth.
//!
//! The flat layout is deliberate (spec §9, "Expression as RPN vector"): it
//! eliminates pointer-chased trees, makes deep-copy a single `Vec` clone,
//! and makes the leveling/simplification pass a cache-friendly linear
//! scan. This is the same trade Cranelift makes by keeping its `Function`
//! IR in dense, index-addressed arenas instead of boxed trees.

use crate::arch::RegId;
use crate::bytecode::Location;
use crate::intnum::IntNum;
use crate::symbol::SymbolId;
use smallvec::SmallVec;

/// Operators over expression terms (spec §4.1, §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    SignDiv,
    Mod,
    SignMod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Nor,
    Xnor,
    Neg,
    Not,
    LNot,
    Seg,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LAnd,
    LOr,
    LXor,
    LNor,
    LXnor,
    Cond,
    /// `seg:off` — never leveled across (spec §4.2 step 4).
    SegOff,
    /// `expr WRT sym`.
    Wrt,
    /// Identity: a single-child pass-through produced by leveling;
    /// promotable whenever its one child is hoisted (spec §4.2 step 3).
    Ident,
}

impl Op {
    pub fn arity(self) -> Option<usize> {
        use Op::*;
        match self {
            Neg | Not | LNot | Seg | Ident => Some(1),
            Add | Sub | Mul | Div | SignDiv | Mod | SignMod | Shl | Shr | And | Or | Xor | Nor
            | Xnor | Lt | Le | Gt | Ge | Eq | Ne | LAnd | LOr | LXor | LNor | LXnor | SegOff
            | Wrt => Some(2),
            Cond => Some(3),
        }
    }

    pub fn is_unary(self) -> bool {
        self.arity() == Some(1)
    }

    /// N-ary associative ops that `level_op` may flatten and fold.
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            Op::Add | Op::Mul | Op::And | Op::Or | Op::Xor | Op::LAnd | Op::LOr | Op::LXor
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Op::Add
                | Op::Mul
                | Op::And
                | Op::Or
                | Op::Xor
                | Op::Nor
                | Op::Xnor
                | Op::Eq
                | Op::Ne
                | Op::LAnd
                | Op::LOr
                | Op::LXor
                | Op::LNor
                | Op::LXnor
        )
    }
}

/// One slot in the flat RPN term vector.
#[derive(Clone, Debug)]
pub struct Term {
    pub kind: TermKind,
    pub depth: u16,
}

#[derive(Debug)]
pub enum TermKind {
    Register(RegId),
    Int(IntNum),
    Float(f64),
    Symbol(SymbolId),
    Location(Location),
    /// `substitute` placeholder: an index into the argument list supplied
    /// to `substitute`.
    Subst(usize),
    /// An operator consuming the `child_count` immediately preceding
    /// terms at `depth+1`.
    Op(Op, u8),
}

/// A leaf or operator used to build an [`Expr`]. Distinct from
/// [`TermKind`] only in that it has no depth yet — depth is assigned when
/// the term is pushed or re-normalized.
#[derive(Clone, Debug)]
pub enum Leaf {
    Register(RegId),
    Int(IntNum),
    Float(f64),
    Symbol(SymbolId),
    Location(Location),
    Subst(usize),
}

/// A flat, post-order expression tree (spec §3, Entity: Expr).
///
/// `Expr` exclusively owns its terms; `clone` deep-copies the term vector
/// (spec §8 law 5).
#[derive(Clone, Debug, Default)]
pub struct Expr {
    terms: Vec<Term>,
}

impl Expr {
    pub fn new() -> Self {
        Expr { terms: Vec::new() }
    }

    pub fn from_leaf(leaf: Leaf) -> Self {
        let mut e = Expr::new();
        e.push_leaf(leaf);
        e
    }

    pub fn from_int(n: IntNum) -> Self {
        Expr::from_leaf(Leaf::Int(n))
    }

    pub fn from_symbol(sym: SymbolId) -> Self {
        Expr::from_leaf(Leaf::Symbol(sym))
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn push_leaf(&mut self, leaf: Leaf) {
        let kind = match leaf {
            Leaf::Register(r) => TermKind::Register(r),
            Leaf::Int(n) => TermKind::Int(n),
            Leaf::Float(f) => TermKind::Float(f),
            Leaf::Symbol(s) => TermKind::Symbol(s),
            Leaf::Location(l) => TermKind::Location(l),
            Leaf::Subst(i) => TermKind::Subst(i),
        };
        self.terms.push(Term { kind, depth: 0 });
    }

    /// Append `other`'s terms (as a self-contained subtree) then an
    /// operator over them, consuming `other`.
    pub fn append_operand(&mut self, other: Expr) {
        self.terms.extend(other.terms);
    }

    pub fn append_leaf(&mut self, leaf: Leaf) {
        self.push_leaf(leaf);
    }

    /// Push an operator consuming the `nchild` immediately preceding
    /// top-level terms (spec §4.2, Construction). Re-depths the whole
    /// vector afterward so the RPN/depth invariant holds immediately.
    pub fn append_op(&mut self, op: Op, nchild: usize) {
        self.terms.push(Term {
            kind: TermKind::Op(op, nchild as u8),
            depth: 0,
        });
        self.renormalize_depths();
    }

    /// Build a binary expression `op(a, b)` by concatenating operand term
    /// vectors and appending the operator.
    pub fn binary(op: Op, a: Expr, b: Expr) -> Expr {
        let mut e = Expr::new();
        e.append_operand(a);
        e.append_operand(b);
        e.append_op(op, 2);
        e
    }

    pub fn unary(op: Op, a: Expr) -> Expr {
        let mut e = Expr::new();
        e.append_operand(a);
        e.append_op(op, 1);
        e
    }

    pub fn ternary(op: Op, a: Expr, b: Expr, c: Expr) -> Expr {
        let mut e = Expr::new();
        e.append_operand(a);
        e.append_operand(b);
        e.append_operand(c);
        e.append_op(op, 3);
        e
    }

    /// Recompute every term's depth from scratch in one linear sweep
    /// (spec §9: "re-normalize depths in a single sweep after any
    /// structural mutation"). The last term is the root at depth 0; each
    /// operator at depth *d* assigns depth *d*+1 to the *n* terms directly
    /// beneath it, walking right to left and skipping subtrees already
    /// claimed by an intervening operator.
    fn renormalize_depths(&mut self) {
        if self.terms.is_empty() {
            return;
        }
        let last = self.terms.len() - 1;
        self.terms[last].depth = 0;
        let mut i = last;
        loop {
            let depth = self.terms[i].depth;
            if let TermKind::Op(_, nchild) = self.terms[i].kind {
                let mut remaining = nchild as usize;
                let mut j = i;
                while remaining > 0 {
                    debug_assert!(j > 0, "operator is missing a child term");
                    j -= 1;
                    self.terms[j].depth = depth + 1;
                    remaining -= 1;
                    // skip the subtree just claimed so the next child we
                    // assign is its left sibling, not one of its own terms
                    j = skip_subtree_end(&self.terms, j);
                }
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
    }

    /// Inline every `Symbol` term `resolve` maps to `Some(expr)`, re-scanning
    /// from the splice point since a replacement may itself contain more
    /// symbol terms the caller wants resolved (spec §4.3, EQU-expansion).
    /// Purely mechanical: cycle detection and the decision whether a given
    /// symbol should be substituted at all live in the resolver closure.
    pub fn expand_symbols(
        &mut self,
        resolve: &mut dyn FnMut(SymbolId) -> Result<Option<Expr>, crate::error::AsmError>,
    ) -> Result<(), crate::error::AsmError> {
        let mut i = 0;
        while i < self.terms.len() {
            let sym = match self.terms[i].kind {
                TermKind::Symbol(s) => s,
                _ => {
                    i += 1;
                    continue;
                }
            };
            match resolve(sym)? {
                Some(replacement) => {
                    let depth = self.terms[i].depth;
                    self.replace_subtree_at(i, replacement, depth);
                    // re-examine from the same index: the replacement may
                    // itself contain symbol terms the resolver wants resolved.
                }
                None => i += 1,
            }
        }
        Ok(())
    }

    /// Replace every `Subst(i)` placeholder with a deep copy of
    /// `args[i]`'s terms.
    pub fn substitute(&self, args: &[Expr]) -> Result<Expr, crate::error::AsmError> {
        let mut out = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match &term.kind {
                TermKind::Subst(i) => {
                    let arg = args.get(*i).ok_or(crate::error::AsmError::TooComplex)?;
                    out.extend(arg.terms.iter().cloned());
                }
                _ => out.push(term.clone()),
            }
        }
        let mut e = Expr { terms: out };
        e.renormalize_depths();
        Ok(e)
    }

    /// Is the root term this operator?
    pub fn is_op(&self, op: Op) -> bool {
        matches!(self.terms.last().map(|t| &t.kind), Some(TermKind::Op(o, _)) if *o == op)
    }

    /// If the whole expression is a single integer term, return it.
    pub fn get_intnum(&self) -> Option<&IntNum> {
        match self.terms.as_slice() {
            [Term { kind: TermKind::Int(n), .. }] => Some(n),
            _ => None,
        }
    }

    pub fn get_float(&self) -> Option<f64> {
        match self.terms.as_slice() {
            [Term { kind: TermKind::Float(f), .. }] => Some(*f),
            _ => None,
        }
    }

    pub fn get_symbol(&self) -> Option<SymbolId> {
        match self.terms.as_slice() {
            [Term { kind: TermKind::Symbol(s), .. }] => Some(*s),
            _ => None,
        }
    }

    pub fn get_reg(&self) -> Option<RegId> {
        match self.terms.as_slice() {
            [Term { kind: TermKind::Register(r), .. }] => Some(*r),
            _ => None,
        }
    }

    /// If the whole expression is a single bytecode-local location, return it.
    pub fn get_location(&self) -> Option<Location> {
        match self.terms.as_slice() {
            [Term { kind: TermKind::Location(l), .. }] => Some(*l),
            _ => None,
        }
    }

    /// The top-level children of the root operator, as independent
    /// sub-`Expr`s (used by `level_op` and by `Value::finalize`).
    pub fn children(&self) -> Vec<Expr> {
        let Some(Term { kind: TermKind::Op(_, nchild), depth: root_depth }) = self.terms.last()
        else {
            return Vec::new();
        };
        let child_depth = root_depth + 1;
        let mut children: Vec<Vec<Term>> = Vec::with_capacity(*nchild as usize);
        let mut i = self.terms.len() - 1;
        let mut remaining = *nchild as usize;
        while remaining > 0 && i > 0 {
            i -= 1;
            if self.terms[i].depth == child_depth {
                let start = subtree_start(&self.terms, i);
                children.push(self.terms[start..=i].to_vec());
                remaining -= 1;
            }
        }
        children.reverse();
        children.into_iter().map(|terms| Expr { terms }).collect()
    }

    /// Replace the whole expression with a single integer leaf.
    pub fn set_int(&mut self, n: IntNum) {
        self.terms.clear();
        self.push_leaf(Leaf::Int(n));
    }

    /// Runs `xform_neg` then left-to-right `level_op` (spec §4.2,
    /// `simplify`).
    pub fn simplify(&mut self, simplify_reg_mul: bool) {
        self.xform_neg();
        let mut pos = 0;
        while pos < self.terms.len() {
            if matches!(self.terms[pos].kind, TermKind::Op(..)) {
                // leveling can fold/promote the subtree at `pos` into
                // fewer terms, shifting everything from `pos` onward to
                // the left — resume from the root's new index, not the
                // stale one, or the parent operator above it gets skipped.
                pos = self.level_op(pos, simplify_reg_mul);
            }
            pos += 1;
        }
    }

    /// `SUB(a,b) -> ADD(a, MUL(b,-1))`, `NEG(a) -> MUL(a,-1)`, so that
    /// subtraction/negation can be flattened by `level_op` like addition.
    fn xform_neg(&mut self) {
        let mut i = 0;
        while i < self.terms.len() {
            match self.terms[i].kind {
                TermKind::Op(Op::Sub, 2) => {
                    let depth = self.terms[i].depth;
                    self.terms[i].kind = TermKind::Op(Op::Add, 2);
                    let b_end = i - 1;
                    let b_start = subtree_start(&self.terms, b_end);
                    let minus_one = Term {
                        kind: TermKind::Int(IntNum::from_i64(-1)),
                        depth: depth + 2,
                    };
                    let mul = Term {
                        kind: TermKind::Op(Op::Mul, 2),
                        depth: depth + 1,
                    };
                    for t in self.terms[b_start..=b_end].iter_mut() {
                        t.depth += 1;
                    }
                    self.terms.splice(b_end + 1..b_end + 1, [minus_one, mul]);
                    i += 2;
                }
                TermKind::Op(Op::Neg, 1) => {
                    let depth = self.terms[i].depth;
                    self.terms[i].kind = TermKind::Op(Op::Mul, 2);
                    let minus_one = Term {
                        kind: TermKind::Int(IntNum::from_i64(-1)),
                        depth: depth + 1,
                    };
                    self.terms.insert(i, minus_one);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }
    }

    /// `level_op` (spec §4.2): flatten associative same-op grandchildren,
    /// fold integer-only children, sort commutative children by type,
    /// and promote a lone surviving child.
    /// Returns the index the processed subtree's root ended up at — it may
    /// have moved left if folding/promotion shrank the term vector.
    fn level_op(&mut self, pos: usize, simplify_reg_mul: bool) -> usize {
        let (op, _nchild) = match self.terms[pos].kind {
            TermKind::Op(op, n) => (op, n),
            _ => return pos,
        };
        if op == Op::SegOff {
            // never leveled across (spec §4.2 step 4)
            return pos;
        }
        let root_depth = self.terms[pos].depth;
        let mut children = self.children_of(pos);

        if op.is_associative() {
            // flatten same-operator grandchildren
            let mut flattened = Vec::with_capacity(children.len());
            for child in children {
                if child.terms.last().map(|t| matches!(&t.kind, TermKind::Op(o, _) if *o == op))
                    == Some(true)
                {
                    flattened.extend(child.children());
                } else {
                    flattened.push(child);
                }
            }
            children = flattened;
        }

        // fold integer-only children
        if matches!(
            op,
            Op::Add | Op::Mul | Op::And | Op::Or | Op::Xor | Op::Nor | Op::Xnor
        ) {
            let mut acc: Option<IntNum> = None;
            let mut rest = Vec::with_capacity(children.len());
            for child in children {
                if let Some(n) = child.get_intnum() {
                    acc = Some(match (&acc, op) {
                        (None, _) => n.clone(),
                        (Some(a), Op::Add) => a.add(n),
                        (Some(a), Op::Mul) => a.mul(n),
                        (Some(a), Op::And) => a.bitand(n),
                        (Some(a), Op::Or) => a.bitor(n),
                        (Some(a), Op::Xor) => a.bitxor(n),
                        (Some(a), Op::Nor) => a.nor(n),
                        (Some(a), Op::Xnor) => a.xnor(n),
                        _ => unreachable!(),
                    });
                } else {
                    rest.push(child);
                }
            }
            if let Some(n) = acc {
                let has_reg = rest.iter().any(|c| c.get_reg().is_some());
                let identity_drop = match op {
                    Op::Add => n.is_zero(),
                    Op::Mul => n == IntNum::one() && (simplify_reg_mul || !has_reg),
                    Op::And => false,
                    Op::Or => n.is_zero(),
                    _ => false,
                };
                let annihilates = matches!(op, Op::Mul | Op::And) && n.is_zero();
                if annihilates {
                    rest.clear();
                    rest.push(Expr::from_int(IntNum::zero()));
                } else if !identity_drop || rest.is_empty() {
                    rest.push(Expr::from_int(n));
                }
            }
            children = rest;
        }

        if op.is_commutative() {
            children.sort_by_key(|c| term_type_rank(c));
        }

        if children.len() == 1 && (op.is_associative() || op == Op::Ident) {
            let child = children.into_iter().next().unwrap();
            return self.replace_subtree_at(pos, child, root_depth);
        }

        self.rebuild_op_at(pos, op, children, root_depth)
    }

    fn children_of(&self, pos: usize) -> Vec<Expr> {
        let depth = self.terms[pos].depth;
        let nchild = match self.terms[pos].kind {
            TermKind::Op(_, n) => n as usize,
            _ => return Vec::new(),
        };
        let child_depth = depth + 1;
        let mut children = Vec::with_capacity(nchild);
        let mut i = pos;
        let mut remaining = nchild;
        while remaining > 0 && i > 0 {
            i -= 1;
            if self.terms[i].depth == child_depth {
                let start = subtree_start(&self.terms, i);
                children.push(Expr {
                    terms: self.terms[start..=i].to_vec(),
                });
                remaining -= 1;
            }
        }
        children.reverse();
        children
    }

    /// Replace the subtree rooted at `pos` (whose root sat at
    /// `root_depth`) with `replacement`, re-depthed to fit. Returns the
    /// index the replacement's root ends up at.
    fn replace_subtree_at(&mut self, pos: usize, replacement: Expr, root_depth: u16) -> usize {
        let start = subtree_start(&self.terms, pos);
        let mut new_terms = replacement.terms;
        for t in new_terms.iter_mut() {
            t.depth += root_depth;
        }
        let new_root = start + new_terms.len() - 1;
        self.terms.splice(start..=pos, new_terms);
        new_root
    }

    /// Returns the index the rebuilt operator ends up at.
    fn rebuild_op_at(&mut self, pos: usize, op: Op, children: Vec<Expr>, root_depth: u16) -> usize {
        let start = subtree_start(&self.terms, pos);
        let mut new_terms = Vec::new();
        for child in &children {
            for t in &child.terms {
                new_terms.push(Term {
                    kind: t.kind.clone(),
                    depth: t.depth + root_depth + 1,
                });
            }
        }
        new_terms.push(Term {
            kind: TermKind::Op(op, children.len() as u8),
            depth: root_depth,
        });
        let new_root = start + new_terms.len() - 1;
        self.terms.splice(start..=pos, new_terms);
        new_root
    }
}

impl Clone for TermKind {
    fn clone(&self) -> Self {
        match self {
            TermKind::Register(r) => TermKind::Register(*r),
            TermKind::Int(n) => TermKind::Int(n.clone()),
            TermKind::Float(f) => TermKind::Float(*f),
            TermKind::Symbol(s) => TermKind::Symbol(*s),
            TermKind::Location(l) => TermKind::Location(*l),
            TermKind::Subst(i) => TermKind::Subst(*i),
            TermKind::Op(o, n) => TermKind::Op(*o, *n),
        }
    }
}

fn term_type_rank(e: &Expr) -> u8 {
    match e.terms.last().map(|t| &t.kind) {
        Some(TermKind::Register(_)) => 0,
        Some(TermKind::Location(_)) => 1,
        Some(TermKind::Symbol(_)) => 2,
        Some(TermKind::Int(_)) => 3,
        _ => 4,
    }
}

/// Given the index of a term, find the start of the subtree it roots
/// (walking left while terms are part of that subtree).
fn subtree_start(terms: &[Term], end: usize) -> usize {
    let mut remaining_ops: SmallVec<[u8; 8]> = SmallVec::new();
    match terms[end].kind {
        TermKind::Op(_, n) => remaining_ops.push(n),
        _ => return end,
    }
    let mut i = end;
    while i > 0 && !remaining_ops.is_empty() {
        i -= 1;
        let last = remaining_ops.last_mut().unwrap();
        *last -= 1;
        if *last == 0 {
            remaining_ops.pop();
        }
        if let TermKind::Op(_, n) = terms[i].kind {
            remaining_ops.push(n);
        }
    }
    i
}

/// Like `subtree_start` but returns the index one past the subtree's
/// start, i.e. the next index to examine for a sibling to the left.
fn skip_subtree_end(terms: &[Term], end: usize) -> usize {
    subtree_start(terms, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::Add, a, b)
    }

    fn int(n: i64) -> Expr {
        Expr::from_int(IntNum::from_i64(n))
    }

    #[test]
    fn rpn_depth_invariant_holds_after_construction() {
        let e = add(int(1), add(int(2), int(3)));
        assert_eq!(e.terms().last().unwrap().depth, 0);
        let root_nchild = match e.terms().last().unwrap().kind {
            TermKind::Op(_, n) => n,
            _ => panic!("expected operator root"),
        };
        let direct_children = e.terms()[..e.terms().len() - 1]
            .iter()
            .filter(|t| t.depth == 1)
            .count();
        assert_eq!(direct_children, root_nchild as usize);
    }

    #[test]
    fn associativity_flattening() {
        let mut a = add(int(1), add(int(2), int(3)));
        let mut b = add(add(int(1), int(2)), int(3));
        let mut c = Expr::new();
        c.append_operand(int(1));
        c.append_operand(int(2));
        c.append_operand(int(3));
        c.append_op(Op::Add, 3);

        a.simplify(true);
        b.simplify(true);
        c.simplify(true);

        assert_eq!(a.get_intnum().unwrap().get_i64().unwrap(), 6);
        assert_eq!(b.get_intnum().unwrap().get_i64().unwrap(), 6);
        assert_eq!(c.get_intnum().unwrap().get_i64().unwrap(), 6);
    }

    #[test]
    fn simplify_is_idempotent() {
        let mut e = add(int(1), add(int(2), int(3)));
        e.simplify(true);
        let once = format!("{:?}", e.terms());
        e.simplify(true);
        let twice = format!("{:?}", e.terms());
        assert_eq!(once, twice);
    }

    #[test]
    fn additive_identity_folds_away() {
        let mut e = add(int(5), int(0));
        e.simplify(true);
        assert_eq!(e.get_intnum().unwrap().get_i64().unwrap(), 5);
    }

    #[test]
    fn deep_copy_does_not_alias() {
        let e = add(int(1), int(2));
        let mut clone = e.clone();
        clone.set_int(IntNum::from_i64(99));
        assert_ne!(
            e.terms().last().unwrap().depth,
            clone.terms().last().unwrap().depth + 100
        ); // sanity: different objects
        assert!(e.get_intnum().is_none());
        assert_eq!(clone.get_intnum().unwrap().get_i64().unwrap(), 99);
    }

    #[test]
    fn substitute_replaces_placeholder() {
        let mut e = Expr::new();
        e.append_leaf(Leaf::Subst(0));
        e.append_leaf(Leaf::Int(IntNum::from_i64(1)));
        e.append_op(Op::Add, 2);
        let args = vec![int(41)];
        let out = e.substitute(&args).unwrap();
        let mut out = out;
        out.simplify(true);
        assert_eq!(out.get_intnum().unwrap().get_i64().unwrap(), 42);
    }
}

/// Randomized checks for the structural laws `simplify` is supposed to
/// hold regardless of tree shape, matching `cranelift-codegen`'s own use
/// of `proptest` for its IR legalization passes.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn int(n: i64) -> Expr {
        Expr::from_int(IntNum::from_i64(n))
    }

    /// Left-leaning binary `Add` tree over `values`, e.g. `((v0+v1)+v2)`.
    fn left_leaning_sum(values: &[i64]) -> Expr {
        let mut it = values.iter();
        let mut e = int(*it.next().unwrap());
        for &v in it {
            e = Expr::binary(Op::Add, e, int(v));
        }
        e
    }

    /// Right-leaning binary `Add` tree over `values`, e.g. `(v0+(v1+v2))`.
    fn right_leaning_sum(values: &[i64]) -> Expr {
        let mut it = values.iter().rev();
        let mut e = int(*it.next().unwrap());
        for &v in it {
            e = Expr::binary(Op::Add, int(v), e);
        }
        e
    }

    /// Flat n-ary `Add` built the way a parser folding a `+`-chain would
    /// (spec's `append_operand`/`append_op` sequence, one op for all terms).
    fn flat_nary_sum(values: &[i64]) -> Expr {
        let mut e = Expr::new();
        for &v in values {
            e.append_operand(int(v));
        }
        e.append_op(Op::Add, values.len());
        e
    }

    fn sum(values: &[i64]) -> i64 {
        values.iter().sum()
    }

    proptest! {
        #[test]
        fn simplify_folds_any_add_shape_to_the_arithmetic_sum(
            values in prop::collection::vec(-1000i64..1000, 1..8),
        ) {
            let expected = sum(&values);

            let mut left = left_leaning_sum(&values);
            left.simplify(true);
            prop_assert_eq!(left.get_intnum().unwrap().get_i64().unwrap(), expected);

            let mut right = right_leaning_sum(&values);
            right.simplify(true);
            prop_assert_eq!(right.get_intnum().unwrap().get_i64().unwrap(), expected);

            let mut flat = flat_nary_sum(&values);
            flat.simplify(true);
            prop_assert_eq!(flat.get_intnum().unwrap().get_i64().unwrap(), expected);
        }

        #[test]
        fn simplify_is_idempotent_on_random_shapes(
            values in prop::collection::vec(-1000i64..1000, 1..8),
        ) {
            let mut e = left_leaning_sum(&values);
            e.simplify(true);
            let once = format!("{:?}", e.terms());
            e.simplify(true);
            let twice = format!("{:?}", e.terms());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn simplify_is_insensitive_to_operand_order(
            values in prop::collection::vec(-1000i64..1000, 1..8),
        ) {
            let forward = sum(&values);
            let mut reversed_values = values.clone();
            reversed_values.reverse();
            let mut e = left_leaning_sum(&reversed_values);
            e.simplify(true);
            prop_assert_eq!(e.get_intnum().unwrap().get_i64().unwrap(), forward);
        }

        #[test]
        fn clone_is_a_deep_copy_under_random_shapes(
            values in prop::collection::vec(-1000i64..1000, 1..8),
        ) {
            let original = left_leaning_sum(&values);
            let mut clone = original.clone();
            clone.simplify(true);

            // simplifying the clone must never change the length, depths,
            // or term contents of the untouched original.
            prop_assert_eq!(original.terms().len(), left_leaning_sum(&values).terms().len());
            for (a, b) in original.terms().iter().zip(left_leaning_sum(&values).terms().iter()) {
                prop_assert_eq!(a.depth, b.depth);
            }
        }
    }
}
