//! The span-dependent optimizer (spec §4.6 / C6) — the densest and most
//! important algorithm in the core.
//!
//! Implements the fixed point from spec §4.6's pseudocode: finalize every
//! bytecode, assign provisional offsets, run `calc_len` (registering
//! spans along the way), then repeatedly widen whichever span is
//! furthest out of range, in address order, propagating the resulting
//! offset shift to everything after it, until no span crosses its
//! threshold.
//!
//! Work ordering uses a binary heap keyed by the owning bytecode's
//! current offset (spec §4.6 requirement 4). Because widening a bytecode
//! shifts the offsets of everything after it, a heap entry's offset can
//! go stale between when it's pushed and when it's popped; rather than
//! rebuild the heap, stale entries are detected against the bytecode's
//! live offset and re-pushed — the same lazy-deletion trick used for
//! decrease-key in textbook Dijkstra.

use crate::bytecode::{Bytecode, BytecodeId};
use crate::contents::SpecialKind;
use crate::error::AsmError;
use crate::span::SpanId;
use cranelift_entity::EntityRef;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A registered span: the bytecode that owns it, which of that
/// bytecode's spans this is, and its live thresholds (spec §3, Entity:
/// Span).
struct SpanState {
    owner: BytecodeId,
    id: SpanId,
    neg_thres: i64,
    pos_thres: i64,
    last_val: i64,
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
    offset_snapshot: u64,
    span_idx: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset_snapshot.cmp(&other.offset_snapshot)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs the fixed point over one section's bytecodes in place.
pub fn optimize(bytecodes: &mut Vec<Bytecode>) -> Result<(), AsmError> {
    log::debug!("optimize: starting fixed point over {} bytecodes", bytecodes.len());
    for (i, bc) in bytecodes.iter_mut().enumerate() {
        bc.index = i as u32;
        bc.finalize(BytecodeId::new(i))?;
    }

    let mut spans: Vec<SpanState> = Vec::new();
    for i in 0..bytecodes.len() {
        let id = BytecodeId::new(i);
        let mut new_spans = Vec::new();
        {
            let mut add_span = |owner: BytecodeId, span_id: SpanId, val: i64, neg: i64, pos: i64| {
                new_spans.push(SpanState {
                    owner,
                    id: span_id,
                    neg_thres: neg,
                    pos_thres: pos,
                    last_val: val,
                });
            };
            bytecodes[i].calc_len(id, &mut add_span)?;
        }
        spans.extend(new_spans);
    }

    // Resolve SPECIAL_OFFSET contents (align/org) against their initial,
    // not-yet-widened neighbors up front, the same walk `publish_final_offsets`
    // does — otherwise a jump whose target sits past an unresolved align
    // would measure its distance against a phantom zero-length pad.
    publish_final_offsets(bytecodes)?;

    log::debug!("optimize: registered {} spans", spans.len());

    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
    for (idx, span) in spans.iter().enumerate() {
        heap.push(Reverse(HeapEntry {
            offset_snapshot: bytecodes[span.owner.index()].offset,
            span_idx: idx,
        }));
    }

    let mut guard = 0usize;
    let max_iterations = bytecodes.len().saturating_mul(64) + 64;

    while let Some(Reverse(entry)) = heap.pop() {
        guard += 1;
        if guard > max_iterations {
            // spec §8 law 7: widenings are bounded by total possible
            // growth. Exceeding this means monotonicity was violated.
            return Err(AsmError::InternalLengthMismatch {
                expected: 0,
                written: 0,
            });
        }

        let span = &spans[entry.span_idx];
        let owner_idx = span.owner.index();
        let live_offset = bytecodes[owner_idx].offset;
        if live_offset != entry.offset_snapshot {
            // stale: the owner moved since this entry was pushed.
            heap.push(Reverse(HeapEntry {
                offset_snapshot: live_offset,
                span_idx: entry.span_idx,
            }));
            continue;
        }

        let measured = measure(bytecodes, span.owner, span.id);
        let span = &spans[entry.span_idx];
        if measured >= span.neg_thres && measured <= span.pos_thres {
            continue; // still within range, nothing to do
        }

        let old_val = span.last_val;
        let old_len = bytecodes[owner_idx].len;
        let result = bytecodes[owner_idx].expand(span.owner, span.id, old_val, measured)?;
        let new_len = bytecodes[owner_idx].len;

        if !result.did_grow && new_len == old_len {
            // contents reports it cannot widen further but we're still
            // out of range (spec §4.6 requirement 5).
            return Err(AsmError::ValueOutOfRange);
        }

        log::debug!(
            "optimize: widened bytecode {} (span {}) from {} to {} bytes",
            owner_idx, entry.span_idx, old_len, new_len
        );

        let span = &mut spans[entry.span_idx];
        span.last_val = measured;
        span.neg_thres = result.neg_thres;
        span.pos_thres = result.pos_thres;

        if new_len != old_len {
            let delta = new_len as i64 - old_len as i64;
            propagate_offset_shift(bytecodes, owner_idx + 1, delta)?;
        }

        if !result.no_more_growth {
            heap.push(Reverse(HeapEntry {
                offset_snapshot: bytecodes[owner_idx].offset,
                span_idx: entry.span_idx,
            }));
        }
        // re-check every other span; cheap rescans of siblings whose
        // measured distance depends on this bytecode are driven by their
        // own heap entries once their owner's offset changes.
        for (idx, s) in spans.iter().enumerate() {
            if idx == entry.span_idx {
                continue;
            }
            heap.push(Reverse(HeapEntry {
                offset_snapshot: bytecodes[s.owner.index()].offset,
                span_idx: idx,
            }));
        }
    }

    publish_final_offsets(bytecodes)?;
    log::debug!("optimize: converged after {} heap pops", guard);
    Ok(())
}

/// Shift every bytecode after `from` by `delta`, re-evaluating any
/// `SPECIAL_OFFSET` bytecode on the path since `update_offset` may itself
/// change that bytecode's length (spec §4.6 requirement 3).
fn propagate_offset_shift(
    bytecodes: &mut [Bytecode],
    from: usize,
    delta: i64,
) -> Result<(), AsmError> {
    for i in from..bytecodes.len() {
        let id = BytecodeId::new(i);
        let shifted = (bytecodes[i].offset as i64 + delta).max(0) as u64;
        let is_offset_kind = bytecodes[i]
            .contents
            .as_ref()
            .map(|c| c.special_kind() == SpecialKind::Offset)
            .unwrap_or(false);
        if is_offset_kind {
            bytecodes[i].update_offset(id, shifted)?;
        } else {
            bytecodes[i].offset = shifted;
        }
    }
    Ok(())
}

/// Recompute a span's current measured distance. Only the jump contents
/// variant registers measurable spans in this core; everything else
/// (the `MULTIPLE`/`OFFSET` pseudo-spans) resolves immediately in
/// `calc_len`/`update_offset` and never reaches the heap.
fn measure(bytecodes: &[Bytecode], owner: BytecodeId, span_id: SpanId) -> i64 {
    let bc = &bytecodes[owner.index()];
    let offsets = |id: BytecodeId| bytecodes[id.index()].offset;
    match &bc.contents {
        Some(crate::contents::Contents::Jump(j)) => j.remeasure(owner, &offsets),
        _ => {
            let _ = span_id;
            0
        }
    }
}

/// Publish final offsets to every bytecode, section by section (spec
/// §4.6, "After the fixed point..."). Labels inherit their bytecode's
/// offset separately, once the caller has a symbol table in hand (see
/// [`crate::object::Object::finish`]).
fn publish_final_offsets(bytecodes: &mut [Bytecode]) -> Result<(), AsmError> {
    let mut offset = 0u64;
    for i in 0..bytecodes.len() {
        let id = BytecodeId::new(i);
        offset = bytecodes[i].update_offset(id, offset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::{Contents, DataContents, JumpContents, JumpSelector};
    use crate::value::Value;

    fn data_bc(line: u32, n: usize) -> Bytecode {
        let mut bc = Bytecode::new(line);
        bc.transform(Contents::Data(DataContents::new(vec![0u8; n])));
        bc
    }

    fn jump_bc(line: u32, target: crate::bytecode::Location) -> Bytecode {
        let mut bc = Bytecode::new(line);
        let loc_expr = crate::expr::Expr::from_leaf(crate::expr::Leaf::Location(target));
        let mut value = Value::new(8, loc_expr);
        value.jump_target = true;
        let jump = JumpContents::new(vec![], vec![0xEB], vec![0x0F, 0x8A], 4, value);
        bc.transform(Contents::Jump(jump));
        bc
    }

    #[test]
    fn short_jump_stays_short_when_target_is_near() {
        // bc0: jmp L ; bc1..bc2: 2 bytes total ; L is right after.
        let target = crate::bytecode::Location::new(BytecodeId::new(2), 0);
        let mut bytecodes = vec![jump_bc(1, target), data_bc(2, 2), data_bc(3, 0)];
        optimize(&mut bytecodes).unwrap();
        match &bytecodes[0].contents {
            Some(Contents::Jump(j)) => assert_eq!(j.selector, JumpSelector::Short),
            _ => panic!("expected jump contents"),
        }
        assert_eq!(bytecodes[0].len, 2); // common(0) + short_opcode(1) + disp(1)
    }

    #[test]
    fn far_jump_widens_to_near() {
        let target = crate::bytecode::Location::new(BytecodeId::new(2), 0);
        let mut bytecodes = vec![jump_bc(1, target), data_bc(2, 300), data_bc(3, 0)];
        optimize(&mut bytecodes).unwrap();
        match &bytecodes[0].contents {
            Some(Contents::Jump(j)) => assert_eq!(j.selector, JumpSelector::Near),
            _ => panic!("expected jump contents"),
        }
        // offsets after the widened jump must reflect the same delta
        assert_eq!(bytecodes[1].offset, bytecodes[0].offset + bytecodes[0].len);
    }

    #[test]
    fn lengths_are_monotonically_nondecreasing() {
        let target = crate::bytecode::Location::new(BytecodeId::new(2), 0);
        let mut bytecodes = vec![jump_bc(1, target), data_bc(2, 300), data_bc(3, 0)];
        let before = bytecodes[0].len.max(2); // short-form minimum
        optimize(&mut bytecodes).unwrap();
        assert!(bytecodes[0].len >= before);
    }

    #[test]
    fn offsets_are_contiguous() {
        let mut bytecodes = vec![data_bc(1, 4), data_bc(2, 8), data_bc(3, 2)];
        optimize(&mut bytecodes).unwrap();
        assert_eq!(bytecodes[0].offset, 0);
        assert_eq!(bytecodes[1].offset, 4);
        assert_eq!(bytecodes[2].offset, 12);
    }
}
