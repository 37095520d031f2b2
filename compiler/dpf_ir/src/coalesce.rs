//! Adjacent-step coalescing.
//!
//! Two consecutive equality tests over neighbouring fields of the same width
//! are equivalent to one test over the concatenated field: `eq8 [4] == 0x12`
//! followed by `eq8 [5] == 0x34` accepts exactly the messages accepted by
//! `eq16 [4] == 0x1234`. Merging them halves the number of trie levels the
//! dispatcher walks for that part of the filter.
//!
//! Pairs are only merged when the wider read stays naturally aligned
//! (according to the step's alignment hint) and fits in 32 bits. The pass
//! repeats until no pair merges, so four byte tests can become one word test.

use crate::program::{annotate, Program};
use crate::step::{Step, StepKind};

/// Return `program` with adjacent compatible equality steps merged.
pub fn coalesce(program: &Program) -> Program {
    let mut steps = program.steps().to_vec();
    while merge_pass(&mut steps) {
        // Alignment hints must be fresh before the next pass inspects them.
        annotate(&mut steps);
    }
    Program::from_steps(steps)
}

fn merge_pass(steps: &mut Vec<Step>) -> bool {
    let mut merged_any = false;
    let mut out = Vec::with_capacity(steps.len());
    let mut iter = steps.iter().copied().peekable();
    while let Some(step) = iter.next() {
        if let Some(merged) = iter.peek().and_then(|next| merge_pair(&step, next)) {
            out.push(merged);
            iter.next();
            merged_any = true;
        } else {
            out.push(step);
        }
    }
    *steps = out;
    merged_any
}

fn merge_pair(first: &Step, second: &Step) -> Option<Step> {
    let (StepKind::Eq { value: hi }, StepKind::Eq { value: lo }) = (first.kind, second.kind)
    else {
        return None;
    };
    let width = first.shape.width;
    if second.shape.width != width {
        return None;
    }
    let wide = width.doubled()?;
    let stride = u32::try_from(width.bytes()).ok()?;
    if first.shape.offset.checked_add(stride)? != second.shape.offset {
        return None;
    }
    if usize::try_from(first.align).ok()? < wide.bytes() {
        return None;
    }
    let bits = width.bits();
    Some(Step::equality(
        first.shape.offset,
        wide,
        (first.shape.mask << bits) | second.shape.mask,
        (hi << bits) | lo,
    ))
}
