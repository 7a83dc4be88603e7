//! Widening of branches whose offsets overflow 16 bits
//!
//! Most branch instructions encode their target as a signed 16-bit offset relative to the branch.
//! Methods longer than that can still be written, but any branch crossing too many bytes has to be
//! re-expressed in terms of `goto_w`/`jsr_w`, which carry a 32-bit offset.
//!
//! Widening a branch grows the code between other branches and their targets, so one widening
//! can push further branches out of range. The work is driven by a stack of branches known to be
//! out of range, and each widening only lengthens the branches whose span covers it. This always
//! terminates: a widened branch never needs revisiting, and the `goto` introduced by a conditional
//! rewrite only ever jumps over the adjacent `goto_w`.
//!
//! Every rewrite grows the code by a multiple of four bytes, so `tableswitch` and `lookupswitch`
//! padding elsewhere in the method is unaffected:
//!
//! ```text,ignore,no_run
//!     goto L2               nop
//! L1: ...                   nop
//!     ...         =>        goto_w L2
//! L2: ...               L1: ...
//!                           ...
//!                       L2: ...
//! ```
//!
//! `jsr` gets the same `nop nop jsr_w` treatment. A conditional branch keeps its condition and is
//! redirected to a pair of fresh blocks (appended to the block arena) placed right after it:
//!
//! ```text,ignore,no_run
//!     if* L2                if* L4
//! L1: ...                   goto L1
//!     ...         =>    L4: goto_w L2
//! L2: ...               L1: ...
//!                           ...
//!                       L2: ...
//! ```

use crate::jvm::code::{BasicBlock, BlockId, BranchInstruction, JumpTargets};
use crate::util::{Interval, Offset, OffsetVec, SegmentTree, Width};
use std::collections::{HashMap, HashSet};
use std::ops::{RangeBounds, RangeInclusive};

/// Offsets reachable by `goto`, `jsr`, and `if*`
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

type ArenaBranch = BranchInstruction<BlockId, BlockId, BlockId>;
type ArenaBlock<Frame, Insn> = BasicBlock<Frame, Insn, ArenaBranch>;

/// Widen every branch in `block_order` whose target is out of `small_jump_range`
///
/// Conditional branches get two new blocks each, pushed onto `blocks` and spliced into
/// `block_order`. The `goto_w` block copies the frame of the branch target. The `goto` block is
/// only entered by falling through, so it gets `Frame::default()`. Outside of tests,
/// `small_jump_range` is `SIGNED_16BIT_JUMP_RANGE`.
///
/// Returns how many branches were widened.
pub fn widen_oversized_jumps<Frame: Clone + Default, Insn: Default + Width>(
    block_order: &mut Vec<BlockId>,
    blocks: &mut Vec<ArenaBlock<Frame, Insn>>,
    small_jump_range: &impl RangeBounds<isize>,
) -> usize {
    // Position in the layout and starting byte offset of each placed block
    let mut placement: HashMap<BlockId, (usize, Offset)> = HashMap::new();
    let mut offset = Offset(0);
    for (position, block_id) in block_order.iter().enumerate() {
        placement.insert(*block_id, (position, offset));
        offset.0 += blocks[block_id.0].width();
    }

    let mut jumps: Vec<Jump> = block_order
        .iter()
        .filter_map(|block_id| {
            let block = &blocks[block_id.0];
            let target = match block.branch_end.jump_targets() {
                JumpTargets::Regular(target) => target,
                _ => return None,
            };
            let (position, block_start) = placement[block_id];
            let branch_offset = block_start.0 + block.instructions.offset_len().0;
            let (target_position, target_offset) = *placement.get(&target)?;
            Some(Jump {
                block: *block_id,
                from: position + 1,
                to: target_position,
                unconditional: matches!(
                    block.branch_end,
                    BranchInstruction::Goto(_) | BranchInstruction::Jsr(_, _)
                ),
                distance: target_offset.0 as isize - branch_offset as isize,
            })
        })
        .collect();
    jumps.sort_unstable_by_key(|jump| (jump.low(), jump.high()));

    let mut pending: Vec<usize> = jumps
        .iter()
        .enumerate()
        .filter(|(_, jump)| !small_jump_range.contains(&jump.distance))
        .map(|(index, _)| index)
        .collect();
    if pending.is_empty() {
        return 0;
    }
    let mut oversized: HashSet<BlockId> = pending.iter().map(|index| jumps[*index].block).collect();

    let spans = SegmentTree::new(
        jumps
            .iter()
            .enumerate()
            .map(|(index, jump)| Span {
                index,
                low: jump.low(),
                high: jump.high(),
            })
            .collect(),
    );

    let mut next_block_id = blocks.len();
    let mut widen_unconditional: HashSet<BlockId> = HashSet::new();
    let mut widen_conditional: HashMap<BlockId, (BlockId, BlockId)> = HashMap::new();
    while let Some(index) = pending.pop() {
        let (block, unconditional, origin) = {
            let jump = &jumps[index];
            (jump.block, jump.unconditional, jump.from)
        };
        if unconditional {
            widen_unconditional.insert(block);
        } else {
            widen_conditional.insert(block, (BlockId(next_block_id), BlockId(next_block_id + 1)));
            next_block_id += 2;
        }

        // The rewrite sits at the start of the jump, so it lengthens every span covering that
        let mut covering: Vec<usize> = spans
            .intervals_containing(&origin)
            .into_iter()
            .map(|span| span.index)
            .collect();
        covering.sort_unstable();
        let growth = if unconditional { 4 } else { 8 };
        for covering_index in covering {
            let jump = &mut jumps[covering_index];
            if oversized.contains(&jump.block)
                || widen_unconditional.contains(&jump.block)
                || widen_conditional.contains_key(&jump.block)
            {
                continue;
            }
            jump.distance += if jump.distance < 0 { -growth } else { growth };
            if !small_jump_range.contains(&jump.distance) {
                oversized.insert(jump.block);
                pending.push(covering_index);
            }
        }
    }

    let mut new_block_order: Vec<BlockId> = Vec::with_capacity(block_order.len());
    for block_id in block_order.iter() {
        new_block_order.push(*block_id);
        if let Some((near, far)) = widen_conditional.get(block_id) {
            new_block_order.push(*near);
            new_block_order.push(*far);
        }
    }

    for block_id in &widen_unconditional {
        let block = &mut blocks[block_id.0];
        let widened = match &block.branch_end {
            BranchInstruction::Goto(target) => BranchInstruction::GotoW(*target),
            BranchInstruction::Jsr(target, next) => BranchInstruction::JsrW(*target, *next),
            _ => continue,
        };
        block.instructions.push(Insn::default());
        block.instructions.push(Insn::default());
        block.branch_end = widened;
    }

    // Arena ids must be handed out in order, so push the new blocks sorted by their ids
    let mut widen_conditional: Vec<(BlockId, (BlockId, BlockId))> =
        widen_conditional.into_iter().collect();
    widen_conditional.sort_unstable_by_key(|(_, (near, _))| *near);
    for (block_id, (near, far)) in &widen_conditional {
        let (near, far) = (*near, *far);
        let block = &mut blocks[block_id.0];
        let (branch_end, fallthrough, target) = match &block.branch_end {
            BranchInstruction::If(comp, target, next) => {
                (BranchInstruction::If(*comp, far, near), *next, *target)
            }
            BranchInstruction::IfICmp(comp, target, next) => {
                (BranchInstruction::IfICmp(*comp, far, near), *next, *target)
            }
            BranchInstruction::IfACmp(comp, target, next) => {
                (BranchInstruction::IfACmp(*comp, far, near), *next, *target)
            }
            BranchInstruction::IfNull(comp, target, next) => {
                (BranchInstruction::IfNull(*comp, far, near), *next, *target)
            }
            _ => continue,
        };
        block.branch_end = branch_end;

        let target_frame = blocks[target.0].frame.clone();
        blocks.push(BasicBlock {
            instructions: OffsetVec::new(),
            frame: Frame::default(),
            branch_end: BranchInstruction::Goto(fallthrough),
        });
        blocks.push(BasicBlock {
            instructions: OffsetVec::new(),
            frame: target_frame,
            branch_end: BranchInstruction::GotoW(target),
        });
    }

    let widened = widen_unconditional.len() + widen_conditional.len();
    log::debug!("Widened {} oversized jumps", widened);

    *block_order = new_block_order;
    widened
}

/// Branch that might need widening
#[derive(Debug)]
struct Jump {
    /// Block ending in the branch
    block: BlockId,

    /// Layout position right after the branch
    from: usize,

    /// Layout position of the target block
    to: usize,

    /// `goto` or `jsr`
    unconditional: bool,

    /// Current relative offset from the branch to its target
    distance: isize,
}

impl Jump {
    /// First position whose growth lengthens the jump
    ///
    /// Growth at the end of the block right before a backward target lands outside the jump.
    fn low(&self) -> usize {
        if self.to < self.from {
            self.to + 1
        } else {
            self.from
        }
    }

    fn high(&self) -> usize {
        self.from.max(self.to)
    }
}

/// Layout positions spanned by the jump at `index`
struct Span {
    index: usize,
    low: usize,
    high: usize,
}

impl Interval for Span {
    type Endpoint = usize;

    fn from(&self) -> usize {
        self.low
    }

    fn until(&self) -> usize {
        self.high
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{EqComparison, Instruction, OrdComparison};
    use std::convert::TryFrom;

    type Branch = BranchInstruction<BlockId, BlockId, BlockId>;
    type Block = BasicBlock<(), Instruction, Branch>;

    /// Block whose instructions (not counting the branch) take exactly `len` bytes
    fn filler(len: usize, branch_end: Branch) -> Block {
        let mut instructions = OffsetVec::new();
        if len % 2 == 1 {
            instructions.push(Instruction::Nop);
        }
        for _ in 0..len / 2 {
            instructions.push(Instruction::IConst2);
            instructions.push(Instruction::Pop);
        }
        BasicBlock {
            instructions,
            frame: (),
            branch_end,
        }
    }

    fn branch_only(branch_end: Branch) -> Block {
        filler(0, branch_end)
    }

    fn padded(mut block: Block, branch_end: Branch) -> Block {
        block.instructions.push(Instruction::Nop);
        block.instructions.push(Instruction::Nop);
        block.branch_end = branch_end;
        block
    }

    fn ids<const N: usize>() -> [BlockId; N] {
        let mut ids = [BlockId::START; N];
        for (idx, id) in ids.iter_mut().enumerate() {
            *id = BlockId(idx);
        }
        ids
    }

    fn check_widening(
        mut order: Vec<BlockId>,
        mut blocks: Vec<Block>,
        expected_order: &[BlockId],
        expected_blocks: &[Block],
    ) {
        let original_order = order.clone();
        let before = BasicBlock::compute_block_offsets(&order, &blocks);
        widen_oversized_jumps(&mut order, &mut blocks, &SIGNED_16BIT_JUMP_RANGE);
        let after = BasicBlock::compute_block_offsets(&order, &blocks);

        assert_eq!(order, expected_order, "block order");
        assert_eq!(blocks.len(), expected_blocks.len(), "block count");
        for (idx, (block, expected)) in blocks.iter().zip(expected_blocks).enumerate() {
            assert_eq!(block, expected, "block {}", idx);

            let branch_offset = (after[idx].0 + block.instructions.offset_len().0) as isize;
            let (target, widened) = match block.branch_end.jump_targets() {
                JumpTargets::Regular(target) => (target, false),
                JumpTargets::Wide(target) => (target, true),
                JumpTargets::None | JumpTargets::WideMany(_) => continue,
            };
            let distance = after[target.0].0 as isize - branch_offset;
            assert_eq!(
                i16::try_from(distance).is_err(),
                widened,
                "branch from block {} covers {} bytes",
                idx,
                distance
            );
        }

        // Switch padding stays valid only if blocks move by multiples of 4
        for block_id in original_order {
            let moved = after[block_id.0].0.abs_diff(before[block_id.0].0);
            assert_eq!(moved % 4, 0, "{:?} moved by {}", block_id, moved);
        }
    }

    #[test]
    fn straight_line_code_is_untouched() {
        let [l0] = ids::<1>();
        let b0 = filler(13, BranchInstruction::Return);
        check_widening(vec![l0], vec![b0.clone()], &[l0], &[b0]);
    }

    #[test]
    fn short_jumps_are_untouched() {
        let [l0, l1, l2] = ids::<3>();
        let blocks = vec![
            filler(2, BranchInstruction::If(OrdComparison::LT, l2, l1)),
            filler(2, BranchInstruction::Return),
            filler(2, BranchInstruction::Goto(l1)),
        ];
        check_widening(vec![l0, l1, l2], blocks.clone(), &[l0, l1, l2], &blocks);
    }

    #[test]
    fn backward_goto_is_padded() {
        let [l0, l1, l2] = ids::<3>();
        let b0 = filler(2, BranchInstruction::Goto(l2));
        let b1 = filler(2, BranchInstruction::Return);
        let b2 = filler(34000, BranchInstruction::Goto(l1));
        let wide_b2 = padded(b2.clone(), BranchInstruction::GotoW(l1));

        check_widening(
            vec![l0, l1, l2],
            vec![b0.clone(), b1.clone(), b2],
            &[l0, l1, l2],
            &[b0, b1, wide_b2],
        );
    }

    #[test]
    fn forward_jsr_is_padded() {
        let [l0, l1, l2] = ids::<3>();
        let b0 = filler(2, BranchInstruction::Jsr(l2, l1));
        let b1 = filler(34000, BranchInstruction::Return);
        let b2 = filler(2, BranchInstruction::Ret(1));
        let wide_b0 = padded(b0.clone(), BranchInstruction::JsrW(l2, l1));

        check_widening(
            vec![l0, l1, l2],
            vec![b0, b1.clone(), b2.clone()],
            &[l0, l1, l2],
            &[wide_b0, b1, b2],
        );
    }

    #[test]
    fn forward_goto_is_padded() {
        let [l0, l1, l2, l3] = ids::<4>();
        let b0 = filler(2, BranchInstruction::If(OrdComparison::EQ, l2, l1));
        let b1 = filler(2, BranchInstruction::Goto(l3));
        let b2 = filler(34000, BranchInstruction::Return);
        let b3 = filler(2, BranchInstruction::Return);
        let wide_b1 = padded(b1.clone(), BranchInstruction::GotoW(l3));

        check_widening(
            vec![l0, l1, l2, l3],
            vec![b0.clone(), b1, b2.clone(), b3.clone()],
            &[l0, l1, l2, l3],
            &[b0, wide_b1, b2, b3],
        );
    }

    #[test]
    fn backward_conditional_keeps_its_condition() {
        let [l0, l1, l2, l3, l4, l5] = ids::<6>();
        let b0 = filler(2, BranchInstruction::Goto(l2));
        let b1 = filler(2, BranchInstruction::Return);
        let b2 = filler(34000, BranchInstruction::If(OrdComparison::EQ, l1, l3));
        let b3 = filler(2, BranchInstruction::Return);

        let mut redirected_b2 = b2.clone();
        redirected_b2.branch_end = BranchInstruction::If(OrdComparison::EQ, l5, l4);

        check_widening(
            vec![l0, l1, l2, l3],
            vec![b0.clone(), b1.clone(), b2, b3.clone()],
            &[l0, l1, l2, l4, l5, l3],
            &[
                b0,
                b1,
                redirected_b2,
                b3,
                branch_only(BranchInstruction::Goto(l3)),
                branch_only(BranchInstruction::GotoW(l1)),
            ],
        );
    }

    #[test]
    fn forward_conditional_keeps_its_condition() {
        let [l0, l1, l2, l3, l4] = ids::<5>();
        let b0 = filler(2, BranchInstruction::IfNull(EqComparison::NE, l2, l1));
        let b1 = filler(34000, BranchInstruction::Return);
        let b2 = filler(2, BranchInstruction::Return);

        let mut redirected_b0 = b0.clone();
        redirected_b0.branch_end = BranchInstruction::IfNull(EqComparison::NE, l4, l3);

        check_widening(
            vec![l0, l1, l2],
            vec![b0, b1.clone(), b2.clone()],
            &[l0, l3, l4, l1, l2],
            &[
                redirected_b0,
                b1,
                b2,
                branch_only(BranchInstruction::Goto(l1)),
                branch_only(BranchInstruction::GotoW(l2)),
            ],
        );
    }

    #[test]
    fn only_far_block_copies_a_frame() {
        let [l0, l1, l2, l3, l4] = ids::<5>();
        let with_frame = |len, branch_end, frame| {
            let block = filler(len, branch_end);
            BasicBlock {
                frame,
                instructions: block.instructions,
                branch_end: block.branch_end,
            }
        };
        let mut blocks = vec![
            with_frame(2, BranchInstruction::If(OrdComparison::EQ, l2, l1), "start"),
            with_frame(34000, BranchInstruction::Return, "next"),
            with_frame(2, BranchInstruction::Return, "far"),
        ];
        let mut order = vec![l0, l1, l2];

        assert_eq!(
            widen_oversized_jumps(&mut order, &mut blocks, &SIGNED_16BIT_JUMP_RANGE),
            1
        );
        assert_eq!(order, vec![l0, l3, l4, l1, l2]);
        assert_eq!(blocks[l3.0].frame, "");
        assert_eq!(blocks[l4.0].frame, "far");
    }

    #[test]
    fn growth_before_backward_target_is_ignored() {
        let [l0, l1, l2, l3] = ids::<4>();
        let blocks = vec![
            filler(0, BranchInstruction::Goto(l3)),
            filler(32000, BranchInstruction::FallThrough(l2)),
            filler(768, BranchInstruction::Goto(l1)),
            filler(2, BranchInstruction::Return),
        ];

        // `goto l1` covers exactly `i16::MIN` bytes and the padding of `goto l3` sits before l1
        let wide_b0 = padded(blocks[0].clone(), BranchInstruction::GotoW(l3));
        check_widening(
            vec![l0, l1, l2, l3],
            blocks.clone(),
            &[l0, l1, l2, l3],
            &[wide_b0, blocks[1].clone(), blocks[2].clone(), blocks[3].clone()],
        );
    }

    #[test]
    fn narrow_range_for_small_methods() {
        let [l0, l1, l2] = ids::<3>();
        let mut blocks = vec![
            filler(2, BranchInstruction::Goto(l2)),
            filler(40, BranchInstruction::Return),
            filler(2, BranchInstruction::Return),
        ];
        let mut order = vec![l0, l1, l2];
        assert_eq!(widen_oversized_jumps(&mut order, &mut blocks, &(-16..=16)), 1);
        assert_eq!(blocks[0].branch_end, BranchInstruction::GotoW(l2));
        assert_eq!(blocks[0].instructions.len(), 4);
    }

    // One widening pushes its neighbours over the edge: l4->l2 is oversized from the start, which
    // makes l5->l3 too long, and that in turn makes l3->l7 too long. l0->l3 and l6->l9 stay short.
    #[test]
    fn widening_cascades() {
        let [l0, l1, l2, l3, l4, l5, l6, l7, l8, l9, l10, l11, l12, l13] = ids::<14>();

        let b0 = filler(2, BranchInstruction::IfICmp(OrdComparison::GT, l3, l1));
        let b1 = filler(4000, BranchInstruction::FallThrough(l2));
        let b2 = filler(
            i16::MAX as usize - b1.width() - 5,
            BranchInstruction::FallThrough(l3),
        );
        let b3 = filler(2000, BranchInstruction::IfACmp(EqComparison::EQ, l7, l5));
        let b4 = filler(
            i16::MAX as usize + 6 - b3.width() - 4000,
            BranchInstruction::Goto(l2),
        );
        let b5 = filler(
            i16::MAX as usize - 2 - b3.width() - b4.width(),
            BranchInstruction::IfICmp(OrdComparison::GT, l3, l6),
        );
        let b6 = filler(
            2000 - 6,
            BranchInstruction::IfICmp(OrdComparison::GT, l9, l7),
        );
        let b7 = filler(
            i16::MAX as usize + 1 - b4.width() - b5.width() - b6.width(),
            BranchInstruction::FallThrough(l8),
        );
        let b8 = filler(20, BranchInstruction::FallThrough(l9));
        let b9 = branch_only(BranchInstruction::Return);

        assert_eq!(
            b0.branch_end.width() + b1.width() + b2.width(),
            i16::MAX as usize - 2
        );
        assert_eq!(
            b2.width() + b3.width() + b4.width() - b4.branch_end.width(),
            i16::MAX as usize + 24768
        );
        assert_eq!(
            b3.width() + b4.width() + b5.width() - b5.branch_end.width(),
            i16::MAX as usize - 2
        );
        assert_eq!(
            b3.branch_end.width() + b4.width() + b5.width() + b6.width(),
            i16::MAX as usize - 2
        );
        assert_eq!(b7.width() + b8.width(), 26);

        let mut redirected_b3 = b3.clone();
        redirected_b3.branch_end = BranchInstruction::IfACmp(EqComparison::EQ, l11, l10);
        let wide_b4 = padded(b4.clone(), BranchInstruction::GotoW(l2));
        let mut redirected_b5 = b5.clone();
        redirected_b5.branch_end = BranchInstruction::IfICmp(OrdComparison::GT, l13, l12);

        check_widening(
            vec![l0, l1, l2, l3, l4, l5, l6, l7, l8, l9],
            vec![
                b0.clone(),
                b1.clone(),
                b2.clone(),
                b3,
                b4,
                b5,
                b6.clone(),
                b7.clone(),
                b8.clone(),
                b9.clone(),
            ],
            &[l0, l1, l2, l3, l10, l11, l4, l5, l12, l13, l6, l7, l8, l9],
            &[
                b0,
                b1,
                b2,
                redirected_b3,
                wide_b4,
                redirected_b5,
                b6,
                b7,
                b8,
                b9,
                branch_only(BranchInstruction::Goto(l5)),
                branch_only(BranchInstruction::GotoW(l7)),
                branch_only(BranchInstruction::Goto(l6)),
                branch_only(BranchInstruction::GotoW(l3)),
            ],
        );
    }
}
