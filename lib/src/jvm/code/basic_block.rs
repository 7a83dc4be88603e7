use crate::jvm::class_file::ClassConstantIndex;
use crate::jvm::code::{BlockId, BranchInstruction, Instruction, Label};
use crate::jvm::verifier::{BlockFrame, Frame};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use std::cell::Cell;
use std::collections::HashMap;

/// A JVM method code body is made up of a linear sequence of basic blocks.
///
/// We also store some extra information that ultimately allows us to compute things like: the
/// maximum height of the locals, the maximum height of the stack, and the stack map frames.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct BasicBlock<Frame, Insn, BrInsn> {
    /// Frame at the start of the block
    pub frame: Frame,

    /// Straight-line instructions in the block
    pub instructions: OffsetVec<Insn>,

    /// Branch instruction to close the block
    pub branch_end: BrInsn,
}

impl<Frame, Insn: Width, BrInsn: Width> Width for BasicBlock<Frame, Insn, BrInsn> {
    fn width(&self) -> usize {
        self.instructions.offset_len().0 + self.branch_end.width()
    }
}

impl<Frame, Insn: Width, BrInsn: Width> BasicBlock<Frame, Insn, BrInsn> {
    /// Given an expected order of blocks, compute the offset of every basic block with respect to
    /// that start of the method.
    ///
    /// The output is indexed by block id. Blocks missing from the order get offset 0.
    pub fn compute_block_offsets(block_layout_order: &[BlockId], blocks: &[Self]) -> Vec<Offset> {
        let mut block_offsets = vec![Offset(0); blocks.len()];
        let mut offset = Offset(0);
        for block_id in block_layout_order {
            block_offsets[block_id.0] = offset;
            offset.0 += blocks[block_id.0].width();
        }
        block_offsets
    }
}

/// Basic block of a method, after labels have been resolved
///
/// The frame is the one supplied by the caller of the method writer (if any).
pub type Block = BasicBlock<Option<BlockFrame>, Instruction, BranchInstruction<BlockId, BlockId, BlockId>>;

/// Element of the linear stream recorded by a method writer
#[derive(Debug, Clone, PartialEq)]
pub enum CodeItem {
    /// Place a label at the current position
    Label(Label),

    /// Frame supplied for the current position
    Frame(Frame<String, Label>),

    Instruction(Instruction),

    /// Branch instruction, which always closes the current block
    ///
    /// The fallthrough target is implicit: it is whatever comes next.
    Branch(BranchInstruction<Label, Label, ()>),
}

/// Exception handler (entry of the exception table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler<Lbl> {
    /// Start of the protected range (inclusive)
    pub start: Lbl,

    /// End of the protected range (exclusive)
    pub end: Lbl,

    /// Start of the handler code
    pub handler: Lbl,

    /// Class of exception caught (`None` catches everything)
    pub catch_type: Option<ClassConstantIndex>,
}

/// Control flow graph of a method body
///
/// Blocks live in an arena and refer to each other by [`BlockId`]. Their position in the arena
/// is also their initial layout order.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub blocks: Vec<Block>,
    pub handlers: Vec<Handler<BlockId>>,

    /// Block each label resolved to
    pub labels: HashMap<Label, BlockId>,
}

/// Block under construction
struct PendingBlock {
    frame: Option<Frame<String, Label>>,
    instructions: OffsetVec<Instruction>,
    branch_end: Option<BranchInstruction<Label, Label, ()>>,
}

impl PendingBlock {
    fn new() -> PendingBlock {
        PendingBlock {
            frame: None,
            instructions: OffsetVec::new(),
            branch_end: None,
        }
    }
}

impl ControlFlowGraph {
    /// Split the linear stream of a method body into basic blocks
    ///
    /// A new block starts at every placed label (unless the current block is still empty), after
    /// every branch, at every supplied frame, and before every `new` instruction. The last point
    /// ensures the site of an uninitialized object is always the start of a block.
    pub fn build(
        items: &[CodeItem],
        handlers: &[Handler<Label>],
        allow_subroutines: bool,
    ) -> Result<ControlFlowGraph, Error> {
        let mut pending: Vec<PendingBlock> = vec![];
        let mut labels: HashMap<Label, BlockId> = HashMap::new();
        let mut current = PendingBlock::new();

        for item in items {
            match item {
                CodeItem::Label(label) => {
                    if !current.instructions.is_empty() {
                        pending.push(std::mem::replace(&mut current, PendingBlock::new()));
                    }
                    if labels.insert(*label, BlockId(pending.len())).is_some() {
                        return Err(Error::DuplicateLabel(*label));
                    }
                }
                CodeItem::Frame(frame) => {
                    if !current.instructions.is_empty() {
                        pending.push(std::mem::replace(&mut current, PendingBlock::new()));
                    }
                    current.frame = Some(frame.clone());
                }
                CodeItem::Instruction(insn) => {
                    if matches!(insn, Instruction::New(_)) && !current.instructions.is_empty() {
                        pending.push(std::mem::replace(&mut current, PendingBlock::new()));
                    }
                    current.instructions.push(insn.clone());
                }
                CodeItem::Branch(branch) => {
                    if branch.is_subroutine() && !allow_subroutines {
                        return Err(Error::SubroutineWithFrames);
                    }
                    current.branch_end = Some(branch.clone());
                    pending.push(std::mem::replace(&mut current, PendingBlock::new()));
                }
            }
        }

        // The final block is always there, even if empty: it is the target of fallthroughs off
        // the previous block and of labels placed at the very end
        pending.push(current);

        let undefined: Cell<Option<Label>> = Cell::new(None);
        let resolve = |label: &Label| -> BlockId {
            match labels.get(label) {
                Some(block_id) => *block_id,
                None => {
                    if undefined.get().is_none() {
                        undefined.set(Some(*label));
                    }
                    BlockId::START
                }
            }
        };

        let block_count = pending.len();
        let mut blocks: Vec<Block> = Vec::with_capacity(block_count);
        for (idx, block) in pending.into_iter().enumerate() {
            let next = BlockId(idx + 1);
            let branch_end = match block.branch_end {
                Some(branch) => branch.map_labels(resolve, resolve, |_| next),
                None if idx + 1 == block_count => BranchInstruction::End,
                None => BranchInstruction::FallThrough(next),
            };
            let frame = match block.frame {
                None => None,
                Some(frame) => Some(Frame {
                    locals: frame
                        .locals
                        .iter()
                        .map(|t| t.map(String::clone, resolve))
                        .collect(),
                    stack: frame
                        .stack
                        .iter()
                        .map(|t| t.map(String::clone, resolve))
                        .collect(),
                }),
            };
            blocks.push(BasicBlock {
                frame,
                instructions: block.instructions,
                branch_end,
            });
        }

        let handlers = handlers
            .iter()
            .map(|handler| Handler {
                start: resolve(&handler.start),
                end: resolve(&handler.end),
                handler: resolve(&handler.handler),
                catch_type: handler.catch_type,
            })
            .collect();

        if let Some(label) = undefined.get() {
            return Err(Error::UndefinedLabel(label));
        }

        Ok(ControlFlowGraph {
            blocks,
            handlers,
            labels,
        })
    }

    /// Blocks control can flow to from the end of a block (excluding exception handlers)
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let branch_end = &self.blocks[block.0].branch_end;
        let mut successors: Vec<BlockId> = branch_end.jump_targets().targets().to_vec();
        successors.extend(branch_end.fallthrough_target());
        successors
    }

    /// Handlers whose protected range includes the block
    pub fn handlers_covering(&self, block: BlockId) -> impl Iterator<Item = &Handler<BlockId>> {
        self.handlers
            .iter()
            .filter(move |handler| handler.start <= block && block < handler.end)
    }

    /// Does any block jump, switch, or call a subroutine?
    pub fn has_subroutines(&self) -> bool {
        self.blocks
            .iter()
            .any(|block| block.branch_end.is_subroutine())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::verifier::VerificationType;
    use CodeItem as C;

    fn label(n: u32) -> Label {
        Label(n)
    }

    #[test]
    fn straight_line() {
        let cfg = ControlFlowGraph::build(
            &[
                C::Instruction(Instruction::IConst0),
                C::Branch(BranchInstruction::IReturn),
            ],
            &[],
            false,
        )
        .unwrap();
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.blocks[0].width(), 2);
        assert_eq!(cfg.blocks[1].branch_end, BranchInstruction::End);
        assert_eq!(cfg.successors(BlockId(0)), vec![]);
    }

    #[test]
    fn labels_split_blocks() {
        let l0 = label(0);
        let l1 = label(1);
        let cfg = ControlFlowGraph::build(
            &[
                C::Label(l0),
                C::Instruction(Instruction::ILoad(0)),
                C::Branch(BranchInstruction::If(OrdComparison::EQ, l1, ())),
                C::Instruction(Instruction::IConst1),
                C::Branch(BranchInstruction::IReturn),
                C::Label(l1),
                C::Instruction(Instruction::IConst0),
                C::Branch(BranchInstruction::IReturn),
            ],
            &[],
            false,
        )
        .unwrap();

        assert_eq!(cfg.labels[&l0], BlockId(0));
        assert_eq!(cfg.labels[&l1], BlockId(2));
        assert_eq!(
            cfg.blocks[0].branch_end,
            BranchInstruction::If(OrdComparison::EQ, BlockId(2), BlockId(1))
        );
        assert_eq!(cfg.successors(BlockId(0)), vec![BlockId(2), BlockId(1)]);
    }

    #[test]
    fn label_in_empty_block_is_an_alias() {
        let cfg = ControlFlowGraph::build(
            &[
                C::Instruction(Instruction::Nop),
                C::Label(label(0)),
                C::Label(label(1)),
                C::Instruction(Instruction::Nop),
                C::Branch(BranchInstruction::Return),
            ],
            &[],
            false,
        )
        .unwrap();
        assert_eq!(cfg.labels[&label(0)], BlockId(1));
        assert_eq!(cfg.labels[&label(1)], BlockId(1));
        assert_eq!(
            cfg.blocks[0].branch_end,
            BranchInstruction::FallThrough(BlockId(1))
        );
    }

    #[test]
    fn new_starts_a_block() {
        use crate::jvm::class_file::ConstantIndex;

        let class = ClassConstantIndex(ConstantIndex(2));
        let cfg = ControlFlowGraph::build(
            &[
                C::Instruction(Instruction::Nop),
                C::Instruction(Instruction::New(class)),
                C::Instruction(Instruction::Dup),
                C::Branch(BranchInstruction::Return),
            ],
            &[],
            false,
        )
        .unwrap();
        assert_eq!(cfg.blocks[1].instructions.get(0), Some(&Instruction::New(class)));
    }

    #[test]
    fn label_errors() {
        let undefined = ControlFlowGraph::build(
            &[C::Branch(BranchInstruction::Goto(label(7)))],
            &[],
            false,
        );
        assert!(matches!(undefined, Err(Error::UndefinedLabel(l)) if l == label(7)));

        let duplicate = ControlFlowGraph::build(
            &[
                C::Label(label(3)),
                C::Instruction(Instruction::Nop),
                C::Label(label(3)),
            ],
            &[],
            false,
        );
        assert!(matches!(duplicate, Err(Error::DuplicateLabel(l)) if l == label(3)));

        let handler = Handler {
            start: label(0),
            end: label(1),
            handler: label(2),
            catch_type: None,
        };
        let missing_handler = ControlFlowGraph::build(
            &[C::Label(label(0)), C::Label(label(1)), C::Branch(BranchInstruction::Return)],
            &[handler],
            false,
        );
        assert!(matches!(missing_handler, Err(Error::UndefinedLabel(l)) if l == label(2)));
    }

    #[test]
    fn subroutines() {
        let items = [
            C::Branch(BranchInstruction::Jsr(label(0), ())),
            C::Branch(BranchInstruction::Return),
            C::Label(label(0)),
            C::Instruction(Instruction::AStore(1)),
            C::Branch(BranchInstruction::Ret(1)),
        ];
        assert!(matches!(
            ControlFlowGraph::build(&items, &[], false),
            Err(Error::SubroutineWithFrames)
        ));

        let cfg = ControlFlowGraph::build(&items, &[], true).unwrap();
        assert!(cfg.has_subroutines());
        assert_eq!(cfg.successors(BlockId(0)), vec![BlockId(2), BlockId(1)]);
        assert_eq!(cfg.successors(BlockId(2)), vec![]);
    }

    #[test]
    fn handlers_and_frames() {
        let cfg = ControlFlowGraph::build(
            &[
                C::Label(label(0)),
                C::Instruction(Instruction::Nop),
                C::Label(label(1)),
                C::Instruction(Instruction::Nop),
                C::Label(label(2)),
                C::Branch(BranchInstruction::Return),
                C::Label(label(3)),
                C::Frame(Frame::from_entries(
                    vec![],
                    vec![VerificationType::Object(String::from("java/lang/Throwable"))],
                )),
                C::Branch(BranchInstruction::AThrow),
            ],
            &[Handler {
                start: label(0),
                end: label(2),
                handler: label(3),
                catch_type: None,
            }],
            false,
        )
        .unwrap();

        let covering = |block| cfg.handlers_covering(BlockId(block)).count();
        assert_eq!(covering(0), 1);
        assert_eq!(covering(1), 1);
        assert_eq!(covering(2), 0);
        assert_eq!(cfg.handlers[0].handler, BlockId(3));
        assert!(cfg.blocks[3].frame.is_some());
        assert!(cfg.blocks[2].frame.is_none());
    }
}
