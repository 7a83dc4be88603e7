use crate::jvm::class_file::SymbolTable;
use crate::jvm::code::{BlockId, BranchInstruction, ControlFlowGraph};
use crate::jvm::Error;
use crate::util::Offset;
use std::convert::TryFrom;

/// Maximum operand stack height and number of local variable slots of a method
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxSizes {
    pub max_stack: u16,
    pub max_locals: u16,
}

impl MaxSizes {
    /// Compute maximums by walking the reachable blocks of the method
    ///
    /// Every block is entered with the stack height of the first edge reaching it. Exception
    /// handlers start with the caught exception on the stack and subroutines start with the
    /// return address on the stack.
    ///
    /// `parameter_slots` must include the receiver, if there is one.
    pub fn compute(
        cfg: &ControlFlowGraph,
        symbols: &SymbolTable,
        parameter_slots: usize,
    ) -> Result<MaxSizes, Error> {
        let mut entry_heights: Vec<Option<usize>> = vec![None; cfg.blocks.len()];
        let mut max_stack: usize = 0;
        let mut to_visit: Vec<(BlockId, usize)> = vec![(BlockId::START, 0)];

        while let Some((block_id, height)) = to_visit.pop() {
            if block_id.0 >= cfg.blocks.len() || entry_heights[block_id.0].is_some() {
                continue;
            }
            entry_heights[block_id.0] = Some(height);
            max_stack = max_stack.max(height);

            for handler in cfg.handlers_covering(block_id) {
                to_visit.push((handler.handler, 1));
                max_stack = max_stack.max(1);
            }

            let block = &cfg.blocks[block_id.0];
            let mut height = height;
            for insn in block.instructions.iter() {
                let (pops, pushes) = insn.stack_effect(symbols)?;
                height = height
                    .checked_sub(pops)
                    .ok_or_else(|| Error::StackUnderflow(format!("{:?}", insn)))?;
                height += pushes;
                max_stack = max_stack.max(height);
            }

            let branch_end = &block.branch_end;
            let height = height
                .checked_sub(branch_end.stack_pops())
                .ok_or_else(|| Error::StackUnderflow(format!("{:?}", branch_end)))?;

            match branch_end {
                BranchInstruction::Jsr(target, next) | BranchInstruction::JsrW(target, next) => {
                    max_stack = max_stack.max(height + 1);
                    to_visit.push((*target, height + 1));
                    to_visit.push((*next, height));
                }
                _ => {
                    for successor in cfg.successors(block_id) {
                        to_visit.push((successor, height));
                    }
                }
            }
        }

        let mut max_locals = parameter_slots;
        for block in &cfg.blocks {
            for insn in block.instructions.iter() {
                if let Some((index, width)) = insn.local_access() {
                    max_locals = max_locals.max(index as usize + width);
                }
            }
            if let BranchInstruction::Ret(index) = block.branch_end {
                max_locals = max_locals.max(index as usize + 1);
            }
        }

        log::trace!(
            "Computed max stack {} and max locals {} over {} blocks",
            max_stack,
            max_locals,
            cfg.blocks.len()
        );

        Ok(MaxSizes {
            max_stack: u16::try_from(max_stack)
                .map_err(|_| Error::MethodCodeMaxStackOverflow(Offset(max_stack)))?,
            max_locals: u16::try_from(max_locals)
                .map_err(|_| Error::MethodCodeMaxLocalsOverflow(Offset(max_locals)))?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{CodeItem, Handler, Instruction, InvokeType, Label};
    use crate::util::Width;

    fn build(items: &[CodeItem], handlers: &[Handler<Label>]) -> ControlFlowGraph {
        ControlFlowGraph::build(items, handlers, true).unwrap()
    }

    #[test]
    fn straight_line_maximums() {
        let symbols = SymbolTable::new();
        let cfg = build(
            &[
                CodeItem::Instruction(Instruction::LConst1),
                CodeItem::Instruction(Instruction::LLoad(3)),
                CodeItem::Instruction(Instruction::LAdd),
                CodeItem::Branch(BranchInstruction::LReturn),
            ],
            &[],
        );
        let sizes = MaxSizes::compute(&cfg, &symbols, 1).unwrap();
        assert_eq!(sizes.max_stack, 4);
        assert_eq!(sizes.max_locals, 5);
    }

    #[test]
    fn method_descriptors_drive_heights() {
        let mut symbols = SymbolTable::new();
        let method = symbols.add_method_ref("Foo", "bar", "(JI)D", false);
        let cfg = build(
            &[
                CodeItem::Instruction(Instruction::LConst0),
                CodeItem::Instruction(Instruction::IConst2),
                CodeItem::Instruction(Instruction::Invoke(InvokeType::Static, method)),
                CodeItem::Branch(BranchInstruction::DReturn),
            ],
            &[],
        );
        let sizes = MaxSizes::compute(&cfg, &symbols, 0).unwrap();
        assert_eq!(sizes.max_stack, 3);
        assert_eq!(sizes.max_locals, 0);
    }

    #[test]
    fn handlers_start_with_one_slot() {
        let symbols = SymbolTable::new();
        let cfg = build(
            &[
                CodeItem::Label(Label(0)),
                CodeItem::Instruction(Instruction::Nop),
                CodeItem::Label(Label(1)),
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Label(Label(2)),
                CodeItem::Instruction(Instruction::Dup),
                CodeItem::Instruction(Instruction::Pop),
                CodeItem::Branch(BranchInstruction::AThrow),
            ],
            &[Handler {
                start: Label(0),
                end: Label(1),
                handler: Label(2),
                catch_type: None,
            }],
        );
        assert_eq!(cfg.blocks[2].width(), 3);
        let sizes = MaxSizes::compute(&cfg, &symbols, 0).unwrap();
        assert_eq!(sizes.max_stack, 2);
    }

    #[test]
    fn subroutines_push_return_address() {
        let symbols = SymbolTable::new();
        let cfg = build(
            &[
                CodeItem::Branch(BranchInstruction::Jsr(Label(0), ())),
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Label(Label(0)),
                CodeItem::Instruction(Instruction::AStore(300)),
                CodeItem::Branch(BranchInstruction::Ret(300)),
            ],
            &[],
        );
        let sizes = MaxSizes::compute(&cfg, &symbols, 0).unwrap();
        assert_eq!(sizes.max_stack, 1);
        assert_eq!(sizes.max_locals, 301);
    }

    #[test]
    fn underflow_is_an_error() {
        let symbols = SymbolTable::new();
        let cfg = build(
            &[
                CodeItem::Instruction(Instruction::Pop),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            &[],
        );
        assert!(matches!(
            MaxSizes::compute(&cfg, &symbols, 0),
            Err(Error::StackUnderflow(_))
        ));
    }
}
