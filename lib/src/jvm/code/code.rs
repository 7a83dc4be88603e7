use crate::jvm::class_file::{
    BytecodeArray, BytecodeIndex, ClassConstantIndex, Code, ConstantIndex, ExceptionHandler,
    StackMapTable, SymbolTable,
};
use crate::jvm::class_graph::CommonSuperclass;
use crate::jvm::code::{
    jump_encoding, BasicBlock, Block, BlockId, BranchInstruction, CodeItem, ControlFlowGraph,
    Handler, Instruction, Label, MaxSizes,
};
use crate::jvm::verifier::{
    entry_frame, infer_frames, replay_fallthrough_frame, BlockFrame, Frame, VerificationType,
};
use crate::jvm::{BinaryName, ComputeFlags, Error, MethodDescriptor, Name, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use std::cell::Cell;
use std::collections::HashSet;
use std::convert::TryFrom;

/// Method whose code is being assembled
#[derive(Debug, Clone)]
pub struct MethodContext {
    /// Internal name of the class declaring the method
    pub this_class: String,

    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_static: bool,
}

impl MethodContext {
    /// Local variable slots taken by the parameters (including the receiver)
    pub fn parameter_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static)
    }
}

/// Method body as recorded by a method writer
#[derive(Debug, Clone, Default)]
pub struct MethodCode {
    /// Instructions, labels, and supplied frames in order
    pub items: Vec<CodeItem>,

    /// Exception table entries, in priority order
    pub handlers: Vec<Handler<Label>>,

    /// Maximums supplied by the caller, used when they are not computed
    pub max_sizes: Option<MaxSizes>,
}

impl MethodCode {
    /// Lay out the method body and encode it into a `Code` attribute
    ///
    /// Depending on `flags`, the maximums and the stack map frames are either computed or taken
    /// as supplied. A `StackMapTable` is only emitted when `emit_stack_map` is set (the class
    /// version has a type-checking verifier) or when frames were supplied.
    pub fn assemble(
        &self,
        method: &MethodContext,
        flags: ComputeFlags,
        emit_stack_map: bool,
        symbols: &mut SymbolTable,
        supers: &mut CommonSuperclass,
    ) -> Result<Code, Error> {
        let compute_frames = flags.contains(ComputeFlags::COMPUTE_FRAMES);
        let compute_maxs = compute_frames || flags.contains(ComputeFlags::COMPUTE_MAXS);

        let cfg = ControlFlowGraph::build(&self.items, &self.handlers, !compute_frames)?;
        let MaxSizes {
            mut max_stack,
            max_locals,
        } = if compute_maxs {
            MaxSizes::compute(&cfg, symbols, method.parameter_slots())?
        } else {
            self.max_sizes.unwrap_or(MaxSizes {
                max_stack: 0,
                max_locals: 0,
            })
        };

        let ControlFlowGraph {
            mut blocks,
            handlers,
            ..
        } = cfg.clone();

        // Blocks never reached (only tracked when frames are computed)
        let mut dead_blocks: HashSet<BlockId> = HashSet::new();
        if compute_frames {
            let frames = infer_frames(&cfg, method, max_locals as usize, symbols, supers)?;
            for (idx, frame) in frames.into_iter().enumerate() {
                if frame.is_none() {
                    dead_blocks.insert(BlockId(idx));
                }
                blocks[idx].frame = frame;
            }
        }

        let mut block_order: Vec<BlockId> = (0..blocks.len()).map(BlockId).collect();
        set_switch_padding(&block_order, &mut blocks);

        // Dead blocks with no bytes in them can stay as they are
        dead_blocks.retain(|block_id| blocks[block_id.0].width() > 0);
        if !dead_blocks.is_empty() {
            for block_id in &dead_blocks {
                replace_dead_block(&mut blocks[block_id.0]);
            }
            max_stack = max_stack.max(1);
            log::debug!(
                "Replaced {} unreachable blocks in {}",
                dead_blocks.len(),
                method.name
            );
        }

        let widened = jump_encoding::widen_oversized_jumps(
            &mut block_order,
            &mut blocks,
            &jump_encoding::SIGNED_16BIT_JUMP_RANGE,
        );
        let has_supplied_frames = cfg.blocks.iter().any(|block| block.frame.is_some());
        if widened > 0 && !compute_frames && has_supplied_frames {
            add_widened_fallthrough_frames(
                &cfg,
                &mut blocks,
                method,
                max_locals as usize,
                symbols,
            )?;
        }

        let block_offsets = BasicBlock::compute_block_offsets(&block_order, &blocks);
        let code_length: usize = block_order
            .iter()
            .map(|block_id| blocks[block_id.0].width())
            .sum();
        if code_length > u16::MAX as usize {
            return Err(Error::MethodCodeOverflow(Offset(code_length)));
        }

        let mut code_array = BytecodeArray(Vec::with_capacity(code_length));
        for block_id in &block_order {
            let block = &blocks[block_id.0];
            for insn in block.instructions.iter() {
                insn.serialize(&mut code_array.0)?;
            }
            let branch_offset = block_offsets[block_id.0].0 + block.instructions.offset_len().0;
            relative_branch(&block.branch_end, branch_offset, &block_offsets)?
                .serialize(&mut code_array.0)?;
        }

        let frames = if compute_frames {
            computed_frames(&block_order, &blocks, &handlers, &dead_blocks, &block_offsets)
        } else {
            supplied_frames(&block_order, &blocks, &block_offsets)
        };

        let mut attributes = vec![];
        if !frames.is_empty() && (emit_stack_map || !compute_frames) {
            let stack_map_table = stack_map_table(&frames, method, &block_offsets, symbols)?;
            attributes.push(symbols.add_attribute(&stack_map_table)?);
        }

        let exception_table = exception_table(
            &handlers,
            &block_order,
            &blocks,
            &dead_blocks,
            &block_offsets,
        )?;

        log::debug!(
            "Assembled {} into {} bytes of code (max stack {}, max locals {})",
            method.name,
            code_length,
            max_stack,
            max_locals
        );

        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table,
            attributes,
        })
    }
}

/// Fix the padding of every switch so that its operands are 4-byte aligned
fn set_switch_padding(block_order: &[BlockId], blocks: &mut [Block]) {
    let mut offset = 0;
    for block_id in block_order {
        let block = &mut blocks[block_id.0];
        let branch_offset = offset + block.instructions.offset_len().0;
        block
            .branch_end
            .set_padding(((4 - (branch_offset + 1) % 4) % 4) as u8);
        offset += block.width();
    }
}

/// Give a frame to every block that a widened conditional branch used to fall into
///
/// After widening, such a block follows a `goto_w` and is only reached by a jump, so the verifier
/// expects a frame there even if none was supplied.
fn add_widened_fallthrough_frames(
    cfg: &ControlFlowGraph,
    blocks: &mut [Block],
    method: &MethodContext,
    max_locals: usize,
    symbols: &SymbolTable,
) -> Result<(), Error> {
    for block_id in 0..cfg.blocks.len() {
        let near = match blocks[block_id].branch_end.fallthrough_target() {
            Some(near) if near.0 >= cfg.blocks.len() => near,
            _ => continue,
        };
        let fallthrough = match blocks[near.0].branch_end {
            BranchInstruction::Goto(fallthrough) => fallthrough,
            _ => continue,
        };
        if blocks[fallthrough.0].frame.is_none() {
            let frame =
                replay_fallthrough_frame(cfg, method, max_locals, symbols, BlockId(block_id))?;
            blocks[fallthrough.0].frame = Some(frame);
        }
    }
    Ok(())
}

/// Overwrite an unreachable block with `nop`s followed by `athrow`, keeping its width
fn replace_dead_block(block: &mut Block) {
    let width = block.width();
    let mut instructions = OffsetVec::new();
    for _ in 1..width {
        instructions.push(Instruction::Nop);
    }
    block.instructions = instructions;
    block.branch_end = BranchInstruction::AThrow;
    block.frame = Some(Frame {
        locals: vec![],
        stack: vec![VerificationType::object(BinaryName::THROWABLE.as_str())]
            .into_iter()
            .collect(),
    });
}

/// Turn block targets into jump offsets relative to the branch instruction
fn relative_branch(
    branch: &BranchInstruction<BlockId, BlockId, BlockId>,
    branch_offset: usize,
    block_offsets: &[Offset],
) -> Result<BranchInstruction<i16, i32, ()>, Error> {
    let overflowed = Cell::new(false);
    let relative = |target: &BlockId| -> isize {
        block_offsets[target.0].0 as isize - branch_offset as isize
    };
    let resolved = branch.map_labels(
        |target| {
            i16::try_from(relative(target)).unwrap_or_else(|_| {
                overflowed.set(true);
                0
            })
        },
        |target| {
            i32::try_from(relative(target)).unwrap_or_else(|_| {
                overflowed.set(true);
                0
            })
        },
        |_| (),
    );
    if overflowed.get() {
        Err(Error::MethodCodeOverflow(Offset(branch_offset)))
    } else {
        Ok(resolved)
    }
}

/// Frames at the start of every block needing one, in layout order
///
/// A block needs a frame if it is the target of a jump or a switch, an exception handler, if it
/// follows a block which does not fall through, or if it is dead code. Empty blocks share their
/// offset with the next non-empty block, which gets the frame instead. Nothing is emitted at the
/// very end of the code.
fn computed_frames<'a>(
    block_order: &[BlockId],
    blocks: &'a [Block],
    handlers: &[Handler<BlockId>],
    dead_blocks: &HashSet<BlockId>,
    block_offsets: &[Offset],
) -> Vec<(Offset, &'a BlockFrame)> {
    let mut needs_frame: HashSet<BlockId> = dead_blocks.clone();
    needs_frame.extend(handlers.iter().map(|handler| handler.handler));
    for block_id in block_order {
        let targets = blocks[block_id.0].branch_end.jump_targets();
        needs_frame.extend(targets.targets().iter().copied());
    }

    let mut frames = vec![];
    let mut frame_here = false;
    for block_id in block_order {
        frame_here |= needs_frame.contains(block_id);
        let block = &blocks[block_id.0];
        if block.width() == 0 {
            continue;
        }
        if frame_here {
            if let Some(frame) = &block.frame {
                frames.push((block_offsets[block_id.0], frame));
            }
        }
        frame_here = block.branch_end.fallthrough_target().is_none();
    }
    frames
}

/// Frames supplied by the caller, in layout order (one per offset)
fn supplied_frames<'a>(
    block_order: &[BlockId],
    blocks: &'a [Block],
    block_offsets: &[Offset],
) -> Vec<(Offset, &'a BlockFrame)> {
    let mut frames = vec![];
    let mut pending: Option<&'a BlockFrame> = None;
    for block_id in block_order {
        let block = &blocks[block_id.0];
        let frame = block.frame.as_ref().or(pending);
        if block.width() == 0 {
            pending = frame;
            continue;
        }
        pending = None;
        if let Some(frame) = frame {
            frames.push((block_offsets[block_id.0], frame));
        }
    }
    frames
}

/// Encode frames relative to each other, starting from the implicit frame of the method
fn stack_map_table(
    frames: &[(Offset, &BlockFrame)],
    method: &MethodContext,
    block_offsets: &[Offset],
    symbols: &mut SymbolTable,
) -> Result<StackMapTable, Error> {
    let mut serializable = Vec::with_capacity(frames.len());
    for (offset, frame) in frames {
        serializable.push((*offset, frame.to_serializable(symbols, block_offsets)?));
    }

    // Resolved last, so that it never adds constants only the implicit frame would refer to
    let mut previous_frame = entry_frame(method).to_existing_serializable(symbols, block_offsets)?;
    let mut previous_offset: Option<Offset> = None;

    let mut stack_map_frames = Vec::with_capacity(serializable.len());
    for (offset, frame) in serializable {
        let offset_delta = match previous_offset {
            None => offset.0,
            Some(previous) => offset.0 - previous.0 - 1,
        };
        let offset_delta =
            u16::try_from(offset_delta).map_err(|_| Error::MethodCodeOverflow(offset))?;
        stack_map_frames.push(frame.stack_map_frame(offset_delta, &previous_frame));
        previous_frame = frame;
        previous_offset = Some(offset);
    }

    Ok(StackMapTable(stack_map_frames))
}

/// Exception table in the final layout, with dead blocks cut out of the protected ranges
fn exception_table(
    handlers: &[Handler<BlockId>],
    block_order: &[BlockId],
    blocks: &[Block],
    dead_blocks: &HashSet<BlockId>,
    block_offsets: &[Offset],
) -> Result<Vec<ExceptionHandler>, Error> {
    let bytecode_index = |offset: usize| -> Result<BytecodeIndex, Error> {
        u16::try_from(offset)
            .map(BytecodeIndex)
            .map_err(|_| Error::MethodCodeOverflow(Offset(offset)))
    };

    let mut exception_table = vec![];
    for handler in handlers {
        let start = block_offsets[handler.start.0].0;
        let end = block_offsets[handler.end.0].0;
        let handler_pc = bytecode_index(block_offsets[handler.handler.0].0)?;
        let catch_type = handler
            .catch_type
            .unwrap_or(ClassConstantIndex(ConstantIndex(0)));

        // Live sub-ranges of `[start, end)`
        let mut ranges: Vec<(usize, usize)> = vec![];
        let mut current: Option<(usize, usize)> = None;
        for block_id in block_order {
            let block_start = block_offsets[block_id.0].0;
            let block_end = block_start + blocks[block_id.0].width();
            if block_start < start || block_end > end || block_start == block_end {
                continue;
            }
            if dead_blocks.contains(block_id) {
                ranges.extend(current.take());
            } else {
                current = match current {
                    Some((range_start, range_end)) if range_end == block_start => {
                        Some((range_start, block_end))
                    }
                    other => {
                        ranges.extend(other);
                        Some((block_start, block_end))
                    }
                };
            }
        }
        ranges.extend(current);

        for (range_start, range_end) in ranges {
            exception_table.push(ExceptionHandler {
                start_pc: bytecode_index(range_start)?,
                end_pc: bytecode_index(range_end)?,
                handler_pc,
                catch_type,
            });
        }
    }
    Ok(exception_table)
}
