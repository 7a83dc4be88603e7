//! Stack map frame inference
//!
//! Frames are computed with a standard worklist algorithm over the basic blocks of a method: the
//! frame at the start of a block is propagated through the instructions of the block, then merged
//! into the frames of the successors. A block whose input frame changes is visited again. Since
//! merging only ever generalizes types, this converges.

use super::{BlockFrame, Frame, VerificationType};
use crate::jvm::class_file::{Constant, SymbolTable};
use crate::jvm::class_graph::CommonSuperclass;
use crate::jvm::code::{
    field_type, method_descriptor, BlockId, BranchInstruction, ControlFlowGraph, Instruction,
    InvokeType, MethodContext,
};
use crate::jvm::{BinaryName, Error, FieldType, Name, RefType, UnqualifiedName};
use crate::util::{OffsetVec, Width};
use std::collections::BTreeSet;
use std::fmt::Debug;

type VType = VerificationType<String, BlockId>;

/// Frame at the entry of a method, as implied by its descriptor
///
/// The locals are exactly the parameter slots (including the receiver, if any).
pub fn entry_frame(method: &MethodContext) -> BlockFrame {
    let mut locals: Vec<VType> = vec![];
    if !method.is_static {
        if method.name == UnqualifiedName::INIT.as_str()
            && method.this_class != BinaryName::OBJECT.as_str()
        {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(method.this_class.clone()));
        }
    }
    for parameter in &method.descriptor.parameters {
        let vtype = VerificationType::from_field_type(parameter);
        let width = vtype.width();
        locals.push(vtype);
        if width == 2 {
            locals.push(VerificationType::Top);
        }
    }
    Frame {
        locals,
        stack: OffsetVec::new(),
    }
}

/// Infer the frame at the start of every reachable block
///
/// Unreachable blocks get `None`. Every frame has exactly `max_locals` local slots.
pub fn infer_frames(
    cfg: &ControlFlowGraph,
    method: &MethodContext,
    max_locals: usize,
    symbols: &SymbolTable,
    supers: &mut CommonSuperclass,
) -> Result<Vec<Option<BlockFrame>>, Error> {
    let mut entry = entry_frame(method);
    if entry.locals.len() > max_locals {
        return Err(Error::InvalidLocal(entry.locals.len() - 1));
    }
    entry.resize_locals(max_locals);

    let mut inference = FrameInference {
        cfg,
        method,
        symbols,
        supers,
        frames: vec![None; cfg.blocks.len()],
        worklist: BTreeSet::new(),
    };
    inference.merge_into(BlockId::START, entry)?;
    inference.run()?;
    Ok(inference.frames)
}

/// Frame on the fallthrough edge out of `block_id`, replayed from the closest frame before it
///
/// Only frames already attached to the blocks of `cfg` are used, starting from the entry frame
/// when there are none. The blocks from that frame up to `block_id` are assumed to fall through
/// into each other, as they do when frames were supplied at every required position.
pub fn replay_fallthrough_frame(
    cfg: &ControlFlowGraph,
    method: &MethodContext,
    max_locals: usize,
    symbols: &SymbolTable,
    block_id: BlockId,
) -> Result<BlockFrame, Error> {
    let (start, mut frame) = (0..=block_id.0)
        .rev()
        .find_map(|idx| cfg.blocks[idx].frame.clone().map(|frame| (idx, frame)))
        .unwrap_or_else(|| (0, entry_frame(method)));
    frame.resize_locals(max_locals.max(frame.locals.len()));

    for idx in start..=block_id.0 {
        let block = &cfg.blocks[idx];
        for insn in block.instructions.iter() {
            interpret_instruction(&mut frame, insn, BlockId(idx), cfg, method, symbols)?;
        }
        interpret_branch_instruction(&mut frame, &block.branch_end)?;
    }
    log::trace!("Replayed frame after {:?}: {:?}", block_id, frame);
    Ok(frame)
}

struct FrameInference<'a, 'h> {
    cfg: &'a ControlFlowGraph,
    method: &'a MethodContext,
    symbols: &'a SymbolTable,
    supers: &'a mut CommonSuperclass<'h>,

    /// Current input frame of each block
    frames: Vec<Option<BlockFrame>>,

    /// Blocks whose input frame changed since they were last visited
    worklist: BTreeSet<BlockId>,
}

impl<'a, 'h> FrameInference<'a, 'h> {
    fn run(&mut self) -> Result<(), Error> {
        while let Some(block_id) = self.worklist.iter().next().copied() {
            self.worklist.remove(&block_id);
            let mut frame = match &self.frames[block_id.0] {
                Some(frame) => frame.clone(),
                None => continue,
            };
            log::trace!("Visiting {:?} with frame {:?}", block_id, frame);

            let cfg = self.cfg;
            let block = &cfg.blocks[block_id.0];
            for insn in block.instructions.iter() {
                self.merge_into_handlers(block_id, &frame)?;
                interpret_instruction(
                    &mut frame,
                    insn,
                    block_id,
                    cfg,
                    self.method,
                    self.symbols,
                )?;
            }
            self.merge_into_handlers(block_id, &frame)?;

            interpret_branch_instruction(&mut frame, &block.branch_end)?;
            for successor in cfg.successors(block_id) {
                self.merge_into(successor, frame.clone())?;
            }
        }
        Ok(())
    }

    /// Propagate the current locals to the handlers covering a block
    fn merge_into_handlers(&mut self, block_id: BlockId, frame: &BlockFrame) -> Result<(), Error> {
        let cfg = self.cfg;
        for handler in cfg.handlers_covering(block_id) {
            let caught = match handler.catch_type {
                Some(catch_type) => String::from(self.symbols.class_name(catch_type)?),
                None => String::from(BinaryName::THROWABLE.as_str()),
            };
            let handler_frame = Frame {
                locals: frame.locals.clone(),
                stack: vec![VerificationType::Object(caught)].into_iter().collect(),
            };
            self.merge_into(handler.handler, handler_frame)?;
        }
        Ok(())
    }

    /// Merge an incoming frame into the input frame of a block, queueing the block on changes
    fn merge_into(&mut self, target: BlockId, incoming: BlockFrame) -> Result<(), Error> {
        let merged = match &self.frames[target.0] {
            None => incoming,
            Some(existing) => {
                let merged = merge_frames(self.supers, target, existing, &incoming)?;
                if &merged == existing {
                    return Ok(());
                }
                merged
            }
        };
        self.frames[target.0] = Some(merged);
        self.worklist.insert(target);
        Ok(())
    }
}

fn merge_frames(
    supers: &mut CommonSuperclass,
    target: BlockId,
    existing: &BlockFrame,
    incoming: &BlockFrame,
) -> Result<BlockFrame, Error> {
    let heights_error = || Error::IncompatibleStackHeights {
        block: target.0,
        expected: existing.stack.offset_len().0,
        found: incoming.stack.offset_len().0,
    };
    if existing.stack.len() != incoming.stack.len() {
        return Err(heights_error());
    }

    let mut stack = OffsetVec::new();
    for (type1, type2) in existing.stack.iter().zip(incoming.stack.iter()) {
        if type1.width() != type2.width() {
            return Err(heights_error());
        }
        stack.push(merge_types(supers, type1, type2)?);
    }

    let locals_len = existing.locals.len().max(incoming.locals.len());
    let mut locals = Vec::with_capacity(locals_len);
    for idx in 0..locals_len {
        match (existing.locals.get(idx), incoming.locals.get(idx)) {
            (Some(type1), Some(type2)) => locals.push(merge_types(supers, type1, type2)?),
            _ => locals.push(VerificationType::Top),
        }
    }

    Ok(Frame { locals, stack })
}

/// Least upper bound of two verification types
fn merge_types(
    supers: &mut CommonSuperclass,
    type1: &VType,
    type2: &VType,
) -> Result<VType, Error> {
    use VerificationType::*;

    Ok(match (type1, type2) {
        _ if type1 == type2 => type1.clone(),
        (Null, Object(_)) => type2.clone(),
        (Object(_), Null) => type1.clone(),
        (Object(class1), Object(class2)) => Object(merge_reference_types(supers, class1, class2)?),
        _ => Top,
    })
}

/// Least upper bound of two reference types (classes or array descriptors)
fn merge_reference_types(
    supers: &mut CommonSuperclass,
    type1: &str,
    type2: &str,
) -> Result<String, Error> {
    if !type1.starts_with('[') && !type2.starts_with('[') {
        return supers.common_super_class(type1, type2);
    }

    let (dimensions1, element1) = split_array(type1);
    let (dimensions2, element2) = split_array(type2);
    if dimensions1 == dimensions2 {
        if let (Some(class1), Some(class2)) = (object_element(element1), object_element(element2))
        {
            let common = supers.common_super_class(class1, class2)?;
            return Ok(format!("{}L{};", "[".repeat(dimensions1), common));
        }
    }

    // Arrays of primitives are only assignable to arrays of `Object` with fewer dimensions
    let object_dimensions = |dimensions: usize, element: &str| {
        if dimensions > 0 && object_element(element).is_none() {
            dimensions - 1
        } else {
            dimensions
        }
    };
    let dimensions = object_dimensions(dimensions1, element1)
        .min(object_dimensions(dimensions2, element2));
    if dimensions > 0 {
        Ok(format!("{}Ljava/lang/Object;", "[".repeat(dimensions)))
    } else {
        Ok(String::from(BinaryName::OBJECT.as_str()))
    }
}

/// Split a type name into the number of array dimensions and the element type
fn split_array(name: &str) -> (usize, &str) {
    let element = name.trim_start_matches('[');
    (name.len() - element.len(), element)
}

/// Class name of an object element type descriptor
fn object_element(element: &str) -> Option<&str> {
    element.strip_prefix('L')?.strip_suffix(';')
}

/// Update the frame to reflect the effects of the given (non-branching) instruction
///
///   * `block_id` - the site used for uninitialized values produced by `new`
///   * `cfg` - used to find the class of uninitialized values when they get initialized
///
fn interpret_instruction(
    frame: &mut BlockFrame,
    insn: &Instruction,
    block_id: BlockId,
    cfg: &ControlFlowGraph,
    method: &MethodContext,
    symbols: &SymbolTable,
) -> Result<(), Error> {
    use Instruction::*;
    use VerificationType::*;

    let Frame { stack, locals } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(constant) | Ldc2(constant) => {
            let vtype = match symbols.get(*constant)? {
                Constant::Integer(_) => Integer,
                Constant::Float(_) => Float,
                Constant::Long(_) => Long,
                Constant::Double(_) => Double,
                Constant::String(_) => VType::object(BinaryName::STRING.as_str()),
                Constant::Class(_) => VType::object(BinaryName::CLASS.as_str()),
                Constant::MethodType(_) => VType::object(BinaryName::METHODTYPE.as_str()),
                Constant::MethodHandle { .. } => VType::object(BinaryName::METHODHANDLE.as_str()),
                Constant::Dynamic { .. } => {
                    let (_, descriptor) = symbols.dynamic_name_and_type(*constant)?;
                    VType::from_field_type(&field_type(descriptor)?)
                }
                _ => {
                    return Err(Error::UnexpectedConstant {
                        index: constant.0,
                        expected: "loadable constant",
                    })
                }
            };
            stack.push(vtype);
        }

        ILoad(_) => {

            stack.push(Integer);

        }
        LLoad(_) => {
            stack.push(Long);
        }
        FLoad(_) => {
            stack.push(Float);
        }
        DLoad(_) => {
            stack.push(Double);
        }
        ALoad(idx) => {
            let vtype = get_local(locals, *idx)?;
            stack.push(vtype);
        }

        IALoad | BALoad | CALoad | SALoad => {
            pop_many(stack, 2, insn)?;
            stack.push(Integer);
        }
        LALoad => {
            pop_many(stack, 2, insn)?;
            stack.push(Long);
        }
        FALoad => {
            pop_many(stack, 2, insn)?;
            stack.push(Float);
        }
        DALoad => {
            pop_many(stack, 2, insn)?;
            stack.push(Double);
        }
        AALoad => {
            pop(stack, insn)?;
            let array_type = pop(stack, insn)?;
            let element_type = match array_type {
                Null => Null,
                other => other
                    .array_element()
                    .unwrap_or_else(|| VType::object(BinaryName::OBJECT.as_str())),
            };
            stack.push(element_type);
        }

        IStore(idx) | FStore(idx) | AStore(idx) | LStore(idx) | DStore(idx) => {
            let vtype = pop(stack, insn)?;
            set_local(locals, *idx, vtype)?;
        }

        IAStore | FAStore | AAStore | BAStore | CAStore | SAStore | LAStore | DAStore => {
            pop_many(stack, 3, insn)?;
        }

        Pop => {
            pop_expecting_width(stack, 1, insn)?;
        }
        Pop2 => {
            let arg1 = pop(stack, insn)?;
            if arg1.width() == 1 {
                pop_expecting_width(stack, 1, insn)?;
            }
        }
        Dup => {
            let arg1 = pop_expecting_width(stack, 1, insn)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }
        DupX1 => {
            let arg1 = pop_expecting_width(stack, 1, insn)?;
            let arg2 = pop_expecting_width(stack, 1, insn)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }
        DupX2 => {
            let arg1 = pop_expecting_width(stack, 1, insn)?;
            let arg2 = pop(stack, insn)?;
            if arg2.width() == 1 {
                // Form 1
                let arg3 = pop_expecting_width(stack, 1, insn)?;
                stack.push(arg1.clone());
                stack.push(arg3);
            } else {
                // Form 2
                stack.push(arg1.clone());
            }
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2 => {
            let arg1 = pop(stack, insn)?;
            if arg1.width() == 1 {
                // Form 1
                let arg2 = pop_expecting_width(stack, 1, insn)?;
                stack.push(arg2.clone());
                stack.push(arg1.clone());
                stack.push(arg2);
                stack.push(arg1);
            } else {
                // Form 2
                stack.push(arg1.clone());
                stack.push(arg1);
            }
        }
        Dup2X1 => {
            let arg1 = pop(stack, insn)?;
            let arg2 = pop_expecting_width(stack, 1, insn)?;
            if arg1.width() == 1 {
                // Form 1
                let arg3 = pop_expecting_width(stack, 1, insn)?;
                stack.push(arg2.clone());
                stack.push(arg1.clone());
                stack.push(arg3);
                stack.push(arg2);
                stack.push(arg1);
            } else {
                // Form 2
                stack.push(arg1.clone());
                stack.push(arg2);
                stack.push(arg1);
            }
        }
        Dup2X2 => {
            let arg1 = pop(stack, insn)?;
            if arg1.width() == 1 {
                let arg2 = pop_expecting_width(stack, 1, insn)?;
                let arg3 = pop(stack, insn)?;
                if arg3.width() == 1 {
                    // Form 1
                    let arg4 = pop_expecting_width(stack, 1, insn)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg4);
                } else {
                    // Form 3
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                }
                stack.push(arg3);
                stack.push(arg2);
                stack.push(arg1);
            } else {
                let arg2 = pop(stack, insn)?;
                if arg2.width() == 1 {
                    // Form 2
                    let arg3 = pop_expecting_width(stack, 1, insn)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                } else {
                    // Form 4
                    stack.push(arg1.clone());
                }
                stack.push(arg2);
                stack.push(arg1);
            }
        }
        Swap => {
            let arg1 = pop_expecting_width(stack, 1, insn)?;
            let arg2 = pop_expecting_width(stack, 1, insn)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) | LCmp | FCmp(_)
        | DCmp(_) => {
            pop_many(stack, 2, insn)?;
            stack.push(Integer);
        }
        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor | LSh(_) => {
            pop_many(stack, 2, insn)?;
            stack.push(Long);
        }
        FAdd | FSub | FDiv | FMul | FRem => {
            pop_many(stack, 2, insn)?;
            stack.push(Float);
        }
        DAdd | DSub | DDiv | DMul | DRem => {
            pop_many(stack, 2, insn)?;
            stack.push(Double);
        }

        INeg | I2B | I2C | I2S | L2I | F2I | D2I => {
            pop(stack, insn)?;
            stack.push(Integer);
        }
        LNeg | I2L | F2L | D2L => {
            pop(stack, insn)?;
            stack.push(Long);
        }
        FNeg | I2F | L2F | D2F => {
            pop(stack, insn)?;
            stack.push(Float);
        }
        DNeg | I2D | L2D | F2D => {
            pop(stack, insn)?;
            stack.push(Double);
        }

        IInc(idx, _) => {
            get_local(locals, *idx)?;
        }

        GetStatic(field) => {
            let descriptor = symbols.member_ref(*field)?.descriptor;
            stack.push(VType::from_field_type(&field_type(descriptor)?));
        }
        PutStatic(_) => {
            pop(stack, insn)?;
        }
        GetField(field) => {
            pop(stack, insn)?;
            let descriptor = symbols.member_ref(*field)?.descriptor;
            stack.push(VType::from_field_type(&field_type(descriptor)?));
        }
        PutField(_) => {
            pop_many(stack, 2, insn)?;
        }

        Invoke(invoke_type, method_ref) => {
            let member = symbols.member_ref(*method_ref)?;
            let descriptor = method_descriptor(member.descriptor)?;
            pop_many(stack, descriptor.parameters.len(), insn)?;

            if !matches!(invoke_type, InvokeType::Static) {
                let receiver = pop(stack, insn)?;
                let is_init = member.name == UnqualifiedName::INIT.as_str();
                if let (InvokeType::Special, true) = (invoke_type, is_init) {
                    let initialized = match &receiver {
                        UninitializedThis => Some(method.this_class.clone()),
                        Uninitialized(site) => Some(uninitialized_class(cfg, symbols, *site)?),
                        _ => None,
                    };
                    if let Some(class) = initialized {
                        replace_all(locals, stack, &receiver, &Object(class));
                    }
                }
            }

            if let Some(return_type) = &descriptor.return_type {
                stack.push(VType::from_field_type(return_type));
            }
        }
        InvokeDynamic(call_site) => {
            let (_, descriptor) = symbols.dynamic_name_and_type(*call_site)?;
            let descriptor = method_descriptor(descriptor)?;
            pop_many(stack, descriptor.parameters.len(), insn)?;
            if let Some(return_type) = &descriptor.return_type {
                stack.push(VType::from_field_type(return_type));
            }
        }

        New(_) => {

            stack.push(Uninitialized(block_id));

        }
        NewArray(base_type) => {
            pop(stack, insn)?;
            let array_type = FieldType::array(FieldType::Base(*base_type));
            stack.push(VType::from_field_type(&array_type));
        }
        ANewArray(class) => {
            pop(stack, insn)?;
            let class_name = symbols.class_name(*class)?;
            let element_type = RefType::from_internal_name(class_name)?;
            let array_type = FieldType::array(FieldType::Ref(element_type));
            stack.push(VType::from_field_type(&array_type));
        }
        ArrayLength | InstanceOf(_) => {
            pop(stack, insn)?;
            stack.push(Integer);
        }
        CheckCast(class) => {
            pop(stack, insn)?;
            stack.push(VType::object(symbols.class_name(*class)?));
        }
        MonitorEnter | MonitorExit => {
            pop(stack, insn)?;
        }
        MultiANewArray(class, dimensions) => {
            pop_many(stack, *dimensions as usize, insn)?;
            stack.push(VType::object(symbols.class_name(*class)?));
        }
    }

    Ok(())
}

/// Update the frame to reflect the effects of the given branching instruction
///
/// Only the state passed on to successors matters, so instructions without successors are left
/// alone.
fn interpret_branch_instruction(
    frame: &mut BlockFrame,
    insn: &BranchInstruction<BlockId, BlockId, BlockId>,
) -> Result<(), Error> {
    use BranchInstruction::*;

    match insn {
        If(_, _, _) | IfNull(_, _, _) | TableSwitch { .. } | LookupSwitch { .. } => {
            pop(&mut frame.stack, insn)?;
        }
        IfICmp(_, _, _) | IfACmp(_, _, _) => {
            pop_many(&mut frame.stack, 2, insn)?;
        }
        Goto(_) | GotoW(_) | FallThrough(_) | End => (),
        Jsr(_, _) | JsrW(_, _) | Ret(_) => return Err(Error::SubroutineWithFrames),
        IReturn | LReturn | FReturn | DReturn | AReturn | Return | AThrow => (),
    }

    Ok(())
}

/// Class of the object created by the `new` at the start of the given block
fn uninitialized_class(
    cfg: &ControlFlowGraph,
    symbols: &SymbolTable,
    site: BlockId,
) -> Result<String, Error> {
    let first_insn = cfg
        .blocks
        .get(site.0)
        .and_then(|block| block.instructions.get(0));
    match first_insn {
        Some(Instruction::New(class)) => Ok(String::from(symbols.class_name(*class)?)),
        _ => Err(Error::MalformedClass(format!(
            "uninitialized value from {:?} is not created by `new`",
            site
        ))),
    }
}

fn replace_all(
    locals: &mut [VType],
    stack: &mut OffsetVec<VType>,
    original: &VType,
    updated: &VType,
) {
    for local in locals.iter_mut() {
        if local == original {
            *local = updated.clone();
        }
    }
    stack.for_each_mut(|vtype| {
        if vtype == original {
            *vtype = updated.clone();
        }
    });
}

fn get_local(locals: &[VType], idx: u16) -> Result<VType, Error> {
    locals
        .get(idx as usize)
        .cloned()
        .ok_or(Error::InvalidLocal(idx as usize))
}

/// Store into a local, clobbering any two-slot value that overlaps the slots written
fn set_local(locals: &mut [VType], idx: u16, vtype: VType) -> Result<(), Error> {
    let idx = idx as usize;
    let width = vtype.width();
    if idx + width > locals.len() {
        return Err(Error::InvalidLocal(idx));
    }
    if idx > 0 && locals[idx - 1].width() == 2 {
        locals[idx - 1] = VerificationType::Top;
    }
    locals[idx] = vtype;
    if width == 2 {
        locals[idx + 1] = VerificationType::Top;
    }
    Ok(())
}

fn pop(stack: &mut OffsetVec<VType>, insn: &impl Debug) -> Result<VType, Error> {
    stack
        .pop()
        .ok_or_else(|| Error::StackUnderflow(format!("{:?}", insn)))
}

fn pop_many(stack: &mut OffsetVec<VType>, count: usize, insn: &impl Debug) -> Result<(), Error> {
    for _ in 0..count {
        pop(stack, insn)?;
    }
    Ok(())
}

fn pop_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
    insn: &impl Debug,
) -> Result<VType, Error> {
    let vtype = pop(stack, insn)?;
    if vtype.width() == expected_width {
        Ok(vtype)
    } else {
        Err(Error::StackUnderflow(format!("{:?}", insn)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraph;
    use crate::jvm::code::{CodeItem, EqComparison, Label, OrdComparison};
    use VerificationType::*;

    fn method(name: &str, descriptor: &str, is_static: bool) -> MethodContext {
        MethodContext {
            this_class: String::from("me/Test"),
            name: String::from(name),
            descriptor: method_descriptor(descriptor).unwrap(),
            is_static,
        }
    }

    fn infer(
        items: &[CodeItem],
        handlers: &[crate::jvm::code::Handler<Label>],
        method: &MethodContext,
        max_locals: usize,
        symbols: &SymbolTable,
    ) -> Result<Vec<Option<BlockFrame>>, Error> {
        let graph = ClassGraph::with_java_classes();
        let mut supers = CommonSuperclass::new(&graph);
        let cfg = ControlFlowGraph::build(items, handlers, false)?;
        infer_frames(&cfg, method, max_locals, symbols, &mut supers)
    }

    #[test]
    fn entry_frames() {
        let frame = entry_frame(&method("run", "(JZ)V", false));
        assert_eq!(frame.locals, vec![VType::object("me/Test"), Long, Top, Integer]);

        let frame = entry_frame(&method("<init>", "()V", false));
        assert_eq!(frame.locals, vec![UninitializedThis]);

        let mut object_init = method("<init>", "()V", false);
        object_init.this_class = String::from("java/lang/Object");
        assert_eq!(
            entry_frame(&object_init).locals,
            vec![VType::object("java/lang/Object")]
        );

        let frame = entry_frame(&method("run", "([I)V", true));
        assert_eq!(frame.locals, vec![VType::object("[I")]);
    }

    #[test]
    fn joins_merge_to_common_superclass() {
        let mut symbols = SymbolTable::new();
        let integer = symbols.add_field_ref("me/Test", "a", "Ljava/lang/Integer;");
        let long = symbols.add_field_ref("me/Test", "b", "Ljava/lang/Long;");
        let (other, join) = (Label(0), Label(1));
        let frames = infer(
            &[
                CodeItem::Instruction(Instruction::ILoad(0)),
                CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, other, ())),
                CodeItem::Instruction(Instruction::GetStatic(integer)),
                CodeItem::Branch(BranchInstruction::Goto(join)),
                CodeItem::Label(other),
                CodeItem::Instruction(Instruction::GetStatic(long)),
                CodeItem::Label(join),
                CodeItem::Branch(BranchInstruction::AReturn),
            ],
            &[],
            &method("pick", "(Z)Ljava/lang/Number;", true),
            1,
            &symbols,
        )
        .unwrap();

        let joined = frames[3].as_ref().unwrap();
        assert_eq!(joined.locals, vec![Integer]);
        assert_eq!(joined.stack_entries(), vec![VType::object("java/lang/Number")]);

        // Nothing flows into the final empty block
        assert_eq!(frames[4], None);
    }

    #[test]
    fn null_merges_into_references() {
        let mut symbols = SymbolTable::new();
        let string = symbols.add_field_ref("me/Test", "s", "Ljava/lang/String;");
        let (other, join) = (Label(0), Label(1));
        let frames = infer(
            &[
                CodeItem::Instruction(Instruction::ALoad(0)),
                CodeItem::Branch(BranchInstruction::IfNull(EqComparison::EQ, other, ())),
                CodeItem::Instruction(Instruction::AConstNull),
                CodeItem::Branch(BranchInstruction::Goto(join)),
                CodeItem::Label(other),
                CodeItem::Instruction(Instruction::GetStatic(string)),
                CodeItem::Label(join),
                CodeItem::Instruction(Instruction::AStore(1)),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            &[],
            &method("run", "(Ljava/lang/Object;)V", true),
            2,
            &symbols,
        )
        .unwrap();

        let joined = frames[3].as_ref().unwrap();
        assert_eq!(joined.stack_entries(), vec![VType::object("java/lang/String")]);
    }

    #[test]
    fn handlers_see_locals_before_each_instruction() {
        let mut symbols = SymbolTable::new();
        let exception = symbols.add_class("java/lang/Exception");
        let (start, end, handler) = (Label(0), Label(1), Label(2));
        let frames = infer(
            &[
                CodeItem::Label(start),
                CodeItem::Instruction(Instruction::IConst1),
                CodeItem::Instruction(Instruction::IStore(0)),
                CodeItem::Label(end),
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Label(handler),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            &[crate::jvm::code::Handler {
                start,
                end,
                handler,
                catch_type: Some(exception),
            }],
            &method("run", "()V", true),
            1,
            &symbols,
        )
        .unwrap();

        let handler_frame = frames[2].as_ref().unwrap();
        assert_eq!(handler_frame.locals, vec![Top]);
        assert_eq!(
            handler_frame.stack_entries(),
            vec![VType::object("java/lang/Exception")]
        );

        // Normal flow does see the store
        assert_eq!(frames[1].as_ref().unwrap().locals, vec![Integer]);
    }

    #[test]
    fn constructors_initialize_placeholders() {
        let mut symbols = SymbolTable::new();
        let foo = symbols.add_class("me/Foo");
        let foo_init = symbols.add_method_ref("me/Foo", "<init>", "()V", false);
        let object_init = symbols.add_method_ref("java/lang/Object", "<init>", "()V", false);
        let next = Label(0);
        let frames = infer(
            &[
                CodeItem::Instruction(Instruction::ALoad(0)),
                CodeItem::Instruction(Instruction::Invoke(InvokeType::Special, object_init)),
                CodeItem::Instruction(Instruction::New(foo)),
                CodeItem::Instruction(Instruction::Dup),
                CodeItem::Instruction(Instruction::Invoke(InvokeType::Special, foo_init)),
                CodeItem::Instruction(Instruction::AStore(1)),
                CodeItem::Branch(BranchInstruction::Goto(next)),
                CodeItem::Label(next),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            &[],
            &method("<init>", "()V", false),
            2,
            &symbols,
        )
        .unwrap();

        assert_eq!(frames[0].as_ref().unwrap().locals, vec![UninitializedThis, Top]);
        assert_eq!(
            frames[2].as_ref().unwrap().locals,
            vec![VType::object("me/Test"), VType::object("me/Foo")]
        );
    }

    #[test]
    fn category_two_stack_shuffles() {
        let symbols = SymbolTable::new();
        let mut frame: BlockFrame = Frame {
            locals: vec![],
            stack: vec![Integer, Long].into_iter().collect(),
        };
        let cfg = ControlFlowGraph::build(&[], &[], false).unwrap();
        let context = method("run", "()V", true);
        let run = |insn: Instruction, frame: &mut BlockFrame| {
            interpret_instruction(frame, &insn, BlockId::START, &cfg, &context, &symbols)
        };

        run(Instruction::Dup2X1, &mut frame).unwrap();
        assert_eq!(frame.stack_entries(), vec![Long, Integer, Long]);

        run(Instruction::Pop2, &mut frame).unwrap();
        run(Instruction::Pop, &mut frame).unwrap();
        run(Instruction::IConst0, &mut frame).unwrap();
        run(Instruction::DupX2, &mut frame).unwrap();
        assert_eq!(frame.stack_entries(), vec![Integer, Long, Integer]);

        assert!(matches!(
            run(Instruction::Swap, &mut frame),
            Err(Error::StackUnderflow(_))
        ));
    }

    #[test]
    fn mismatched_stack_heights() {
        let join = Label(0);
        let result = infer(
            &[
                CodeItem::Instruction(Instruction::ILoad(0)),
                CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, join, ())),
                CodeItem::Instruction(Instruction::IConst0),
                CodeItem::Label(join),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            &[],
            &method("run", "(I)V", true),
            1,
            &SymbolTable::new(),
        );
        assert!(matches!(
            result,
            Err(Error::IncompatibleStackHeights { block: 2, .. })
        ));
    }
}
