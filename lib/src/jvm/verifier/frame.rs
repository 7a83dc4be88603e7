use super::*;
use crate::jvm::class_file::{ClassConstantIndex, ConstantIndex, StackMapFrame, SymbolTable};
use crate::jvm::code::BlockId;
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use std::convert::TryFrom;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are stored one entry per slot: a `long` or `double` occupies its slot and the slot after
/// it holds `Top`. This makes stores that clobber half of a two-slot value easy to model. The
/// class file format lists locals by value instead, see [`Frame::local_entries`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame used while analyzing a method body
pub type BlockFrame = Frame<String, BlockId>;

/// Frame as written in a `StackMapTable`
pub type SerializableFrame = Frame<ClassConstantIndex, u16>;

impl<Cls: Clone + PartialEq, U: Clone + PartialEq> Frame<Cls, U> {
    /// Build a frame from locals listed by value (as in the class file format)
    pub fn from_entries(
        locals: impl IntoIterator<Item = VerificationType<Cls, U>>,
        stack: impl IntoIterator<Item = VerificationType<Cls, U>>,
    ) -> Self {
        let mut slots = vec![];
        for local in locals {
            let is_wide = local.width() == 2;
            slots.push(local);
            if is_wide {
                slots.push(VerificationType::Top);
            }
        }
        Frame {
            locals: slots,
            stack: stack.into_iter().collect(),
        }
    }

    /// Locals listed by value, with the implicit `Top` after two-slot values dropped and trailing
    /// `Top` locals trimmed
    pub fn local_entries(&self) -> Vec<VerificationType<Cls, U>> {
        let mut entries = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let local = &self.locals[slot];
            slot += local.width();
            entries.push(local.clone());
        }
        while let Some(VerificationType::Top) = entries.last() {
            entries.pop();
        }
        entries
    }

    /// Stack entries, bottom first
    pub fn stack_entries(&self) -> Vec<VerificationType<Cls, U>> {
        self.stack.iter().cloned().collect()
    }

    /// Pad (or cut) the locals to exactly `len` slots
    pub fn resize_locals(&mut self, len: usize) {
        self.locals.resize(len, VerificationType::Top);
    }
}

impl BlockFrame {
    /// Resolve the frame into its serializable form
    ///
    /// Class names get interned as `Class` constants and `Uninitialized` sites become the offset
    /// of the block starting with the `new` instruction.
    pub fn to_serializable(
        &self,
        symbols: &mut SymbolTable,
        block_offsets: &[Offset],
    ) -> Result<SerializableFrame, Error> {
        self.resolve(|cls| Ok(symbols.add_class(cls)), block_offsets)
    }

    /// Resolve the frame without adding constants
    ///
    /// Classes that are not already in the table resolve to index 0, which is never assigned and
    /// so compares unequal to every type in a frame from [`BlockFrame::to_serializable`].
    pub fn to_existing_serializable(
        &self,
        symbols: &SymbolTable,
        block_offsets: &[Offset],
    ) -> Result<SerializableFrame, Error> {
        self.resolve(
            |cls| {
                Ok(symbols
                    .find_class(cls)
                    .unwrap_or(ClassConstantIndex(ConstantIndex(0))))
            },
            block_offsets,
        )
    }

    fn resolve(
        &self,
        mut resolve_class: impl FnMut(&str) -> Result<ClassConstantIndex, Error>,
        block_offsets: &[Offset],
    ) -> Result<SerializableFrame, Error> {
        let mut resolve = |vtype: &VerificationType<String, BlockId>| {
            vtype.try_map(
                |cls| resolve_class(cls),
                |block| {
                    let offset = block_offsets
                        .get(block.0)
                        .copied()
                        .ok_or(Error::MalformedClass(format!("no offset for {:?}", block)))?;
                    u16::try_from(offset.0).map_err(|_| Error::MethodCodeOverflow(offset))
                },
            )
        };

        let mut locals = Vec::with_capacity(self.locals.len());
        for local in &self.locals {
            locals.push(resolve(local)?);
        }
        let mut stack = OffsetVec::new();
        for typ in self.stack.iter() {
            stack.push(resolve(typ)?);
        }
        Ok(Frame { locals, stack })
    }
}

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This picks the smallest encoding that can express the transition, and falls back to the
    /// `Full` option using [`Self::full_stack_map_frame`] only if none of the other stack map
    /// frame variants are enough.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_locals = self.local_entries();
        let prev_locals = previous_frame.local_entries();

        match self.stack.len() {
            0 => {
                let this_locals_len = this_locals.len();
                let prev_locals_len = prev_locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    if len_difference < 4 && prev_locals.starts_with(&this_locals) {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4
                    && this_locals.starts_with(&prev_locals)
                {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: this_locals[prev_locals_len..].to_vec(),
                    };
                }
            }
            1 if this_locals == prev_locals => {
                if let Some(stack) = self.stack.iter().next() {
                    return StackMapFrame::SameLocalsOneStack {
                        offset_delta,
                        stack: stack.clone(),
                    };
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack_entries(),
            locals: self.local_entries(),
        }
    }
}
