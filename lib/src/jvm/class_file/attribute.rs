use crate::jvm::class_file::{ClassConstantIndex, ConstantIndex, Utf8ConstantIndex};
use crate::jvm::verifier::VerificationType;
use crate::jvm::Serialize;
use byteorder::WriteBytesExt;
use std::io::ErrorKind;

/// Attribute in its encoded form: a name and an opaque payload
///
/// Typed attributes (see `AttributeLike`) are serialized into this form before being attached
/// to a class, member, or `Code` attribute. Attributes read from an existing class that are not
/// interpreted stay in this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        write_length_prefixed(writer, &self.info)
    }
}

/// Attribute with a known structure, whose serialized form is the payload of an `Attribute`
pub trait AttributeLike: Serialize {
    const NAME: &'static str;
}

/// Write a `u4` length followed by the bytes
fn write_length_prefixed<W: WriteBytesExt>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidData, "attribute too long"))?;
    len.serialize(writer)?;
    writer.write_all(bytes)
}

/// Initial value of a `static final` field
pub struct ConstantValueAttribute(pub ConstantIndex);

impl Serialize for ConstantValueAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for ConstantValueAttribute {
    const NAME: &'static str = "ConstantValue";
}

/// Body of a method: its bytecode, limits, and exception handlers
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Entry in the exception table of a `Code` attribute
///
/// Exceptions thrown in `start_pc..end_pc` that are instances of `catch_type` jump to
/// `handler_pc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: BytecodeIndex,
    pub end_pc: BytecodeIndex,
    pub handler_pc: BytecodeIndex,

    /// Index 0 catches everything
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)
    }
}

/// Encoded instructions of a method
#[derive(Debug)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        write_length_prefixed(writer, &self.0)
    }
}

/// Offset into a `BytecodeArray`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Frames at the start of basic blocks, each relative to the one before it
#[derive(Debug)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Verification type as it appears in the class file
pub type SerializableVerificationType = VerificationType<ClassConstantIndex, u16>;

/// One entry of a `StackMapTable`
///
/// Each variant is a family of encodings. Which tag gets used within the family depends on the
/// size of `offset_delta` (and, for chop and append frames, on the number of locals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Same locals as the previous frame and an empty stack (`same_frame`, or
    /// `same_frame_extended` past a delta of 63)
    SameLocalsNoStack { offset_delta: u16 },

    /// Same locals as the previous frame and one stack entry
    SameLocalsOneStack {
        offset_delta: u16,
        stack: SerializableVerificationType,
    },

    /// Previous locals minus the last `chopped_k` (1 to 3) entries and an empty stack
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Previous locals plus 1 to 3 new entries and an empty stack
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<SerializableVerificationType>,
    },

    /// Locals and stack spelled out in full
    Full {
        offset_delta: u16,
        locals: Vec<SerializableVerificationType>,
        stack: Vec<SerializableVerificationType>,
    },
}

impl StackMapFrame {
    /// Leading `frame_type` byte and whether `offset_delta` follows it explicitly
    fn frame_type(&self) -> std::io::Result<(u8, bool)> {
        let invalid = |msg: String| std::io::Error::new(ErrorKind::InvalidData, msg);
        Ok(match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } if *offset_delta < 64 => {
                (*offset_delta as u8, false)
            }
            StackMapFrame::SameLocalsNoStack { .. } => (251, true),
            StackMapFrame::SameLocalsOneStack { offset_delta, .. } if *offset_delta < 64 => {
                (64 + *offset_delta as u8, false)
            }
            StackMapFrame::SameLocalsOneStack { .. } => (247, true),
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => match chopped_k {
                1..=3 => (251 - chopped_k, true),
                _ => return Err(invalid(format!("cannot chop {} locals", chopped_k))),
            },
            StackMapFrame::AppendLocalsNoStack { locals, .. } => match locals.len() {
                added @ 1..=3 => (251 + added as u8, true),
                added => return Err(invalid(format!("cannot append {} locals", added))),
            },
            StackMapFrame::Full { .. } => (255, true),
        })
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let (frame_type, explicit_delta) = self.frame_type()?;
        frame_type.serialize(writer)?;
        let offset_delta = match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        };
        if explicit_delta {
            offset_delta.serialize(writer)?;
        }

        match self {
            StackMapFrame::SameLocalsNoStack { .. } | StackMapFrame::ChopLocalsNoStack { .. } => {}
            StackMapFrame::SameLocalsOneStack { stack, .. } => stack.serialize(writer)?,
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                for local in locals {
                    local.serialize(writer)?;
                }
            }
            StackMapFrame::Full { locals, stack, .. } => {
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// Bootstrap methods referenced by `invokedynamic` and dynamic constants
#[derive(Debug)]
pub struct BootstrapMethods<'a>(pub &'a [BootstrapMethod]);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// `MethodHandle` constant
    pub bootstrap_method: ConstantIndex,

    /// Loadable constants
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl<'a> AttributeLike for BootstrapMethods<'a> {
    const NAME: &'static str = "BootstrapMethods";
}

impl<'a> Serialize for BootstrapMethods<'a> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = u16::try_from(self.0.len())
            .map_err(|_| std::io::Error::new(ErrorKind::InvalidData, "too many bootstrap methods"))?;
        len.serialize(writer)?;
        for bootstrap_method in self.0 {
            bootstrap_method.serialize(writer)?;
        }
        Ok(())
    }
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compact_frame_tags() {
        let mut bytes = vec![];
        StackMapFrame::SameLocalsNoStack { offset_delta: 5 }
            .serialize(&mut bytes)
            .unwrap();
        StackMapFrame::SameLocalsNoStack { offset_delta: 64 }
            .serialize(&mut bytes)
            .unwrap();
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 1,
            stack: VerificationType::Integer,
        }
        .serialize(&mut bytes)
        .unwrap();
        StackMapFrame::ChopLocalsNoStack {
            offset_delta: 2,
            chopped_k: 2,
        }
        .serialize(&mut bytes)
        .unwrap();
        assert_eq!(bytes, vec![5, 251, 0, 64, 65, 1, 249, 0, 2]);
    }

    #[test]
    fn extended_frames() {
        let mut bytes = vec![];
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 300,
            stack: VerificationType::Object(ClassConstantIndex(ConstantIndex(7))),
        }
        .serialize(&mut bytes)
        .unwrap();
        StackMapFrame::AppendLocalsNoStack {
            offset_delta: 0,
            locals: vec![VerificationType::Long, VerificationType::Uninitialized(12)],
        }
        .serialize(&mut bytes)
        .unwrap();
        assert_eq!(
            bytes,
            vec![247, 1, 44, 7, 0, 7, 253, 0, 0, 4, 8, 0, 12]
        );
    }

    #[test]
    fn out_of_range_chop_is_rejected() {
        let frame = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 4,
        };
        assert!(frame.serialize(&mut vec![]).is_err());
    }

    #[test]
    fn attribute_length_prefix() {
        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(3)),
            info: vec![1, 2, 3],
        };
        let mut bytes = vec![];
        attribute.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 3, 0, 0, 0, 3, 1, 2, 3]);
    }
}
