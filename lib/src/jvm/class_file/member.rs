use crate::jvm::class_file::{Attribute, Utf8ConstantIndex};
use crate::jvm::{FieldAccessFlags, MethodAccessFlags, Serialize};
use byteorder::WriteBytesExt;

/// Field or method declared by a class or interface
///
/// Both share the same layout ([fields][0], [methods][1]) and differ only in which access flags
/// are allowed. A method body, if there is one, is its `Code` attribute.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.5
/// [1]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Member<Flags> {
    pub access_flags: Flags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

pub type Field = Member<FieldAccessFlags>;
pub type Method = Member<MethodAccessFlags>;

impl<Flags: Serialize> Serialize for Member<Flags> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}
