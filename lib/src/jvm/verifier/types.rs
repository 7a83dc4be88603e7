use crate::jvm::class_file::ClassConstantIndex;
use crate::jvm::{BaseType, FieldType, RefType, Serialize};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::Infallible;

/// Type of a local variable or stack slot, as tracked by the type-checking verifier
///
/// `Cls` is how classes are named and `U` is how the creation site of an uninitialized object
/// is identified. Both change between analysis and serialization.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot: never written, or the merge of incompatible types
    Top,

    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - while analyzing the method, `U` is the basic block that starts with the `new`
    ///     instruction (blocks are always split before `new`)
    ///   - when serializing into a classfile, we use `u16` for `U`, corresponding to the offset of
    ///     the `new` instruction from the start of the method body
    Uninitialized(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Convert the class and uninitialized site representations
    pub fn map<C2, U2>(
        &self,
        map_class: impl Fn(&Cls) -> C2,
        map_uninitialized: impl Fn(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        let mapped = self.try_map::<_, _, Infallible>(
            |class| Ok(map_class(class)),
            |site| Ok(map_uninitialized(site)),
        );
        match mapped {
            Ok(vtype) => vtype,
            Err(never) => match never {},
        }
    }

    /// Like [`Self::map`], stopping at the first error
    pub fn try_map<C2, U2, E>(
        &self,
        mut map_class: impl FnMut(&Cls) -> Result<C2, E>,
        mut map_uninitialized: impl FnMut(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        use VerificationType::*;

        Ok(match self {
            Top => Top,
            Integer => Integer,
            Float => Float,
            Long => Long,
            Double => Double,
            Null => Null,
            UninitializedThis => UninitializedThis,
            Object(class) => Object(map_class(class)?),
            Uninitialized(site) => Uninitialized(map_uninitialized(site)?),
        })
    }
}

impl<U> VerificationType<String, U> {
    /// Type of a value of the given field type (sub-`int` types are widened to `Integer`)
    pub fn from_field_type(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type.internal_name()),
        }
    }

    /// Object type for an internal name (or array descriptor)
    pub fn object(name: impl Into<String>) -> Self {
        VerificationType::Object(name.into())
    }

    /// Type of the elements loaded out of an array of this type by `aaload`
    ///
    /// `None` if this is not an array of references.
    pub fn array_element(&self) -> Option<Self> {
        match self {
            VerificationType::Object(name) => {
                let array = RefType::from_internal_name(name).ok()?;
                match array.element_type()? {
                    element @ FieldType::Ref(_) => Some(VerificationType::from_field_type(element)),
                    FieldType::Base(_) => None,
                }
            }
            _ => None,
        }
    }
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Tag byte of the `verification_type_info` encoding
    pub const fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(class) => class.serialize(writer),
            VerificationType::Uninitialized(offset) => offset.serialize(writer),
            _ => Ok(()),
        }
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::BinaryName;

    type VType = VerificationType<String, u16>;

    #[test]
    fn field_types() {
        assert_eq!(VType::from_field_type(&FieldType::boolean()), VType::Integer);
        assert_eq!(VType::from_field_type(&FieldType::long()), VType::Long);
        assert_eq!(
            VType::from_field_type(&FieldType::object(BinaryName::STRING)),
            VType::object("java/lang/String")
        );
        assert_eq!(
            VType::from_field_type(&FieldType::array(FieldType::int())),
            VType::object("[I")
        );
    }

    #[test]
    fn array_elements() {
        assert_eq!(
            VType::object("[Ljava/lang/String;").array_element(),
            Some(VType::object("java/lang/String"))
        );
        assert_eq!(
            VType::object("[[I").array_element(),
            Some(VType::object("[I"))
        );
        assert_eq!(VType::object("[I").array_element(), None);
        assert_eq!(VType::object("java/lang/Object").array_element(), None);
        assert_eq!(VType::Null.array_element(), None);
    }

    #[test]
    fn serialized_tags() {
        let mut out = vec![];
        VerificationType::<ClassConstantIndex, u16>::Top
            .serialize(&mut out)
            .unwrap();
        VerificationType::<ClassConstantIndex, u16>::Uninitialized(0x0102)
            .serialize(&mut out)
            .unwrap();
        assert_eq!(out, vec![0, 8, 1, 2]);
    }
}
