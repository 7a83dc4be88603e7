//! Field and method descriptors
//!
//! Descriptors are parsed from their string form with `parse` and written back out with
//! `Display`. Class names inside descriptors are always `BinaryName`s.

use super::{BinaryName, Error, Name};
use crate::util::Width;
use std::fmt;

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    const fn from_char(c: u8) -> Option<BaseType> {
        Some(match c {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    const fn as_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Reference type: either a class or an array
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    Array(Box<FieldType>),
}

impl RefType {
    /// Parse a reference type descriptor (`Ljava/lang/String;` or `[I`)
    pub fn parse(descriptor: &str) -> Result<RefType, Error> {
        match FieldType::parse(descriptor)? {
            FieldType::Ref(ref_type) => Ok(ref_type),
            FieldType::Base(_) => Err(Error::InvalidDescriptor(String::from(descriptor))),
        }
    }

    /// Parse the name used in a `Class` constant
    ///
    /// Classes are named by their internal name (`java/lang/String`) while arrays are named by
    /// their descriptor (`[Ljava/lang/String;`).
    pub fn from_internal_name(name: &str) -> Result<RefType, Error> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_string(String::from(name))
                .map(RefType::Object)
                .map_err(Error::InvalidName)
        }
    }

    /// Inverse of `from_internal_name`
    pub fn internal_name(&self) -> String {
        match self {
            RefType::Object(class) => String::from(class.as_str()),
            RefType::Array(_) => self.to_string(),
        }
    }

    /// Type of the elements of an array type (`None` if this is not an array)
    pub fn element_type(&self) -> Option<&FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::Array(element) => Some(&**element),
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefType::Object(class) => write!(f, "L{};", class.as_str()),
            RefType::Array(element) => write!(f, "[{}", element),
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl FieldType {
    pub fn parse(descriptor: &str) -> Result<FieldType, Error> {
        let mut cursor = Cursor::new(descriptor);
        let field_type = cursor.field_type()?;
        cursor.finish()?;
        Ok(field_type)
    }

    pub fn array(element: FieldType) -> FieldType {
        FieldType::Ref(RefType::Array(Box::new(element)))
    }

    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base_type) => fmt::Display::fmt(base_type, f),
            FieldType::Ref(ref_type) => fmt::Display::fmt(ref_type, f),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, Error> {
        let mut cursor = Cursor::new(descriptor);
        cursor.expect(b'(')?;
        let mut parameters = vec![];
        while cursor.peek() != Some(b')') {
            parameters.push(cursor.field_type()?);
        }
        cursor.expect(b')')?;
        let return_type = if cursor.peek() == Some(b'V') {
            cursor.position += 1;
            None
        } else {
            Some(cursor.field_type()?)
        };
        cursor.finish()?;
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Number of local variable slots taken by the arguments, including the receiver when
    /// `has_this_param` is set
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let receiver = usize::from(has_this_param);
        receiver + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Number of stack slots taken up by the return value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        f.write_str(")")?;
        match &self.return_type {
            None => f.write_str("V"),
            Some(return_type) => write!(f, "{}", return_type),
        }
    }
}

/// Position in a descriptor being parsed
struct Cursor<'a> {
    descriptor: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(descriptor: &'a str) -> Cursor<'a> {
        Cursor {
            descriptor,
            position: 0,
        }
    }

    fn invalid(&self) -> Error {
        Error::InvalidDescriptor(String::from(self.descriptor))
    }

    fn peek(&self) -> Option<u8> {
        self.descriptor.as_bytes().get(self.position).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<(), Error> {
        if self.peek() == Some(expected) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn finish(&self) -> Result<(), Error> {
        if self.position == self.descriptor.len() {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn field_type(&mut self) -> Result<FieldType, Error> {
        let next = self.peek().ok_or_else(|| self.invalid())?;
        self.position += 1;
        match next {
            b'[' => Ok(FieldType::array(self.field_type()?)),
            b'L' => {
                let rest = &self.descriptor[self.position..];
                let end = rest.find(';').ok_or_else(|| self.invalid())?;
                let class_name = BinaryName::from_string(String::from(&rest[..end]))
                    .map_err(|_| self.invalid())?;
                self.position += end + 1;
                Ok(FieldType::object(class_name))
            }
            other => BaseType::from_char(other)
                .map(FieldType::Base)
                .ok_or_else(|| self.invalid()),
        }
    }
}
