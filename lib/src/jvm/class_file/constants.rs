use super::{Attribute, AttributeLike, BootstrapMethod};
use crate::jvm::{Error, MethodDescriptor, RefType, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;

/// Largest `constant_pool_count` that fits in the class file header
const MAX_CONSTANT_POOL_COUNT: usize = u16::MAX as usize;

/// Deduplicating constant pool for one class
///
/// Entries are kept in insertion order, which is also the serialization order. Requesting a
/// constant that is structurally identical to one already present returns the existing index.
/// Reference-bearing constants are keyed on the indices of the entries they point to, so two
/// requests for the same method reference always land on the same entry.
///
/// Adding never fails because the pool is full: the size check is done by
/// [`SymbolTable::check_capacity`] right before the class is written out.
pub struct SymbolTable {
    constants: OffsetVec<Constant>,
    deduplicated: HashMap<Constant, ConstantIndex>,

    /// Entries of the `BootstrapMethods` attribute
    bootstrap_methods: Vec<BootstrapMethod>,
    deduplicated_bootstrap_methods: HashMap<BootstrapMethod, u16>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    /// Make a fresh empty symbol table
    pub fn new() -> SymbolTable {
        SymbolTable {
            constants: OffsetVec::starting_at(Offset(1)),
            deduplicated: HashMap::new(),
            bootstrap_methods: vec![],
            deduplicated_bootstrap_methods: HashMap::new(),
        }
    }

    /// Seed a symbol table with an existing pool, keeping every entry at its original index
    ///
    /// Duplicate entries are kept (so indices don't shift); later requests resolve to the first
    /// of the duplicates.
    pub fn from_existing(
        constants: impl IntoIterator<Item = Constant>,
        bootstrap_methods: Vec<BootstrapMethod>,
    ) -> SymbolTable {
        let mut table = SymbolTable::new();
        for constant in constants {
            let index = ConstantIndex(table.constants.offset_len().0 as u32);
            table.deduplicated.entry(constant.clone()).or_insert(index);
            table.constants.push(constant);
        }
        for (index, bootstrap_method) in bootstrap_methods.into_iter().enumerate() {
            table
                .deduplicated_bootstrap_methods
                .entry(bootstrap_method.clone())
                .or_insert(index as u16);
            table.bootstrap_methods.push(bootstrap_method);
        }
        table
    }

    /// Number of entries (not slots: `long` and `double` count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Value of the `constant_pool_count` header field (one more than the slots used)
    pub fn constant_pool_count(&self) -> usize {
        self.constants.offset_len().0
    }

    /// Check that the pool can be written out
    pub fn check_capacity(&self) -> Result<(), Error> {
        if self.constant_pool_count() > MAX_CONSTANT_POOL_COUNT {
            Err(Error::ConstantPoolOverflow {
                slots: self.constants.total_width(),
            })
        } else {
            Ok(())
        }
    }

    /// Entries of the `BootstrapMethods` attribute, in order
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    /// Iterate through all entries with their index
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> {
        self.constants
            .iter_offsets()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u32), constant))
    }

    fn push_constant(&mut self, constant: Constant) -> ConstantIndex {
        if let Some(index) = self.deduplicated.get(&constant) {
            return *index;
        }
        let index = ConstantIndex(self.constants.offset_len().0 as u32);
        self.deduplicated.insert(constant.clone(), index);
        self.constants.push(constant);
        index
    }

    pub fn add_utf8(&mut self, utf8: &str) -> Utf8ConstantIndex {
        Utf8ConstantIndex(self.push_constant(Constant::Utf8(String::from(utf8))))
    }

    pub fn add_integer(&mut self, integer: i32) -> ConstantIndex {
        self.push_constant(Constant::Integer(integer))
    }

    pub fn add_float(&mut self, float: f32) -> ConstantIndex {
        self.push_constant(Constant::Float(float))
    }

    pub fn add_long(&mut self, long: i64) -> ConstantIndex {
        self.push_constant(Constant::Long(long))
    }

    pub fn add_double(&mut self, double: f64) -> ConstantIndex {
        self.push_constant(Constant::Double(double))
    }

    /// Class constant from an internal name or an array descriptor
    pub fn add_class(&mut self, internal_name: &str) -> ClassConstantIndex {
        let name = self.add_utf8(internal_name);
        ClassConstantIndex(self.push_constant(Constant::Class(name)))
    }

    pub fn add_string(&mut self, string: &str) -> ConstantIndex {
        let utf8 = self.add_utf8(string);
        self.push_constant(Constant::String(utf8))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> NameAndTypeConstantIndex {
        let name = self.add_utf8(name);
        let descriptor = self.add_utf8(descriptor);
        NameAndTypeConstantIndex(self.push_constant(Constant::NameAndType { name, descriptor }))
    }

    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let class = self.add_class(owner);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.push_constant(Constant::FieldRef(class, name_and_type))
    }

    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> ConstantIndex {
        let class = self.add_class(owner);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.push_constant(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
    }

    pub fn add_method_handle(&mut self, handle: &Handle) -> ConstantIndex {
        let member = if handle.kind.is_field() {
            self.add_field_ref(&handle.owner, &handle.name, &handle.descriptor)
        } else {
            self.add_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.is_interface,
            )
        };
        self.push_constant(Constant::MethodHandle {
            handle_kind: handle.kind,
            member,
        })
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> ConstantIndex {
        let descriptor = self.add_utf8(descriptor);
        self.push_constant(Constant::MethodType(descriptor))
    }

    pub fn add_module(&mut self, name: &str) -> ConstantIndex {
        let name = self.add_utf8(name);
        self.push_constant(Constant::Module(name))
    }

    pub fn add_package(&mut self, name: &str) -> ConstantIndex {
        let name = self.add_utf8(name);
        self.push_constant(Constant::Package(name))
    }

    /// Get or insert an entry in the `BootstrapMethods` attribute
    pub fn add_bootstrap_method(
        &mut self,
        handle: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<u16, Error> {
        for argument in arguments {
            argument.validate()?;
        }
        let bootstrap_method = self.add_method_handle(handle);
        let bootstrap_arguments = arguments
            .iter()
            .map(|argument| self.add_constant(argument))
            .collect::<Result<Vec<_>, Error>>()?;
        let entry = BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments,
        };
        if let Some(index) = self.deduplicated_bootstrap_methods.get(&entry) {
            return Ok(*index);
        }
        let index = u16::try_from(self.bootstrap_methods.len()).map_err(|_| {
            Error::InvalidConstant(String::from("more than 65535 bootstrap methods"))
        })?;
        self.deduplicated_bootstrap_methods
            .insert(entry.clone(), index);
        self.bootstrap_methods.push(entry);
        Ok(index)
    }

    /// Dynamically-computed constant (`CONSTANT_Dynamic`)
    pub fn add_dynamic(&mut self, dynamic: &ConstantDynamic) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.add_bootstrap_method(&dynamic.bootstrap, &dynamic.arguments)?;
        let name_and_type = self.add_name_and_type(&dynamic.name, &dynamic.descriptor);
        Ok(self.push_constant(Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        }))
    }

    /// Dynamically-computed call site (`CONSTANT_InvokeDynamic`)
    pub fn add_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.add_bootstrap_method(bootstrap, arguments)?;
        let name_and_type = self.add_name_and_type(name, descriptor);
        Ok(self.push_constant(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        }))
    }

    /// Get or insert a loadable constant
    ///
    /// `byte`, `char`, `short`, and `boolean` values are all stored as `int` constants. Types
    /// become class constants (objects and arrays) or method type constants (methods). Nothing is
    /// inserted if the value has no constant pool representation.
    pub fn add_constant(&mut self, value: &ConstantValue) -> Result<ConstantIndex, Error> {
        value.validate()?;
        Ok(match value {
            ConstantValue::Integer(integer) => self.add_integer(*integer),
            ConstantValue::Byte(byte) => self.add_integer(*byte as i32),
            ConstantValue::Char(character) => self.add_integer(*character as i32),
            ConstantValue::Short(short) => self.add_integer(*short as i32),
            ConstantValue::Boolean(boolean) => self.add_integer(*boolean as i32),
            ConstantValue::Float(float) => self.add_float(*float),
            ConstantValue::Long(long) => self.add_long(*long),
            ConstantValue::Double(double) => self.add_double(*double),
            ConstantValue::String(string) => self.add_string(string),
            ConstantValue::Type(descriptor) if descriptor.starts_with('(') => {
                self.add_method_type(descriptor)
            }
            ConstantValue::Type(descriptor) => {
                let internal_name = RefType::parse(descriptor)
                    .map_err(|_| Error::InvalidConstant(descriptor.clone()))?
                    .internal_name();
                self.add_class(&internal_name).into()
            }
            ConstantValue::Handle(handle) => self.add_method_handle(handle),
            ConstantValue::Dynamic(dynamic) => self.add_dynamic(dynamic)?,
        })
    }

    /// Add an attribute, interning its name
    pub fn add_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.add_utf8(A::NAME);
        let mut info = vec![];
        attribute.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }

    /// Index of an existing class constant, without inserting anything
    pub fn find_class(&self, internal_name: &str) -> Option<ClassConstantIndex> {
        let name = *self
            .deduplicated
            .get(&Constant::Utf8(String::from(internal_name)))?;
        self.deduplicated
            .get(&Constant::Class(Utf8ConstantIndex(name)))
            .map(|index| ClassConstantIndex(*index))
    }

    /// Look up an entry by index
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(Error::MissingConstant(index.0))
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(unexpected(index.0, "Utf8")),
        }
    }

    /// Internal name (or array descriptor) of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(unexpected(index.0, "Class")),
        }
    }

    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(unexpected(index.0, "NameAndType")),
        }
    }

    /// Owner, name, and descriptor of a field or method reference
    pub fn member_ref(&self, index: ConstantIndex) -> Result<MemberRef<'_>, Error> {
        let (class, name_and_type) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => (*class, *name_and_type),
            _ => return Err(unexpected(index, "member reference")),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
        })
    }

    /// Name and descriptor of an `invokedynamic` or dynamic constant
    pub fn dynamic_name_and_type(&self, index: ConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::InvokeDynamic { name_and_type, .. }
            | Constant::Dynamic { name_and_type, .. } => self.name_and_type(*name_and_type),
            _ => Err(unexpected(index, "InvokeDynamic")),
        }
    }
}

fn unexpected(index: ConstantIndex, expected: &'static str) -> Error {
    Error::UnexpectedConstant {
        index: index.0,
        expected,
    }
}

impl Serialize for SymbolTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let count = u16::try_from(self.constant_pool_count()).map_err(|_| {
            std::io::Error::new(ErrorKind::InvalidData, "constant pool count overflow")
        })?;
        count.serialize(writer)?;
        for constant in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Field or method reference resolved to strings
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Symbolic reference to a field or method, used as a method handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// Dynamically computed constant, produced by a bootstrap method
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub arguments: Vec<ConstantValue>,
}

/// Value that can be requested as a constant (eg. for `ldc` or as a bootstrap argument)
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Integer(i32),
    Byte(i8),
    Char(u16),
    Short(i16),
    Boolean(bool),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Object, array, or method type given by its descriptor
    Type(String),

    Handle(Handle),
    Dynamic(ConstantDynamic),
}

impl ConstantValue {
    /// Check that the value has a constant pool representation
    fn validate(&self) -> Result<(), Error> {
        match self {
            ConstantValue::Type(descriptor) if descriptor.starts_with('(') => {
                MethodDescriptor::parse(descriptor)
                    .map(|_| ())
                    .map_err(|_| Error::InvalidConstant(descriptor.clone()))
            }
            ConstantValue::Type(descriptor) => RefType::parse(descriptor)
                .map(|_| ())
                .map_err(|_| Error::InvalidConstant(descriptor.clone())),
            ConstantValue::Dynamic(dynamic) => dynamic
                .arguments
                .iter()
                .try_for_each(ConstantValue::validate),
            _ => Ok(()),
        }
    }
}

/// Constant pool entry ([JVMS 4.4][0])
///
/// References to other entries are typed indices, so the pool can only be built bottom-up.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Stored in modified UTF-8 (see `encode_modified_utf8`)
    Utf8(String),

    /// Also holds `byte`, `char`, `short`, and `boolean` values
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Internal name of a class, or descriptor of an array
    Class(Utf8ConstantIndex),

    /// `java.lang.String` literal
    String(Utf8ConstantIndex),

    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// `Methodref`, or `InterfaceMethodref` when `is_interface`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    MethodHandle {
        handle_kind: HandleKind,

        /// `FieldRef` for the field kinds, `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method descriptor loaded as a `java.lang.invoke.MethodType`
    MethodType(Utf8ConstantIndex),

    /// `CONSTANT_Dynamic`, resolved by the bootstrap method at that position in
    /// `BootstrapMethods`
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Call site for `invokedynamic`, resolved like `Dynamic`
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Tag byte identifying the constant kind in the class file
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef(_, _) => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true, ..
            } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }
}

/// Floating point constants compare by bit pattern, so that `NaN` is equal to itself and `0.0`
/// is distinct from `-0.0`.
impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Utf8(a), Constant::Utf8(b)) => a == b,
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::Class(a), Constant::Class(b)) => a == b,
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::FieldRef(c1, nt1), Constant::FieldRef(c2, nt2)) => c1 == c2 && nt1 == nt2,
            (
                Constant::MethodRef {
                    class: c1,
                    name_and_type: nt1,
                    is_interface: i1,
                },
                Constant::MethodRef {
                    class: c2,
                    name_and_type: nt2,
                    is_interface: i2,
                },
            ) => c1 == c2 && nt1 == nt2 && i1 == i2,
            (
                Constant::NameAndType {
                    name: n1,
                    descriptor: d1,
                },
                Constant::NameAndType {
                    name: n2,
                    descriptor: d2,
                },
            ) => n1 == n2 && d1 == d2,
            (
                Constant::MethodHandle {
                    handle_kind: k1,
                    member: m1,
                },
                Constant::MethodHandle {
                    handle_kind: k2,
                    member: m2,
                },
            ) => k1 == k2 && m1 == m2,
            (Constant::MethodType(a), Constant::MethodType(b)) => a == b,
            (
                Constant::Dynamic {
                    bootstrap_method: b1,
                    name_and_type: nt1,
                },
                Constant::Dynamic {
                    bootstrap_method: b2,
                    name_and_type: nt2,
                },
            ) => b1 == b2 && nt1 == nt2,
            (
                Constant::InvokeDynamic {
                    bootstrap_method: b1,
                    name_and_type: nt1,
                },
                Constant::InvokeDynamic {
                    bootstrap_method: b2,
                    name_and_type: nt2,
                },
            ) => b1 == b2 && nt1 == nt2,
            (Constant::Module(a), Constant::Module(b)) => a == b,
            (Constant::Package(a), Constant::Package(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Constant::Utf8(string) => string.hash(state),
            Constant::Integer(integer) => integer.hash(state),
            Constant::Float(float) => float.to_bits().hash(state),
            Constant::Long(long) => long.hash(state),
            Constant::Double(double) => double.to_bits().hash(state),
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType(name)
            | Constant::Module(name)
            | Constant::Package(name) => name.hash(state),
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.hash(state);
                name_and_type.hash(state);
            }
            Constant::NameAndType { name, descriptor } => {
                name.hash(state);
                descriptor.hash(state);
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.hash(state);
                member.hash(state);
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                bootstrap_method.hash(state);
                name_and_type.hash(state);
            }
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                let len = u16::try_from(buffer.len()).map_err(|_| {
                    std::io::Error::new(
                        ErrorKind::InvalidData,
                        format!("UTF8 constant of {} bytes is too large", buffer.len()),
                    )
                })?;
                len.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => integer.serialize(writer)?,
            Constant::Float(float) => float.serialize(writer)?,
            Constant::Long(long) => long.serialize(writer)?,
            Constant::Double(double) => double.serialize(writer)?,
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType(name)
            | Constant::Module(name)
            | Constant::Package(name) => name.serialize(writer)?,
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// `long` and `double` occupy two pool indices, the second of which is never referenced
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Encode a string the way `CONSTANT_Utf8` stores it
///
/// This is UTF-8 applied to UTF-16 code units, except that `U+0000` takes the two byte form.
/// Characters outside the BMP are therefore written as two 3-byte surrogates.
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter().map(|unit| *unit as u32) {
            if unit != 0 && unit < 0x80 {
                buffer.push(unit as u8);
            } else if unit < 0x800 {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Decode modified UTF-8 (see [`encode_modified_utf8`])
///
/// Unpaired surrogates have no `char` representation and become `U+FFFD`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = |at: usize| Error::MalformedClass(format!("bad modified UTF-8 at byte {}", at));
    let continuation = |at: usize| -> Result<u16, Error> {
        match bytes.get(at) {
            Some(byte) if byte & 0b1100_0000 == 0b1000_0000 => Ok((byte & 0x3F) as u16),
            _ => Err(malformed(at)),
        }
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte & 0b1000_0000 == 0 && byte != 0 {
            units.push(byte as u16);
            idx += 1;
        } else if byte & 0b1110_0000 == 0b1100_0000 {
            units.push(((byte & 0x1F) as u16) << 6 | continuation(idx + 1)?);
            idx += 2;
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            units.push(
                ((byte & 0x0F) as u16) << 12 | continuation(idx + 1)? << 6 | continuation(idx + 2)?,
            );
            idx += 3;
        } else {
            return Err(malformed(idx));
        }
    }

    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u32);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

/// Indices are only narrowed to 16 bits here, after [`SymbolTable::check_capacity`]
impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        u16::try_from(self.0)
            .map_err(|_| {
                std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("constant index {} does not fit in 16 bits", self.0),
                )
            })?
            .serialize(writer)
    }
}

impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// What a method handle does with its member ([JVMS 5.4.3.5][0])
///
/// Variants are declared in `reference_kind` order.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    /// Does the handle refer to a field (as opposed to a method)?
    pub fn is_field(&self) -> bool {
        matches!(
            self,
            HandleKind::GetField | HandleKind::GetStatic | HandleKind::PutField | HandleKind::PutStatic
        )
    }

    const KINDS: [HandleKind; 9] = [
        HandleKind::GetField,
        HandleKind::GetStatic,
        HandleKind::PutField,
        HandleKind::PutStatic,
        HandleKind::InvokeVirtual,
        HandleKind::InvokeStatic,
        HandleKind::InvokeSpecial,
        HandleKind::NewInvokeSpecial,
        HandleKind::InvokeInterface,
    ];

    /// `reference_kind` byte (1 to 9)
    pub fn reference_kind(&self) -> u8 {
        *self as u8 + 1
    }

    pub fn from_reference_kind(kind: u8) -> Option<HandleKind> {
        let position = usize::from(kind).checked_sub(1)?;
        HandleKind::KINDS.get(position).copied()
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.reference_kind().serialize(writer)
    }
}


#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode_modified_utf8("x\0y"), b"x\xc0\x80y".to_vec());
        assert_eq!(decode_modified_utf8(b"x\xc0\x80y").unwrap(), "x\0y");
        assert_eq!(encode_modified_utf8("plain"), b"plain".to_vec());
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let text = "ĄǍǞǠǺȀȂȦȺӐӒऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        assert_eq!(encode_modified_utf8(text), text.as_bytes());
        assert_eq!(decode_modified_utf8(text.as_bytes()).unwrap(), text);
    }

    #[test]
    fn supplementary_characters() {
        let encoded = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"),
            encoded
        );
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn malformed_input() {
        assert!(decode_modified_utf8(&[0]).is_err());
        assert!(decode_modified_utf8(&[0xC0]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x80, 0x80, 0x80]).is_err());
    }
}
