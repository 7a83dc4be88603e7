use crate::jvm::class_file::{
    decode_modified_utf8, Attribute, AttributeLike, BootstrapMethod, BootstrapMethods,
    ClassConstantIndex, ClassFile, Code, Constant, ConstantDynamic, ConstantIndex, ConstantValue,
    ConstantValueAttribute, Field, Handle, HandleKind, Method, NameAndTypeConstantIndex,
    StackMapTable, SymbolTable, Utf8ConstantIndex,
};
use crate::jvm::code::{
    array_type_from_code, method_descriptor, CompareMode, EqComparison, Instruction, Label,
    MethodContext, OrdComparison, ShiftType,
};
use crate::jvm::verifier::{entry_frame, VerificationType};
use crate::jvm::{
    ByteCursor, ClassAccessFlags, ClassWriter, ComputeFlags, Error, FieldAccessFlags, FieldInsn,
    JumpInsn, MethodAccessFlags, MethodInsn, MethodWriter, TypeInsn, Version,
};
use crate::util::Width;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;

/// Decoder for class files
///
/// Parsing checks the overall structure and decodes the constant pool. The members are only
/// decoded when the class is replayed into a [`ClassWriter`] with [`ClassReader::accept`].
///
/// Besides the code of methods, the only attributes understood are `ConstantValue`,
/// `BootstrapMethods`, and `StackMapTable`. Other class, field, and method attributes are copied
/// when the writer shares this reader's constant pool (see [`ClassWriter::from_reader`]) and
/// dropped otherwise. Other attributes of `Code` (line numbers, local variable tables, ...) are
/// always dropped.
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    version: Version,
    constants: SymbolTable,
    access_flags: ClassAccessFlags,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<MemberInfo<'a>>,
    methods: Vec<MemberInfo<'a>>,
    attributes: Vec<AttributeInfo<'a>>,
}

struct MemberInfo<'a> {
    access_flags: u16,
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    attributes: Vec<AttributeInfo<'a>>,
}

#[derive(Copy, Clone)]
struct AttributeInfo<'a> {
    name_index: Utf8ConstantIndex,
    info: &'a [u8],
}

impl<'a> AttributeInfo<'a> {
    fn to_attribute(self) -> Attribute {
        Attribute {
            name_index: self.name_index,
            info: self.info.to_vec(),
        }
    }
}

/// Verification type as decoded, with uninitialized values still given by bytecode offset
type DecodedType = VerificationType<String, usize>;

/// Instruction decoded from the code array, with constants and jump targets not yet resolved
enum Op {
    Insn(Instruction),
    Ldc(ConstantIndex),
    Field(FieldInsn, ConstantIndex),
    Method(MethodInsn, ConstantIndex),
    InvokeDynamic(ConstantIndex),
    Type(TypeInsn, ClassConstantIndex),
    MultiANewArray(ClassConstantIndex, u8),
    Jump(JumpInsn, usize),
    TableSwitch {
        low: i32,
        default: usize,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        targets: Vec<(i32, usize)>,
    },
    Return,
    Throw,
    Ret(u16),
}

impl<'a> ClassReader<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<ClassReader<'a>, Error> {
        let mut cursor = ByteCursor::new(bytes);
        if cursor.bytes(4)? != ClassFile::MAGIC {
            return Err(malformed("missing magic number"));
        }
        let minor_version = cursor.u16()?;
        let major_version = cursor.u16()?;
        let constants = read_constant_pool(&mut cursor)?;
        let access_flags = ClassAccessFlags::from_bits_truncate(cursor.u16()?);
        let this_class = ClassConstantIndex(read_index(&mut cursor)?);
        let super_class = match read_index(&mut cursor)? {
            ConstantIndex(0) => None,
            index => Some(ClassConstantIndex(index)),
        };
        let interface_count = cursor.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(ClassConstantIndex(read_index(&mut cursor)?));
        }
        let fields = read_members(&mut cursor)?;
        let methods = read_members(&mut cursor)?;
        let attributes = read_attributes(&mut cursor)?;
        if cursor.remaining() > 0 {
            return Err(malformed("trailing bytes after the class attributes"));
        }

        // Bootstrap methods are part of the symbol table, but they come last in the file
        let without_bootstrap = SymbolTable::from_existing(constants.iter().cloned(), vec![]);
        let mut bootstrap_methods = vec![];
        for attribute in &attributes {
            if without_bootstrap.utf8(attribute.name_index)? == BootstrapMethods::NAME {
                bootstrap_methods = read_bootstrap_methods(attribute.info)?;
            }
        }
        let constants = SymbolTable::from_existing(constants, bootstrap_methods);

        let reader = ClassReader {
            bytes,
            version: Version {
                minor_version,
                major_version,
            },
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        log::trace!(
            "Parsed class {} ({} constants, {} fields, {} methods)",
            reader.class_name()?,
            reader.constants.len(),
            reader.fields.len(),
            reader.methods.len()
        );
        Ok(reader)
    }

    /// Bytes the class was parsed from
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Decoded constant pool, including the bootstrap methods
    pub fn constants(&self) -> &SymbolTable {
        &self.constants
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.access_flags
    }

    /// Internal name of the class
    pub fn class_name(&self) -> Result<&str, Error> {
        self.constants.class_name(self.this_class)
    }

    /// Internal name of the superclass (`None` for `java/lang/Object`)
    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        self.super_class
            .map(|super_class| self.constants.class_name(super_class))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.constants.class_name(*interface))
            .collect()
    }

    /// Replay the class into a writer
    ///
    /// If the writer was made with [`ClassWriter::from_reader`] on this reader, fields and
    /// attributes are copied as they are, and so are methods under
    /// [`ComputeFlags::COMPUTE_NONE`]. Otherwise every method body is decoded and visited
    /// instruction by instruction. Frames are only visited when the writer doesn't compute them.
    pub fn accept(&self, writer: &mut ClassWriter) -> Result<(), Error> {
        let shares_pool = writer.is_copy_of(self.bytes);
        let interfaces = self.interface_names()?;
        writer.visit(
            self.version,
            self.access_flags,
            self.class_name()?,
            self.super_name()?,
            &interfaces,
        );

        for field in &self.fields {
            let access_flags = FieldAccessFlags::from_bits_truncate(field.access_flags);
            if shares_pool {
                writer.copy_field(Field {
                    access_flags,
                    name_index: field.name,
                    descriptor_index: field.descriptor,
                    attributes: field.attributes.iter().map(|a| a.to_attribute()).collect(),
                });
                continue;
            }

            let name = self.constants.utf8(field.name)?;
            let mut value = None;
            for attribute in &field.attributes {
                match self.constants.utf8(attribute.name_index)? {
                    ConstantValueAttribute::NAME => {
                        let index = read_index(&mut ByteCursor::new(attribute.info))?;
                        value = Some(self.constant_value(index)?);
                    }
                    other => log::debug!("Dropping attribute {} of field {}", other, name),
                }
            }
            writer.visit_field(
                access_flags,
                name,
                self.constants.utf8(field.descriptor)?,
                value.as_ref(),
            )?;
        }

        let verbatim_methods = shares_pool && writer.flags() == ComputeFlags::COMPUTE_NONE;
        let visit_frames = !writer.flags().contains(ComputeFlags::COMPUTE_FRAMES);
        for method in &self.methods {
            let access_flags = MethodAccessFlags::from_bits_truncate(method.access_flags);
            if verbatim_methods {
                writer.copy_method(Method {
                    access_flags,
                    name_index: method.name,
                    descriptor_index: method.descriptor,
                    attributes: method.attributes.iter().map(|a| a.to_attribute()).collect(),
                });
                continue;
            }

            let name = self.constants.utf8(method.name)?;
            let descriptor = self.constants.utf8(method.descriptor)?;
            let context = MethodContext {
                this_class: String::from(self.class_name()?),
                name: String::from(name),
                descriptor: method_descriptor(descriptor)?,
                is_static: access_flags.contains(MethodAccessFlags::STATIC),
            };
            let mut method_writer = writer.visit_method(access_flags, name, descriptor)?;
            for attribute in &method.attributes {
                let attribute_name = self.constants.utf8(attribute.name_index)?;
                if attribute_name == Code::NAME {
                    self.accept_code(&mut method_writer, &context, attribute.info, visit_frames)?;
                } else if shares_pool {
                    method_writer.visit_attribute(attribute_name, attribute.info.to_vec());
                } else {
                    log::debug!("Dropping attribute {} of method {}", attribute_name, name);
                }
            }
            method_writer.visit_end()?;
        }

        for attribute in &self.attributes {
            let name = self.constants.utf8(attribute.name_index)?;
            if shares_pool || name == BootstrapMethods::NAME {
                writer.visit_attribute(name, attribute.info.to_vec());
            } else {
                log::debug!("Dropping class attribute {}", name);
            }
        }

        Ok(())
    }

    /// Decode a `Code` attribute into method writer events
    fn accept_code(
        &self,
        method: &mut MethodWriter,
        context: &MethodContext,
        info: &[u8],
        visit_frames: bool,
    ) -> Result<(), Error> {
        let mut cursor = ByteCursor::new(info);
        let max_stack = cursor.u16()?;
        let max_locals = cursor.u16()?;
        let code_length = cursor.u32()? as usize;
        let ops = decode_code(cursor.bytes(code_length)?)?;

        let handler_count = cursor.u16()?;
        let mut handlers = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let start = cursor.u16()? as usize;
            let end = cursor.u16()? as usize;
            let handler = cursor.u16()? as usize;
            let catch_type = match read_index(&mut cursor)? {
                ConstantIndex(0) => None,
                index => Some(self.constants.class_name(ClassConstantIndex(index))?),
            };
            handlers.push((start, end, handler, catch_type));
        }

        let mut frames = BTreeMap::new();
        let attribute_count = cursor.u16()?;
        for _ in 0..attribute_count {
            let name_index = Utf8ConstantIndex(read_index(&mut cursor)?);
            let length = cursor.u32()? as usize;
            let attribute_info = cursor.bytes(length)?;
            match self.constants.utf8(name_index)? {
                StackMapTable::NAME if visit_frames => {
                    frames = self.decode_stack_map(attribute_info, context)?
                }
                StackMapTable::NAME => (),
                other => log::debug!("Dropping attribute {} of {}'s code", other, context.name),
            }
        }

        // Every offset something refers to gets a label
        let mut offsets: BTreeSet<usize> = BTreeSet::new();
        for (_, op) in &ops {
            match op {
                Op::Jump(_, target) => {
                    offsets.insert(*target);
                }
                Op::TableSwitch {
                    default, targets, ..
                } => {
                    offsets.insert(*default);
                    offsets.extend(targets.iter().copied());
                }
                Op::LookupSwitch { default, targets } => {
                    offsets.insert(*default);
                    offsets.extend(targets.iter().map(|(_, target)| *target));
                }
                _ => (),
            }
        }
        for (start, end, handler, _) in &handlers {
            offsets.extend([*start, *end, *handler]);
        }
        for (locals, stack) in frames.values() {
            for vtype in locals.iter().chain(stack.iter()) {
                if let VerificationType::Uninitialized(site) = vtype {
                    offsets.insert(*site);
                }
            }
        }
        let labels: BTreeMap<usize, Label> = offsets
            .into_iter()
            .map(|offset| (offset, method.new_label()))
            .collect();
        let label = |offset: &usize| -> Result<Label, Error> {
            labels
                .get(offset)
                .copied()
                .ok_or_else(|| malformed(&format!("no label at offset {}", offset)))
        };
        let resolve_type =
            |vtype: &DecodedType| vtype.try_map(|class| Ok(class.clone()), |site| label(site));

        for (offset, op) in &ops {
            if let Some(label) = labels.get(offset) {
                method.visit_label(*label);
            }
            if let Some((locals, stack)) = frames.get(offset) {
                method.visit_frame(
                    locals.iter().map(resolve_type).collect::<Result<_, _>>()?,
                    stack.iter().map(resolve_type).collect::<Result<_, _>>()?,
                );
            }
            self.accept_op(method, op, &label)?;
        }
        if let Some(label) = labels.get(&code_length) {
            method.visit_label(*label);
        }

        for (start, end, handler, catch_type) in handlers {
            method.visit_try_catch_block(label(&start)?, label(&end)?, label(&handler)?, catch_type);
        }
        method.visit_maxs(max_stack, max_locals);
        Ok(())
    }

    fn accept_op(
        &self,
        method: &mut MethodWriter,
        op: &Op,
        label: &impl Fn(&usize) -> Result<Label, Error>,
    ) -> Result<(), Error> {
        match op {
            Op::Insn(insn) => method.visit_insn(insn.clone()),
            Op::Ldc(index) => method.visit_ldc_insn(&self.constant_value(*index)?)?,
            Op::Field(insn, index) => {
                let field = self.constants.member_ref(*index)?;
                method.visit_field_insn(*insn, field.owner, field.name, field.descriptor)?;
            }
            Op::Method(insn, index) => {
                let is_interface = matches!(
                    self.constants.get(*index)?,
                    Constant::MethodRef {
                        is_interface: true,
                        ..
                    }
                );
                let target = self.constants.member_ref(*index)?;
                method.visit_method_insn(
                    *insn,
                    target.owner,
                    target.name,
                    target.descriptor,
                    is_interface,
                )?;
            }
            Op::InvokeDynamic(index) => match self.constants.get(*index)? {
                Constant::InvokeDynamic {
                    bootstrap_method,
                    name_and_type,
                } => {
                    let (name, descriptor) = self.constants.name_and_type(*name_and_type)?;
                    let (bootstrap, arguments) = self.bootstrap_method(*bootstrap_method)?;
                    method.visit_invoke_dynamic_insn(name, descriptor, &bootstrap, &arguments)?;
                }
                _ => {
                    return Err(Error::UnexpectedConstant {
                        index: index.0,
                        expected: "InvokeDynamic",
                    })
                }
            },
            Op::Type(insn, class) => method.visit_type_insn(*insn, self.constants.class_name(*class)?),
            Op::MultiANewArray(class, dimensions) => method
                .visit_multi_anew_array_insn(self.constants.class_name(*class)?, *dimensions)?,
            Op::Jump(insn, target) => method.visit_jump_insn(*insn, label(target)?),
            Op::TableSwitch {
                low,
                default,
                targets,
            } => method.visit_table_switch_insn(
                *low,
                label(default)?,
                targets.iter().map(label).collect::<Result<_, _>>()?,
            ),
            Op::LookupSwitch { default, targets } => method.visit_lookup_switch_insn(
                label(default)?,
                targets
                    .iter()
                    .map(|(key, target)| Ok((*key, label(target)?)))
                    .collect::<Result<_, Error>>()?,
            ),
            Op::Return => method.visit_return_insn(),
            Op::Throw => method.visit_throw_insn(),
            Op::Ret(var) => method.visit_ret_insn(*var),
        }
        Ok(())
    }

    /// Expand the compressed frames of a `StackMapTable` into full frames, keyed by offset
    fn decode_stack_map(
        &self,
        info: &[u8],
        context: &MethodContext,
    ) -> Result<BTreeMap<usize, (Vec<DecodedType>, Vec<DecodedType>)>, Error> {
        let mut cursor = ByteCursor::new(info);
        let mut locals: Vec<DecodedType> = entry_frame(context)
            .local_entries()
            .iter()
            .map(|vtype| vtype.map(String::clone, |block| block.0))
            .collect();
        let mut frames = BTreeMap::new();
        let mut previous_offset: Option<usize> = None;

        let frame_count = cursor.u16()?;
        for _ in 0..frame_count {
            let frame_type = cursor.u8()?;
            let (offset_delta, stack) = match frame_type {
                0..=63 => (frame_type as u16, vec![]),
                64..=127 => (
                    (frame_type - 64) as u16,
                    vec![self.verification_type(&mut cursor)?],
                ),
                247 => {
                    let offset_delta = cursor.u16()?;
                    (offset_delta, vec![self.verification_type(&mut cursor)?])
                }
                248..=250 => {
                    let offset_delta = cursor.u16()?;
                    let chopped = (251 - frame_type) as usize;
                    let kept = locals
                        .len()
                        .checked_sub(chopped)
                        .ok_or_else(|| malformed("chop frame removes too many locals"))?;
                    locals.truncate(kept);
                    (offset_delta, vec![])
                }
                251 => (cursor.u16()?, vec![]),
                252..=254 => {
                    let offset_delta = cursor.u16()?;
                    for _ in 251..frame_type {
                        locals.push(self.verification_type(&mut cursor)?);
                    }
                    (offset_delta, vec![])
                }
                255 => {
                    let offset_delta = cursor.u16()?;
                    let local_count = cursor.u16()?;
                    locals = (0..local_count)
                        .map(|_| self.verification_type(&mut cursor))
                        .collect::<Result<_, _>>()?;
                    let stack_count = cursor.u16()?;
                    let stack = (0..stack_count)
                        .map(|_| self.verification_type(&mut cursor))
                        .collect::<Result<_, _>>()?;
                    (offset_delta, stack)
                }
                _ => return Err(malformed(&format!("reserved frame type {}", frame_type))),
            };

            let offset = match previous_offset {
                None => offset_delta as usize,
                Some(previous) => previous + offset_delta as usize + 1,
            };
            previous_offset = Some(offset);
            frames.insert(offset, (locals.clone(), stack));
        }

        Ok(frames)
    }

    fn verification_type(&self, cursor: &mut ByteCursor) -> Result<DecodedType, Error> {
        Ok(match cursor.u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => {
                let class = ClassConstantIndex(read_index(cursor)?);
                VerificationType::Object(String::from(self.constants.class_name(class)?))
            }
            8 => VerificationType::Uninitialized(cursor.u16()? as usize),
            tag => return Err(malformed(&format!("bad verification type tag {}", tag))),
        })
    }

    /// Turn a loadable constant back into the value it was made from
    fn constant_value(&self, index: ConstantIndex) -> Result<ConstantValue, Error> {
        Ok(match self.constants.get(index)? {
            Constant::Integer(integer) => ConstantValue::Integer(*integer),
            Constant::Float(float) => ConstantValue::Float(*float),
            Constant::Long(long) => ConstantValue::Long(*long),
            Constant::Double(double) => ConstantValue::Double(*double),
            Constant::String(string) => {
                ConstantValue::String(String::from(self.constants.utf8(*string)?))
            }
            Constant::Class(name) => {
                let name = self.constants.utf8(*name)?;
                ConstantValue::Type(if name.starts_with('[') {
                    String::from(name)
                } else {
                    format!("L{};", name)
                })
            }
            Constant::MethodType(descriptor) => {
                ConstantValue::Type(String::from(self.constants.utf8(*descriptor)?))
            }
            Constant::MethodHandle { .. } => ConstantValue::Handle(self.handle(index)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = self.constants.name_and_type(*name_and_type)?;
                let (bootstrap, arguments) = self.bootstrap_method(*bootstrap_method)?;
                ConstantValue::Dynamic(ConstantDynamic {
                    name: String::from(name),
                    descriptor: String::from(descriptor),
                    bootstrap,
                    arguments,
                })
            }
            _ => {
                return Err(Error::UnexpectedConstant {
                    index: index.0,
                    expected: "loadable constant",
                })
            }
        })
    }

    fn handle(&self, index: ConstantIndex) -> Result<Handle, Error> {
        match self.constants.get(index)? {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                let is_interface = matches!(
                    self.constants.get(*member)?,
                    Constant::MethodRef {
                        is_interface: true,
                        ..
                    }
                );
                let member = self.constants.member_ref(*member)?;
                Ok(Handle {
                    kind: *handle_kind,
                    owner: String::from(member.owner),
                    name: String::from(member.name),
                    descriptor: String::from(member.descriptor),
                    is_interface,
                })
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "MethodHandle",
            }),
        }
    }

    fn bootstrap_method(&self, index: u16) -> Result<(Handle, Vec<ConstantValue>), Error> {
        let bootstrap_method = self
            .constants
            .bootstrap_methods()
            .get(index as usize)
            .ok_or_else(|| malformed(&format!("no bootstrap method {}", index)))?;
        let arguments = bootstrap_method
            .bootstrap_arguments
            .iter()
            .map(|argument| self.constant_value(*argument))
            .collect::<Result<_, _>>()?;
        Ok((self.handle(bootstrap_method.bootstrap_method)?, arguments))
    }
}

fn malformed(message: &str) -> Error {
    Error::MalformedClass(String::from(message))
}

fn read_index(cursor: &mut ByteCursor) -> Result<ConstantIndex, Error> {
    Ok(ConstantIndex(cursor.u16()? as u32))
}

fn read_constant_pool(cursor: &mut ByteCursor) -> Result<Vec<Constant>, Error> {
    let count = cursor.u16()? as usize;
    let mut constants = vec![];
    let mut index = 1;
    while index < count {
        let constant = read_constant(cursor)?;
        index += constant.width();
        constants.push(constant);
    }
    if index > count {
        return Err(malformed("last constant overflows the constant pool"));
    }
    Ok(constants)
}

fn read_constant(cursor: &mut ByteCursor) -> Result<Constant, Error> {
    let utf8 = |cursor: &mut ByteCursor| read_index(cursor).map(Utf8ConstantIndex);
    let name_and_type = |cursor: &mut ByteCursor| read_index(cursor).map(NameAndTypeConstantIndex);

    Ok(match cursor.u8()? {
        1 => {
            let length = cursor.u16()? as usize;
            Constant::Utf8(decode_modified_utf8(cursor.bytes(length)?)?)
        }
        3 => Constant::Integer(cursor.i32()?),
        4 => Constant::Float(cursor.f32()?),
        5 => Constant::Long(cursor.i64()?),
        6 => Constant::Double(cursor.f64()?),
        7 => Constant::Class(utf8(cursor)?),
        8 => Constant::String(utf8(cursor)?),
        9 => Constant::FieldRef(
            ClassConstantIndex(read_index(cursor)?),
            name_and_type(cursor)?,
        ),
        tag @ (10 | 11) => Constant::MethodRef {
            class: ClassConstantIndex(read_index(cursor)?),
            name_and_type: name_and_type(cursor)?,
            is_interface: tag == 11,
        },
        12 => Constant::NameAndType {
            name: utf8(cursor)?,
            descriptor: utf8(cursor)?,
        },
        15 => {
            let kind = cursor.u8()?;
            Constant::MethodHandle {
                handle_kind: HandleKind::from_reference_kind(kind)
                    .ok_or_else(|| malformed(&format!("bad reference kind {}", kind)))?,
                member: read_index(cursor)?,
            }
        }
        16 => Constant::MethodType(utf8(cursor)?),
        17 => Constant::Dynamic {
            bootstrap_method: cursor.u16()?,
            name_and_type: name_and_type(cursor)?,
        },
        18 => Constant::InvokeDynamic {
            bootstrap_method: cursor.u16()?,
            name_and_type: name_and_type(cursor)?,
        },
        19 => Constant::Module(utf8(cursor)?),
        20 => Constant::Package(utf8(cursor)?),
        tag => return Err(malformed(&format!("bad constant tag {}", tag))),
    })
}

fn read_attributes<'a>(cursor: &mut ByteCursor<'a>) -> Result<Vec<AttributeInfo<'a>>, Error> {
    let count = cursor.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = Utf8ConstantIndex(read_index(cursor)?);
        let length = cursor.u32()? as usize;
        attributes.push(AttributeInfo {
            name_index,
            info: cursor.bytes(length)?,
        });
    }
    Ok(attributes)
}

fn read_members<'a>(cursor: &mut ByteCursor<'a>) -> Result<Vec<MemberInfo<'a>>, Error> {
    let count = cursor.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(MemberInfo {
            access_flags: cursor.u16()?,
            name: Utf8ConstantIndex(read_index(cursor)?),
            descriptor: Utf8ConstantIndex(read_index(cursor)?),
            attributes: read_attributes(cursor)?,
        });
    }
    Ok(members)
}

fn read_bootstrap_methods(info: &[u8]) -> Result<Vec<BootstrapMethod>, Error> {
    let mut cursor = ByteCursor::new(info);
    let count = cursor.u16()?;
    let mut bootstrap_methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bootstrap_method = read_index(&mut cursor)?;
        let argument_count = cursor.u16()?;
        let bootstrap_arguments = (0..argument_count)
            .map(|_| read_index(&mut cursor))
            .collect::<Result<_, _>>()?;
        bootstrap_methods.push(BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments,
        });
    }
    Ok(bootstrap_methods)
}

/// Load or store of a local variable
///
/// `kind` is the offset of the opcode from `iload`/`istore`: `int`, `long`, `float`, `double`,
/// then reference.
fn local_insn(kind: u8, is_store: bool, var: u16) -> Instruction {
    match (is_store, kind) {
        (false, 0) => Instruction::ILoad(var),
        (false, 1) => Instruction::LLoad(var),
        (false, 2) => Instruction::FLoad(var),
        (false, 3) => Instruction::DLoad(var),
        (false, _) => Instruction::ALoad(var),
        (true, 0) => Instruction::IStore(var),
        (true, 1) => Instruction::LStore(var),
        (true, 2) => Instruction::FStore(var),
        (true, 3) => Instruction::DStore(var),
        (true, _) => Instruction::AStore(var),
    }
}

const ORD_COMPARISONS: [OrdComparison; 6] = [
    OrdComparison::EQ,
    OrdComparison::NE,
    OrdComparison::LT,
    OrdComparison::GE,
    OrdComparison::GT,
    OrdComparison::LE,
];

/// Absolute offset of a jump target
fn jump_target(pc: usize, delta: i32) -> Result<usize, Error> {
    usize::try_from(pc as i64 + delta as i64)
        .map_err(|_| malformed(&format!("jump at {} leaves the method", pc)))
}

/// Decode a code array into instructions, tagged with their offsets
fn decode_code(code: &[u8]) -> Result<Vec<(usize, Op)>, Error> {
    use Instruction as I;

    let mut cursor = ByteCursor::new(code);
    let mut ops = vec![];
    while cursor.remaining() > 0 {
        let pc = cursor.position();
        let opcode = cursor.u8()?;
        let op = match opcode {
            0x00 => Op::Insn(I::Nop),
            0x01 => Op::Insn(I::AConstNull),
            0x02 => Op::Insn(I::IConstM1),
            0x03 => Op::Insn(I::IConst0),
            0x04 => Op::Insn(I::IConst1),
            0x05 => Op::Insn(I::IConst2),
            0x06 => Op::Insn(I::IConst3),
            0x07 => Op::Insn(I::IConst4),
            0x08 => Op::Insn(I::IConst5),
            0x09 => Op::Insn(I::LConst0),
            0x0a => Op::Insn(I::LConst1),
            0x0b => Op::Insn(I::FConst0),
            0x0c => Op::Insn(I::FConst1),
            0x0d => Op::Insn(I::FConst2),
            0x0e => Op::Insn(I::DConst0),
            0x0f => Op::Insn(I::DConst1),
            0x10 => Op::Insn(I::BiPush(cursor.i8()?)),
            0x11 => Op::Insn(I::SiPush(cursor.i16()?)),
            0x12 => Op::Ldc(ConstantIndex(cursor.u8()? as u32)),
            0x13 | 0x14 => Op::Ldc(read_index(&mut cursor)?),
            0x15..=0x19 => Op::Insn(local_insn(opcode - 0x15, false, cursor.u8()? as u16)),
            0x1a..=0x2d => {
                let n = opcode - 0x1a;
                Op::Insn(local_insn(n / 4, false, (n % 4) as u16))
            }
            0x2e => Op::Insn(I::IALoad),
            0x2f => Op::Insn(I::LALoad),
            0x30 => Op::Insn(I::FALoad),
            0x31 => Op::Insn(I::DALoad),
            0x32 => Op::Insn(I::AALoad),
            0x33 => Op::Insn(I::BALoad),
            0x34 => Op::Insn(I::CALoad),
            0x35 => Op::Insn(I::SALoad),
            0x36..=0x3a => Op::Insn(local_insn(opcode - 0x36, true, cursor.u8()? as u16)),
            0x3b..=0x4e => {
                let n = opcode - 0x3b;
                Op::Insn(local_insn(n / 4, true, (n % 4) as u16))
            }
            0x4f => Op::Insn(I::IAStore),
            0x50 => Op::Insn(I::LAStore),
            0x51 => Op::Insn(I::FAStore),
            0x52 => Op::Insn(I::DAStore),
            0x53 => Op::Insn(I::AAStore),
            0x54 => Op::Insn(I::BAStore),
            0x55 => Op::Insn(I::CAStore),
            0x56 => Op::Insn(I::SAStore),
            0x57 => Op::Insn(I::Pop),
            0x58 => Op::Insn(I::Pop2),
            0x59 => Op::Insn(I::Dup),
            0x5a => Op::Insn(I::DupX1),
            0x5b => Op::Insn(I::DupX2),
            0x5c => Op::Insn(I::Dup2),
            0x5d => Op::Insn(I::Dup2X1),
            0x5e => Op::Insn(I::Dup2X2),
            0x5f => Op::Insn(I::Swap),
            0x60 => Op::Insn(I::IAdd),
            0x61 => Op::Insn(I::LAdd),
            0x62 => Op::Insn(I::FAdd),
            0x63 => Op::Insn(I::DAdd),
            0x64 => Op::Insn(I::ISub),
            0x65 => Op::Insn(I::LSub),
            0x66 => Op::Insn(I::FSub),
            0x67 => Op::Insn(I::DSub),
            0x68 => Op::Insn(I::IMul),
            0x69 => Op::Insn(I::LMul),
            0x6a => Op::Insn(I::FMul),
            0x6b => Op::Insn(I::DMul),
            0x6c => Op::Insn(I::IDiv),
            0x6d => Op::Insn(I::LDiv),
            0x6e => Op::Insn(I::FDiv),
            0x6f => Op::Insn(I::DDiv),
            0x70 => Op::Insn(I::IRem),
            0x71 => Op::Insn(I::LRem),
            0x72 => Op::Insn(I::FRem),
            0x73 => Op::Insn(I::DRem),
            0x74 => Op::Insn(I::INeg),
            0x75 => Op::Insn(I::LNeg),
            0x76 => Op::Insn(I::FNeg),
            0x77 => Op::Insn(I::DNeg),
            0x78 => Op::Insn(I::ISh(ShiftType::Left)),
            0x79 => Op::Insn(I::LSh(ShiftType::Left)),
            0x7a => Op::Insn(I::ISh(ShiftType::ArithmeticRight)),
            0x7b => Op::Insn(I::LSh(ShiftType::ArithmeticRight)),
            0x7c => Op::Insn(I::ISh(ShiftType::LogicalRight)),
            0x7d => Op::Insn(I::LSh(ShiftType::LogicalRight)),
            0x7e => Op::Insn(I::IAnd),
            0x7f => Op::Insn(I::LAnd),
            0x80 => Op::Insn(I::IOr),
            0x81 => Op::Insn(I::LOr),
            0x82 => Op::Insn(I::IXor),
            0x83 => Op::Insn(I::LXor),
            0x84 => {
                let var = cursor.u8()? as u16;
                Op::Insn(I::IInc(var, cursor.i8()? as i16))
            }
            0x85 => Op::Insn(I::I2L),
            0x86 => Op::Insn(I::I2F),
            0x87 => Op::Insn(I::I2D),
            0x88 => Op::Insn(I::L2I),
            0x89 => Op::Insn(I::L2F),
            0x8a => Op::Insn(I::L2D),
            0x8b => Op::Insn(I::F2I),
            0x8c => Op::Insn(I::F2L),
            0x8d => Op::Insn(I::F2D),
            0x8e => Op::Insn(I::D2I),
            0x8f => Op::Insn(I::D2L),
            0x90 => Op::Insn(I::D2F),
            0x91 => Op::Insn(I::I2B),
            0x92 => Op::Insn(I::I2C),
            0x93 => Op::Insn(I::I2S),
            0x94 => Op::Insn(I::LCmp),
            0x95 => Op::Insn(I::FCmp(CompareMode::L)),
            0x96 => Op::Insn(I::FCmp(CompareMode::G)),
            0x97 => Op::Insn(I::DCmp(CompareMode::L)),
            0x98 => Op::Insn(I::DCmp(CompareMode::G)),
            0x99..=0x9e => {
                let comparison = ORD_COMPARISONS[(opcode - 0x99) as usize];
                Op::Jump(JumpInsn::If(comparison), jump_target(pc, cursor.i16()? as i32)?)
            }
            0x9f..=0xa4 => {
                let comparison = ORD_COMPARISONS[(opcode - 0x9f) as usize];
                Op::Jump(JumpInsn::IfICmp(comparison), jump_target(pc, cursor.i16()? as i32)?)
            }
            0xa5 => Op::Jump(
                JumpInsn::IfACmp(EqComparison::EQ),
                jump_target(pc, cursor.i16()? as i32)?,
            ),
            0xa6 => Op::Jump(
                JumpInsn::IfACmp(EqComparison::NE),
                jump_target(pc, cursor.i16()? as i32)?,
            ),
            0xa7 => Op::Jump(JumpInsn::Goto, jump_target(pc, cursor.i16()? as i32)?),
            0xa8 => Op::Jump(JumpInsn::Jsr, jump_target(pc, cursor.i16()? as i32)?),
            0xa9 => Op::Ret(cursor.u8()? as u16),
            0xaa => {
                cursor.bytes((4 - (pc + 1) % 4) % 4)?;
                let default = jump_target(pc, cursor.i32()?)?;
                let low = cursor.i32()?;
                let high = cursor.i32()?;
                if high < low {
                    return Err(malformed(&format!("tableswitch at {} has no range", pc)));
                }
                let mut targets = vec![];
                for _ in low..=high {
                    targets.push(jump_target(pc, cursor.i32()?)?);
                }
                Op::TableSwitch {
                    low,
                    default,
                    targets,
                }
            }
            0xab => {
                cursor.bytes((4 - (pc + 1) % 4) % 4)?;
                let default = jump_target(pc, cursor.i32()?)?;
                let pair_count = cursor.i32()?;
                let mut targets = vec![];
                for _ in 0..pair_count {
                    let key = cursor.i32()?;
                    targets.push((key, jump_target(pc, cursor.i32()?)?));
                }
                Op::LookupSwitch { default, targets }
            }
            0xac..=0xb1 => Op::Return,
            0xb2 => Op::Field(FieldInsn::GetStatic, read_index(&mut cursor)?),
            0xb3 => Op::Field(FieldInsn::PutStatic, read_index(&mut cursor)?),
            0xb4 => Op::Field(FieldInsn::GetField, read_index(&mut cursor)?),
            0xb5 => Op::Field(FieldInsn::PutField, read_index(&mut cursor)?),
            0xb6 => Op::Method(MethodInsn::Virtual, read_index(&mut cursor)?),
            0xb7 => Op::Method(MethodInsn::Special, read_index(&mut cursor)?),
            0xb8 => Op::Method(MethodInsn::Static, read_index(&mut cursor)?),
            0xb9 => {
                let method = read_index(&mut cursor)?;
                cursor.bytes(2)?;
                Op::Method(MethodInsn::Interface, method)
            }
            0xba => {
                let call_site = read_index(&mut cursor)?;
                cursor.bytes(2)?;
                Op::InvokeDynamic(call_site)
            }
            0xbb => Op::Type(TypeInsn::New, ClassConstantIndex(read_index(&mut cursor)?)),
            0xbc => {
                let atype = cursor.u8()?;
                let base_type = array_type_from_code(atype)
                    .ok_or_else(|| malformed(&format!("bad newarray type {}", atype)))?;
                Op::Insn(I::NewArray(base_type))
            }
            0xbd => Op::Type(TypeInsn::ANewArray, ClassConstantIndex(read_index(&mut cursor)?)),
            0xbe => Op::Insn(I::ArrayLength),
            0xbf => Op::Throw,
            0xc0 => Op::Type(TypeInsn::CheckCast, ClassConstantIndex(read_index(&mut cursor)?)),
            0xc1 => Op::Type(TypeInsn::InstanceOf, ClassConstantIndex(read_index(&mut cursor)?)),
            0xc2 => Op::Insn(I::MonitorEnter),
            0xc3 => Op::Insn(I::MonitorExit),
            0xc4 => match cursor.u8()? {
                wide @ 0x15..=0x19 => Op::Insn(local_insn(wide - 0x15, false, cursor.u16()?)),
                wide @ 0x36..=0x3a => Op::Insn(local_insn(wide - 0x36, true, cursor.u16()?)),
                0x84 => {
                    let var = cursor.u16()?;
                    Op::Insn(I::IInc(var, cursor.i16()?))
                }
                0xa9 => Op::Ret(cursor.u16()?),
                wide => return Err(malformed(&format!("bad wide opcode {:#x} at {}", wide, pc))),
            },
            0xc5 => {
                let class = ClassConstantIndex(read_index(&mut cursor)?);
                Op::MultiANewArray(class, cursor.u8()?)
            }
            0xc6 => Op::Jump(
                JumpInsn::IfNull(EqComparison::EQ),
                jump_target(pc, cursor.i16()? as i32)?,
            ),
            0xc7 => Op::Jump(
                JumpInsn::IfNull(EqComparison::NE),
                jump_target(pc, cursor.i16()? as i32)?,
            ),
            0xc8 => Op::Jump(JumpInsn::Goto, jump_target(pc, cursor.i32()?)?),
            0xc9 => Op::Jump(JumpInsn::Jsr, jump_target(pc, cursor.i32()?)?),
            _ => return Err(malformed(&format!("bad opcode {:#x} at {}", opcode, pc))),
        };
        ops.push((pc, op));
    }
    Ok(ops)
}
