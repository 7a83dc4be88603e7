use crate::jvm::class_file::{
    Attribute, AttributeLike, BootstrapMethods, ClassConstantIndex, ClassFile, ConstantValue,
    ConstantValueAttribute, Field, Handle, Method, SymbolTable, Utf8ConstantIndex,
};
use crate::jvm::class_graph::{ClassHierarchy, CommonSuperclass};
use crate::jvm::code::{
    field_type, method_descriptor, BranchInstruction, CodeItem, EqComparison, Handler,
    Instruction, InvokeType, Label, MaxSizes, MethodCode, MethodContext, OrdComparison,
};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::{
    BaseType, ClassAccessFlags, ClassReader, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, Name, Serialize, UnqualifiedName, Version,
};
use crate::util::Width;
use bitflags::bitflags;

bitflags! {
    /// What a [`ClassWriter`] computes on its own instead of taking it from the caller
    pub struct ComputeFlags: u8 {
        /// Use the maximums and frames visited by the caller
        const COMPUTE_NONE = 0x00;

        /// Compute the maximum stack and locals of every method
        const COMPUTE_MAXS = 0x01;

        /// Compute the stack map frames (and, since frames need them, the maximums)
        const COMPUTE_FRAMES = 0x03;
    }
}

/// Encoding session for one class
///
/// Members are visited one after another and encoded as soon as they are complete, interning
/// their constants into the symbol table owned by the writer. The class hierarchy is only
/// consulted when frames are computed, and answers are cached for the life of the writer.
pub struct ClassWriter<'h> {
    flags: ComputeFlags,
    symbols: SymbolTable,
    supers: CommonSuperclass<'h>,

    /// Class file this writer's constant pool was copied from
    source: Option<&'h [u8]>,

    version: Version,
    access_flags: ClassAccessFlags,
    this_class: Option<(String, ClassConstantIndex)>,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    attributes: Vec<Attribute>,

    /// Position of the `BootstrapMethods` attribute among `attributes`, if it was visited
    bootstrap_methods_position: Option<usize>,
}

impl<'h> ClassWriter<'h> {
    pub fn new(flags: ComputeFlags, hierarchy: &'h dyn ClassHierarchy) -> ClassWriter<'h> {
        ClassWriter::with_symbols(flags, hierarchy, SymbolTable::new(), None)
    }

    /// Make a writer whose constant pool starts out as a copy of the pool of a decoded class
    ///
    /// Constants keep their indices. When this writer is then passed to [`ClassReader::accept`]
    /// with [`ComputeFlags::COMPUTE_NONE`], methods are copied without being decoded, so the
    /// output is identical to the input.
    pub fn from_reader(
        reader: &ClassReader<'h>,
        flags: ComputeFlags,
        hierarchy: &'h dyn ClassHierarchy,
    ) -> ClassWriter<'h> {
        let symbols = SymbolTable::from_existing(
            reader.constants().iter().map(|(_, constant)| constant.clone()),
            reader.constants().bootstrap_methods().to_vec(),
        );
        ClassWriter::with_symbols(flags, hierarchy, symbols, Some(reader.bytes()))
    }

    fn with_symbols(
        flags: ComputeFlags,
        hierarchy: &'h dyn ClassHierarchy,
        symbols: SymbolTable,
        source: Option<&'h [u8]>,
    ) -> ClassWriter<'h> {
        ClassWriter {
            flags,
            symbols,
            supers: CommonSuperclass::new(hierarchy),
            source,
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::empty(),
            this_class: None,
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            bootstrap_methods_position: None,
        }
    }

    pub fn flags(&self) -> ComputeFlags {
        self.flags
    }

    /// Constant pool of the class being written
    pub fn symbols(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Was the constant pool copied from exactly these class file bytes?
    pub(crate) fn is_copy_of(&self, bytes: &[u8]) -> bool {
        self.source
            .map_or(false, |source| std::ptr::eq(source, bytes))
    }

    /// Class header
    ///
    /// `super_name` is only `None` for `java/lang/Object`.
    pub fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) {
        self.version = version;
        self.access_flags = access_flags;
        let this_class = self.symbols.add_class(name);
        self.this_class = Some((String::from(name), this_class));
        self.super_class = super_name.map(|super_name| self.symbols.add_class(super_name));
        self.interfaces = interfaces
            .iter()
            .map(|interface| self.symbols.add_class(interface))
            .collect();
    }

    /// Add a field, with an optional `ConstantValue`
    pub fn visit_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        value: Option<&ConstantValue>,
    ) -> Result<(), Error> {
        UnqualifiedName::check_valid(name).map_err(Error::InvalidName)?;
        field_type(descriptor)?;
        let mut attributes = vec![];
        if let Some(value) = value {
            let value = self.symbols.add_constant(value)?;
            attributes.push(self.symbols.add_attribute(&ConstantValueAttribute(value))?);
        }
        let name_index = self.symbols.add_utf8(name);
        let descriptor_index = self.symbols.add_utf8(descriptor);
        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Start a method
    ///
    /// The method is only added to the class once [`MethodWriter::visit_end`] is called.
    pub fn visit_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodWriter<'_, 'h>, Error> {
        let this_class = match &self.this_class {
            Some((this_class, _)) => this_class.clone(),
            None => return Err(missing_header()),
        };
        UnqualifiedName::check_valid(name).map_err(Error::InvalidName)?;
        let context = MethodContext {
            this_class,
            name: String::from(name),
            descriptor: method_descriptor(descriptor)?,
            is_static: access_flags.contains(MethodAccessFlags::STATIC),
        };
        let name_index = self.symbols.add_utf8(name);
        let descriptor_index = self.symbols.add_utf8(descriptor);
        log::debug!("Encoding method {}{}", name, descriptor);
        Ok(MethodWriter {
            class: self,
            access_flags,
            name_index,
            descriptor_index,
            context,
            code: MethodCode::default(),
            has_code: false,
            next_label: Label(0),
            attributes: vec![],
        })
    }

    /// Add a class attribute that is carried through as it is
    ///
    /// The contents are not interpreted, so any constant indices in them must already be valid in
    /// this writer's pool. A `BootstrapMethods` attribute only marks where the bootstrap method
    /// table goes: its contents always come from the symbol table.
    pub fn visit_attribute(&mut self, name: &str, info: Vec<u8>) {
        if name == BootstrapMethods::NAME {
            self.bootstrap_methods_position = Some(self.attributes.len());
            return;
        }
        let name_index = self.symbols.add_utf8(name);
        self.attributes.push(Attribute { name_index, info });
    }

    /// Add a field exactly as it was decoded (the constant pool must be shared)
    pub(crate) fn copy_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Add a method exactly as it was decoded (the constant pool must be shared)
    pub(crate) fn copy_method(&mut self, method: Method) {
        self.methods.push(method);
    }

    /// Encode the class
    ///
    /// The constant pool size is only checked here, after every member has been added.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, Error> {
        let (_, this_class) = self.this_class.ok_or_else(missing_header)?;

        let mut attributes = self.attributes;
        if !self.symbols.bootstrap_methods().is_empty() {
            let mut info = vec![];
            BootstrapMethods(self.symbols.bootstrap_methods()).serialize(&mut info)?;
            let name_index = self.symbols.add_utf8(BootstrapMethods::NAME);
            let position = self
                .bootstrap_methods_position
                .unwrap_or(0)
                .min(attributes.len());
            attributes.insert(position, Attribute { name_index, info });
        }

        self.symbols.check_capacity()?;

        let class_file = ClassFile {
            version: self.version,
            constants: self.symbols,
            access_flags: self.access_flags,
            this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes,
        };
        let mut bytes = vec![];
        class_file.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

fn missing_header() -> Error {
    Error::MalformedClass(String::from("class header was never visited"))
}

/// Local variable instructions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarInsn {
    ILoad,
    LLoad,
    FLoad,
    DLoad,
    ALoad,
    IStore,
    LStore,
    FStore,
    DStore,
    AStore,
}

/// Field access instructions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldInsn {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

/// Method call instructions (except `invokedynamic`)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MethodInsn {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Instructions taking a class operand
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeInsn {
    New,
    ANewArray,
    CheckCast,
    InstanceOf,
}

/// Instructions jumping to a single label
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JumpInsn {
    /// Compare an `int` against zero
    If(OrdComparison),

    /// Compare two `int`s
    IfICmp(OrdComparison),

    /// Compare two references
    IfACmp(EqComparison),

    /// Compare a reference against `null`
    IfNull(EqComparison),

    Goto,

    /// Jump to a subroutine (not allowed when computing frames)
    Jsr,
}

/// Encoder for one method, handed out by [`ClassWriter::visit_method`]
///
/// Instructions are only recorded as they are visited: all of the layout happens in
/// [`MethodWriter::visit_end`]. Labels can therefore be used before they are placed.
pub struct MethodWriter<'w, 'h> {
    class: &'w mut ClassWriter<'h>,
    access_flags: MethodAccessFlags,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    context: MethodContext,
    code: MethodCode,

    /// Abstract and native methods have no code at all
    has_code: bool,

    next_label: Label,
    attributes: Vec<Attribute>,
}

impl<'w, 'h> MethodWriter<'w, 'h> {
    /// Get a fresh label, to be placed later with [`MethodWriter::visit_label`]
    pub fn new_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label = label.next();
        label
    }

    pub fn visit_label(&mut self, label: Label) {
        self.push(CodeItem::Label(label));
    }

    /// Straight-line instruction whose operands are already resolved
    pub fn visit_insn(&mut self, insn: Instruction) {
        self.push(CodeItem::Instruction(insn));
    }

    pub fn visit_var_insn(&mut self, insn: VarInsn, var: u16) {
        self.visit_insn(match insn {
            VarInsn::ILoad => Instruction::ILoad(var),
            VarInsn::LLoad => Instruction::LLoad(var),
            VarInsn::FLoad => Instruction::FLoad(var),
            VarInsn::DLoad => Instruction::DLoad(var),
            VarInsn::ALoad => Instruction::ALoad(var),
            VarInsn::IStore => Instruction::IStore(var),
            VarInsn::LStore => Instruction::LStore(var),
            VarInsn::FStore => Instruction::FStore(var),
            VarInsn::DStore => Instruction::DStore(var),
            VarInsn::AStore => Instruction::AStore(var),
        });
    }

    pub fn visit_iinc_insn(&mut self, var: u16, increment: i16) {
        self.visit_insn(Instruction::IInc(var, increment));
    }

    /// Push an `int` using the shortest available instruction
    pub fn visit_int_insn(&mut self, value: i32) {
        let insn = match value {
            -1 => Instruction::IConstM1,
            0 => Instruction::IConst0,
            1 => Instruction::IConst1,
            2 => Instruction::IConst2,
            3 => Instruction::IConst3,
            4 => Instruction::IConst4,
            5 => Instruction::IConst5,
            _ => match (i8::try_from(value), i16::try_from(value)) {
                (Ok(byte), _) => Instruction::BiPush(byte),
                (_, Ok(short)) => Instruction::SiPush(short),
                _ => Instruction::Ldc(self.class.symbols.add_integer(value)),
            },
        };
        self.visit_insn(insn);
    }

    pub fn visit_field_insn(
        &mut self,
        insn: FieldInsn,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        field_type(descriptor)?;
        let field = self.class.symbols.add_field_ref(owner, name, descriptor);
        self.visit_insn(match insn {
            FieldInsn::GetStatic => Instruction::GetStatic(field),
            FieldInsn::PutStatic => Instruction::PutStatic(field),
            FieldInsn::GetField => Instruction::GetField(field),
            FieldInsn::PutField => Instruction::PutField(field),
        });
        Ok(())
    }

    /// `is_interface` is whether `owner` is an interface (not whether the call is `invokeinterface`)
    pub fn visit_method_insn(
        &mut self,
        insn: MethodInsn,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        let parsed = method_descriptor(descriptor)?;
        let method = self
            .class
            .symbols
            .add_method_ref(owner, name, descriptor, is_interface);
        let invoke_type = match insn {
            MethodInsn::Virtual => InvokeType::Virtual,
            MethodInsn::Special => InvokeType::Special,
            MethodInsn::Static => InvokeType::Static,
            MethodInsn::Interface => {
                let count = u8::try_from(parsed.parameter_length(true))
                    .map_err(|_| Error::InvalidDescriptor(String::from(descriptor)))?;
                InvokeType::Interface(count)
            }
        };
        self.visit_insn(Instruction::Invoke(invoke_type, method));
        Ok(())
    }

    /// `class` is an internal name, or an array descriptor
    pub fn visit_type_insn(&mut self, insn: TypeInsn, class: &str) {
        let class = self.class.symbols.add_class(class);
        self.visit_insn(match insn {
            TypeInsn::New => Instruction::New(class),
            TypeInsn::ANewArray => Instruction::ANewArray(class),
            TypeInsn::CheckCast => Instruction::CheckCast(class),
            TypeInsn::InstanceOf => Instruction::InstanceOf(class),
        });
    }

    /// Load a constant (`ldc`, `ldc_w`, or `ldc2_w` depending on the constant)
    pub fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        let is_wide = match value {
            ConstantValue::Long(_) | ConstantValue::Double(_) => true,
            ConstantValue::Dynamic(dynamic) => field_type(&dynamic.descriptor)?.width() == 2,
            _ => false,
        };
        let constant = self.class.symbols.add_constant(value)?;
        self.visit_insn(if is_wide {
            Instruction::Ldc2(constant)
        } else {
            Instruction::Ldc(constant)
        });
        Ok(())
    }

    pub fn visit_multi_anew_array_insn(
        &mut self,
        descriptor: &str,
        dimensions: u8,
    ) -> Result<(), Error> {
        field_type(descriptor)?;
        let class = self.class.symbols.add_class(descriptor);
        self.visit_insn(Instruction::MultiANewArray(class, dimensions));
        Ok(())
    }

    pub fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        method_descriptor(descriptor)?;
        let call_site = self
            .class
            .symbols
            .add_invoke_dynamic(name, descriptor, bootstrap, arguments)?;
        self.visit_insn(Instruction::InvokeDynamic(call_site));
        Ok(())
    }

    pub fn visit_jump_insn(&mut self, insn: JumpInsn, target: Label) {
        self.push(CodeItem::Branch(match insn {
            JumpInsn::If(op) => BranchInstruction::If(op, target, ()),
            JumpInsn::IfICmp(op) => BranchInstruction::IfICmp(op, target, ()),
            JumpInsn::IfACmp(op) => BranchInstruction::IfACmp(op, target, ()),
            JumpInsn::IfNull(op) => BranchInstruction::IfNull(op, target, ()),
            JumpInsn::Goto => BranchInstruction::Goto(target),
            JumpInsn::Jsr => BranchInstruction::Jsr(target, ()),
        }));
    }

    /// `tableswitch` where `targets[i]` is the target for `low + i`
    pub fn visit_table_switch_insn(&mut self, low: i32, default: Label, targets: Vec<Label>) {
        self.push(CodeItem::Branch(BranchInstruction::TableSwitch {
            padding: 0,
            default,
            low,
            targets,
        }));
    }

    /// `lookupswitch` (the keys don't need to be sorted)
    pub fn visit_lookup_switch_insn(&mut self, default: Label, mut targets: Vec<(i32, Label)>) {
        targets.sort_by_key(|(key, _)| *key);
        self.push(CodeItem::Branch(BranchInstruction::LookupSwitch {
            padding: 0,
            default,
            targets,
        }));
    }

    /// Return from the method, with the return instruction matching its descriptor
    pub fn visit_return_insn(&mut self) {
        let insn = match &self.context.descriptor.return_type {
            None => BranchInstruction::Return,
            Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
            Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
            Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
            Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
            Some(FieldType::Base(_)) => BranchInstruction::IReturn,
        };
        self.push(CodeItem::Branch(insn));
    }

    pub fn visit_throw_insn(&mut self) {
        self.push(CodeItem::Branch(BranchInstruction::AThrow));
    }

    /// Return from a subroutine (not allowed when computing frames)
    pub fn visit_ret_insn(&mut self, var: u16) {
        self.push(CodeItem::Branch(BranchInstruction::Ret(var)));
    }

    /// Exception handler for `[start, end)`
    ///
    /// Handlers are tried in the order they are visited. `catch_type` of `None` catches
    /// everything.
    pub fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
        let catch_type = catch_type.map(|class| self.class.symbols.add_class(class));
        self.has_code = true;
        self.code.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    /// Frame at the current position, with locals listed by value (as in the class file)
    ///
    /// Frames are only used when they are not computed.
    pub fn visit_frame(
        &mut self,
        locals: Vec<VerificationType<String, Label>>,
        stack: Vec<VerificationType<String, Label>>,
    ) {
        self.push(CodeItem::Frame(Frame::from_entries(locals, stack)));
    }

    /// Maximums, only used when they are not computed
    pub fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) {
        self.code.max_sizes = Some(MaxSizes {
            max_stack,
            max_locals,
        });
    }

    /// Method attribute carried through as it is (see [`ClassWriter::visit_attribute`])
    pub fn visit_attribute(&mut self, name: &str, info: Vec<u8>) {
        let name_index = self.class.symbols.add_utf8(name);
        self.attributes.push(Attribute { name_index, info });
    }

    /// Encode the method and add it to the class
    pub fn visit_end(self) -> Result<(), Error> {
        let MethodWriter {
            class,
            access_flags,
            name_index,
            descriptor_index,
            context,
            code,
            has_code,
            attributes: extra_attributes,
            ..
        } = self;

        let mut attributes = vec![];
        if has_code {
            let code = code.assemble(
                &context,
                class.flags,
                class.version.supports_frames(),
                &mut class.symbols,
                &mut class.supers,
            )?;
            log::debug!(
                "Encoded method {} ({} bytes of code, max stack {}, max locals {})",
                context.name,
                code.code_array.0.len(),
                code.max_stack,
                code.max_locals
            );
            attributes.push(class.symbols.add_attribute(&code)?);
        }
        attributes.extend(extra_attributes);

        class.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    fn push(&mut self, item: CodeItem) {
        self.has_code = true;
        self.code.items.push(item);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::HandleKind;
    use crate::jvm::class_graph::ClassGraph;

    fn header(writer: &mut ClassWriter) {
        writer.visit(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "me/Test",
            Some("java/lang/Object"),
            &[],
        );
    }

    fn metafactory() -> Handle {
        Handle {
            kind: HandleKind::InvokeStatic,
            owner: String::from("java/lang/invoke/LambdaMetafactory"),
            name: String::from("metafactory"),
            descriptor: String::from("(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;"),
            is_interface: false,
        }
    }

    #[test]
    fn compute_flags() {
        assert!(ComputeFlags::COMPUTE_FRAMES.contains(ComputeFlags::COMPUTE_MAXS));
        assert!(!ComputeFlags::COMPUTE_MAXS.contains(ComputeFlags::COMPUTE_FRAMES));
        assert!(ComputeFlags::COMPUTE_NONE.is_empty());
    }

    #[test]
    fn empty_class_layout() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
        header(&mut writer);
        let bytes = writer.to_bytes().unwrap();

        let mut expected = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0, 5];
        expected.extend([1, 0, 7]);
        expected.extend(b"me/Test");
        expected.extend([7, 0, 1, 1, 0, 16]);
        expected.extend(b"java/lang/Object");
        expected.extend([7, 0, 3]);
        expected.extend([0, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn methods_need_a_header() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_NONE, &graph);
        assert!(matches!(
            writer.visit_method(MethodAccessFlags::PUBLIC, "run", "()V"),
            Err(Error::MalformedClass(_))
        ));
        assert!(matches!(writer.to_bytes(), Err(Error::MalformedClass(_))));
    }

    #[test]
    fn bad_descriptors_are_rejected() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_NONE, &graph);
        header(&mut writer);
        assert!(matches!(
            writer.visit_field(FieldAccessFlags::PUBLIC, "x", "Q", None),
            Err(Error::InvalidDescriptor(_))
        ));
        assert!(matches!(
            writer.visit_method(MethodAccessFlags::PUBLIC, "run", "(I"),
            Err(Error::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn bad_names_are_rejected() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_NONE, &graph);
        header(&mut writer);
        assert!(matches!(
            writer.visit_field(FieldAccessFlags::PUBLIC, "a.b", "I", None),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            writer.visit_method(MethodAccessFlags::PUBLIC, "<run>", "()V"),
            Err(Error::InvalidName(_))
        ));
        assert!(writer
            .visit_method(MethodAccessFlags::STATIC, "<clinit>", "()V")
            .is_ok());
    }

    #[test]
    fn return_matches_descriptor() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_MAXS, &graph);
        header(&mut writer);
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "f", "()J")
            .unwrap();
        method.visit_insn(Instruction::LConst1);
        method.visit_return_insn();
        assert_eq!(
            method.code.items.last(),
            Some(&CodeItem::Branch(BranchInstruction::LReturn))
        );
        method.visit_end().unwrap();
        assert_eq!(writer.methods.len(), 1);
    }

    #[test]
    fn shortest_int_push() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_MAXS, &graph);
        header(&mut writer);
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "f", "()V")
            .unwrap();
        for value in [-1, 5, 6, -129, 40000] {
            method.visit_int_insn(value);
        }
        let pushes: Vec<Instruction> = method
            .code
            .items
            .iter()
            .filter_map(|item| match item {
                CodeItem::Instruction(insn) => Some(insn.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(pushes[0], Instruction::IConstM1);
        assert_eq!(pushes[1], Instruction::IConst5);
        assert_eq!(pushes[2], Instruction::BiPush(6));
        assert_eq!(pushes[3], Instruction::SiPush(-129));
        assert!(matches!(pushes[4], Instruction::Ldc(_)));
    }

    #[test]
    fn interface_call_counts_receiver() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_MAXS, &graph);
        header(&mut writer);
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "f", "(Ljava/util/Map;)V")
            .unwrap();
        method.visit_var_insn(VarInsn::ALoad, 0);
        method.visit_insn(Instruction::LConst0);
        method.visit_insn(Instruction::AConstNull);
        method
            .visit_method_insn(
                MethodInsn::Interface,
                "java/util/Map",
                "put",
                "(JLjava/lang/Object;)Ljava/lang/Object;",
                true,
            )
            .unwrap();
        assert!(matches!(
            method.code.items.last(),
            Some(CodeItem::Instruction(Instruction::Invoke(
                InvokeType::Interface(4),
                _
            )))
        ));
    }

    #[test]
    fn shared_bootstrap_methods() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
        header(&mut writer);
        let arguments = vec![
            ConstantValue::Type(String::from("()V")),
            ConstantValue::Type(String::from("()V")),
        ];
        let mut method = writer
            .visit_method(MethodAccessFlags::STATIC, "f", "()V")
            .unwrap();
        for _ in 0..2 {
            method
                .visit_invoke_dynamic_insn("run", "()Ljava/lang/Runnable;", &metafactory(), &arguments)
                .unwrap();
            method.visit_insn(Instruction::Pop);
        }
        method.visit_return_insn();
        method.visit_end().unwrap();
        assert_eq!(writer.symbols().bootstrap_methods().len(), 1);

        writer.visit_attribute("Custom", vec![1, 2]);
        let bytes = writer.to_bytes().unwrap();

        // Two class attributes: `BootstrapMethods` (one entry, two equal arguments) comes first
        let tail = &bytes[bytes.len() - 26..];
        assert_eq!(&tail[..2], &[0, 2]);
        assert_eq!(&tail[4..10], &[0, 0, 0, 10, 0, 1]);
        assert_eq!(&tail[12..14], &[0, 2]);
        assert_eq!(&tail[14..16], &tail[16..18]);
        assert_eq!(&tail[20..], &[0, 0, 0, 2, 1, 2]);
    }

    #[test]
    fn abstract_methods_have_no_code() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
        header(&mut writer);
        writer
            .visit_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT, "f", "()V")
            .unwrap()
            .visit_end()
            .unwrap();
        assert!(writer.methods[0].attributes.is_empty());
    }

    #[test]
    fn field_constant_values() {
        let graph = ClassGraph::with_java_classes();
        let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_NONE, &graph);
        header(&mut writer);
        writer
            .visit_field(
                FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                "MAX",
                "I",
                Some(&ConstantValue::Integer(7)),
            )
            .unwrap();
        let field = &writer.fields[0];
        assert_eq!(field.attributes.len(), 1);
        let value = writer.symbols.add_integer(7);
        assert_eq!(field.attributes[0].info, vec![0, value.0 as u8]);
    }
}
