use classweave::jvm::class_file::{Constant, ConstantValue, Handle, HandleKind};
use classweave::jvm::class_graph::ClassGraph;
use classweave::jvm::code::{Instruction, OrdComparison};
use classweave::jvm::*;
use classweave::settings::Settings;

/// Class exercising most of what the writer can emit
fn counter_class(graph: &ClassGraph) -> Result<Vec<u8>, Error> {
    let mut class = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, graph);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "demo/Counter",
        Some("java/lang/Object"),
        &["java/lang/Runnable", "java/lang/Comparable"],
    );

    class.visit_field(FieldAccessFlags::PRIVATE, "count", "I", None)?;
    class.visit_field(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "NAME",
        "Ljava/lang/String;",
        Some(&ConstantValue::String(String::from("counter"))),
    )?;
    class.visit_field(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "BIG",
        "J",
        Some(&ConstantValue::Long(1 << 40)),
    )?;

    // Constructor
    let mut code = class.visit_method(MethodAccessFlags::PUBLIC, "<init>", "()V")?;
    code.visit_var_insn(VarInsn::ALoad, 0);
    code.visit_method_insn(MethodInsn::Special, "java/lang/Object", "<init>", "()V", false)?;
    code.visit_return_insn();
    code.visit_end()?;

    // Increment, swallowing runtime exceptions
    let mut code = class.visit_method(MethodAccessFlags::PUBLIC, "run", "()V")?;
    let (start, end, handler, done) = (
        code.new_label(),
        code.new_label(),
        code.new_label(),
        code.new_label(),
    );
    code.visit_label(start);
    code.visit_var_insn(VarInsn::ALoad, 0);
    code.visit_insn(Instruction::Dup);
    code.visit_field_insn(FieldInsn::GetField, "demo/Counter", "count", "I")?;
    code.visit_int_insn(1);
    code.visit_insn(Instruction::IAdd);
    code.visit_field_insn(FieldInsn::PutField, "demo/Counter", "count", "I")?;
    code.visit_label(end);
    code.visit_jump_insn(JumpInsn::Goto, done);
    code.visit_label(handler);
    code.visit_var_insn(VarInsn::AStore, 1);
    code.visit_var_insn(VarInsn::ALoad, 1);
    code.visit_method_insn(
        MethodInsn::Virtual,
        "java/lang/Throwable",
        "printStackTrace",
        "()V",
        false,
    )?;
    code.visit_label(done);
    code.visit_return_insn();
    code.visit_try_catch_block(start, end, handler, Some("java/lang/RuntimeException"));
    code.visit_end()?;

    // Sign of the difference in counts
    let mut code = class.visit_method(
        MethodAccessFlags::PUBLIC,
        "compareTo",
        "(Ljava/lang/Object;)I",
    )?;
    let (non_negative, zero) = (code.new_label(), code.new_label());
    code.visit_var_insn(VarInsn::ALoad, 0);
    code.visit_field_insn(FieldInsn::GetField, "demo/Counter", "count", "I")?;
    code.visit_var_insn(VarInsn::ALoad, 1);
    code.visit_type_insn(TypeInsn::CheckCast, "demo/Counter");
    code.visit_field_insn(FieldInsn::GetField, "demo/Counter", "count", "I")?;
    code.visit_insn(Instruction::ISub);
    code.visit_var_insn(VarInsn::IStore, 2);
    code.visit_var_insn(VarInsn::ILoad, 2);
    code.visit_jump_insn(JumpInsn::If(OrdComparison::GE), non_negative);
    code.visit_int_insn(-1);
    code.visit_return_insn();
    code.visit_label(non_negative);
    code.visit_var_insn(VarInsn::ILoad, 2);
    code.visit_jump_insn(JumpInsn::If(OrdComparison::EQ), zero);
    code.visit_int_insn(1);
    code.visit_return_insn();
    code.visit_label(zero);
    code.visit_int_insn(0);
    code.visit_return_insn();
    code.visit_end()?;

    // Name small numbers
    let mut code = class.visit_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "describe",
        "(I)Ljava/lang/String;",
    )?;
    let cases = [code.new_label(), code.new_label(), code.new_label()];
    let default = code.new_label();
    code.visit_var_insn(VarInsn::ILoad, 0);
    code.visit_table_switch_insn(0, default, cases.to_vec());
    for (case, name) in cases.iter().zip(["zero", "one", "two"]) {
        code.visit_label(*case);
        code.visit_ldc_insn(&ConstantValue::String(String::from(name)))?;
        code.visit_return_insn();
    }
    code.visit_label(default);
    code.visit_insn(Instruction::AConstNull);
    code.visit_return_insn();
    code.visit_end()?;

    // Sum of a `long[]`, with a `long` local
    let mut code = class.visit_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "sum",
        "([J)J",
    )?;
    let (head, exit) = (code.new_label(), code.new_label());
    code.visit_insn(Instruction::LConst0);
    code.visit_var_insn(VarInsn::LStore, 1);
    code.visit_int_insn(0);
    code.visit_var_insn(VarInsn::IStore, 3);
    code.visit_label(head);
    code.visit_var_insn(VarInsn::ILoad, 3);
    code.visit_var_insn(VarInsn::ALoad, 0);
    code.visit_insn(Instruction::ArrayLength);
    code.visit_jump_insn(JumpInsn::IfICmp(OrdComparison::GE), exit);
    code.visit_var_insn(VarInsn::LLoad, 1);
    code.visit_var_insn(VarInsn::ALoad, 0);
    code.visit_var_insn(VarInsn::ILoad, 3);
    code.visit_insn(Instruction::LALoad);
    code.visit_insn(Instruction::LAdd);
    code.visit_var_insn(VarInsn::LStore, 1);
    code.visit_iinc_insn(3, 1);
    code.visit_jump_insn(JumpInsn::Goto, head);
    code.visit_label(exit);
    code.visit_var_insn(VarInsn::LLoad, 1);
    code.visit_return_insn();
    code.visit_end()?;

    // Wide constants
    let mut code = class.visit_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "half",
        "()D",
    )?;
    code.visit_ldc_insn(&ConstantValue::Double(0.5))?;
    code.visit_return_insn();
    code.visit_end()?;

    // Lambda through `invokedynamic`
    let mut code = class.visit_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "task",
        "()Ljava/lang/Runnable;",
    )?;
    let metafactory = Handle {
        kind: HandleKind::InvokeStatic,
        owner: String::from("java/lang/invoke/LambdaMetafactory"),
        name: String::from("metafactory"),
        descriptor: String::from(
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
        ),
        is_interface: false,
    };
    let body = Handle {
        kind: HandleKind::InvokeStatic,
        owner: String::from("demo/Counter"),
        name: String::from("half"),
        descriptor: String::from("()D"),
        is_interface: false,
    };
    code.visit_invoke_dynamic_insn(
        "run",
        "()Ljava/lang/Runnable;",
        &metafactory,
        &[
            ConstantValue::Type(String::from("()V")),
            ConstantValue::Handle(body),
            ConstantValue::Type(String::from("()V")),
        ],
    )?;
    code.visit_return_insn();
    code.visit_end()?;

    // Opaque `SourceFile` attribute
    let source_file = class.symbols().add_utf8("Counter.java");
    class.visit_attribute("SourceFile", (source_file.0 .0 as u16).to_be_bytes().to_vec());

    class.to_bytes()
}

fn reencode(bytes: &[u8], compute: ComputeFlags) -> Vec<u8> {
    let settings = Settings {
        compute,
        ..Settings::default()
    };
    settings
        .reencode(&settings.class_hierarchy(), bytes)
        .unwrap()
}

#[test]
fn compute_none_is_byte_identical() {
    let graph = ClassGraph::with_java_classes();
    let bytes = counter_class(&graph).unwrap();
    assert_eq!(reencode(&bytes, ComputeFlags::COMPUTE_NONE), bytes);
}

#[test]
fn compute_maxs_keeps_supplied_frames() {
    let graph = ClassGraph::with_java_classes();
    let bytes = counter_class(&graph).unwrap();
    assert_eq!(reencode(&bytes, ComputeFlags::COMPUTE_MAXS), bytes);
}

#[test]
fn recomputed_frames_match() {
    let graph = ClassGraph::with_java_classes();
    let bytes = counter_class(&graph).unwrap();
    assert_eq!(reencode(&bytes, ComputeFlags::COMPUTE_FRAMES), bytes);
}

#[test]
fn header_survives_a_fresh_pool() {
    let graph = ClassGraph::with_java_classes();
    let bytes = counter_class(&graph).unwrap();
    let reader = ClassReader::parse(&bytes).unwrap();

    let mut writer = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
    reader.accept(&mut writer).unwrap();
    let copy = writer.to_bytes().unwrap();
    let copy_reader = ClassReader::parse(&copy).unwrap();

    assert_eq!(copy_reader.class_name().unwrap(), "demo/Counter");
    assert_eq!(copy_reader.super_name().unwrap(), Some("java/lang/Object"));
    assert_eq!(
        copy_reader.interface_names().unwrap(),
        vec!["java/lang/Runnable", "java/lang/Comparable"]
    );
    assert_eq!(copy_reader.constants().bootstrap_methods().len(), 1);

    // `SourceFile` only survives when the pool is shared
    assert!(copy.len() < bytes.len());
    let has_source_file = copy_reader
        .constants()
        .iter()
        .any(|(_, constant)| matches!(constant, Constant::Utf8(name) if name == "SourceFile"));
    assert!(!has_source_file);
}

#[test]
fn reencoding_is_stable() {
    let graph = ClassGraph::with_java_classes();
    let bytes = counter_class(&graph).unwrap();
    let once = reencode(&bytes, ComputeFlags::COMPUTE_FRAMES);
    let twice = reencode(&once, ComputeFlags::COMPUTE_FRAMES);
    assert_eq!(once, twice);
}
