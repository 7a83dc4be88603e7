use classweave::jvm::class_graph::{ClassGraph, ClassPathHierarchy, CommonSuperclass};
use classweave::jvm::code::{Instruction, OrdComparison};
use classweave::jvm::verifier::VerificationType;
use classweave::jvm::*;
use std::fs;
use std::path::PathBuf;

fn with_subroutine(flags: ComputeFlags, graph: &ClassGraph) -> Result<Vec<u8>, Error> {
    let mut class = ClassWriter::new(flags, graph);
    class.visit(
        Version::JAVA6,
        ClassAccessFlags::PUBLIC,
        "demo/Finally",
        Some("java/lang/Object"),
        &[],
    );
    let mut code = class.visit_method(MethodAccessFlags::STATIC, "run", "()V")?;
    let subroutine = code.new_label();
    code.visit_jump_insn(JumpInsn::Jsr, subroutine);
    code.visit_return_insn();
    code.visit_label(subroutine);
    code.visit_var_insn(VarInsn::AStore, 0);
    code.visit_ret_insn(0);
    code.visit_end()?;
    class.to_bytes()
}

#[test]
fn subroutines_only_without_frames() {
    let graph = ClassGraph::with_java_classes();
    assert!(matches!(
        with_subroutine(ComputeFlags::COMPUTE_FRAMES, &graph),
        Err(Error::SubroutineWithFrames)
    ));

    let bytes = with_subroutine(ComputeFlags::COMPUTE_MAXS, &graph).unwrap();
    // jsr +4; return; astore_0; ret 0
    let code = [0xa8, 0x00, 0x04, 0xb1, 0x4b, 0xa9, 0x00];
    assert!(bytes.windows(code.len()).any(|window| window == code));
}

#[test]
fn dead_code_is_replaced() {
    let graph = ClassGraph::with_java_classes();
    let mut class = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC,
        "demo/Dead",
        Some("java/lang/Object"),
        &[],
    );
    let mut code = class.visit_method(MethodAccessFlags::STATIC, "run", "()V").unwrap();
    code.visit_return_insn();
    code.visit_int_insn(42);
    code.visit_insn(Instruction::Pop);
    code.visit_return_insn();
    code.visit_end().unwrap();
    let bytes = class.to_bytes().unwrap();

    // return; nop; nop; nop; athrow
    let code = [0xb1, 0x00, 0x00, 0x00, 0xbf];
    assert!(bytes.windows(code.len()).any(|window| window == code));

    let reader = ClassReader::parse(&bytes).unwrap();
    assert!(reader
        .constants()
        .iter()
        .any(|(_, constant)| matches!(
            constant,
            classweave::jvm::class_file::Constant::Utf8(name) if name == "java/lang/Throwable"
        )));
}

#[test]
fn standard_common_superclasses() {
    let graph = ClassGraph::with_java_classes();
    let mut supers = CommonSuperclass::new(&graph);
    assert_eq!(
        supers
            .common_super_class("java/lang/Object", "java/lang/Integer")
            .unwrap(),
        "java/lang/Object"
    );
    assert_eq!(
        supers
            .common_super_class(
                "java/lang/IndexOutOfBoundsException",
                "java/lang/AssertionError"
            )
            .unwrap(),
        "java/lang/Throwable"
    );
    assert!(matches!(
        supers.common_super_class("demo/UnknownType", "java/lang/Object"),
        Err(Error::TypeNotPresent(name)) if name == "demo/UnknownType"
    ));
}

fn empty_class(graph: &ClassGraph, name: &str, super_name: &str) -> Vec<u8> {
    let mut class = ClassWriter::new(ComputeFlags::COMPUTE_NONE, graph);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name,
        Some(super_name),
        &[],
    );
    class.to_bytes().unwrap()
}

#[test]
fn class_path_classes_are_loaded() {
    let graph = ClassGraph::with_java_classes();
    let directory: PathBuf =
        std::env::temp_dir().join(format!("classweave-frames-{}", std::process::id()));
    fs::create_dir_all(directory.join("demo")).unwrap();
    fs::write(
        directory.join("demo/Base.class"),
        empty_class(&graph, "demo/Base", "java/lang/IllegalStateException"),
    )
    .unwrap();
    fs::write(
        directory.join("demo/Derived.class"),
        empty_class(&graph, "demo/Derived", "demo/Base"),
    )
    .unwrap();

    let hierarchy = ClassPathHierarchy::new(ClassGraph::with_java_classes(), vec![directory.clone()]);
    let mut supers = CommonSuperclass::new(&hierarchy);
    assert_eq!(
        supers
            .common_super_class("demo/Derived", "java/lang/ArithmeticException")
            .unwrap(),
        "java/lang/RuntimeException"
    );
    assert_eq!(
        supers.common_super_class("demo/Base", "demo/Derived").unwrap(),
        "demo/Base"
    );

    // Frames at a join of the two loaded classes use their common superclass
    let mut class = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &hierarchy);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC,
        "demo/Pick",
        Some("java/lang/Object"),
        &[],
    );
    let mut code = class
        .visit_method(
            MethodAccessFlags::STATIC,
            "pick",
            "(ZLdemo/Derived;Ljava/lang/ArithmeticException;)Ljava/lang/Object;",
        )
        .unwrap();
    let (other, join) = (code.new_label(), code.new_label());
    code.visit_var_insn(VarInsn::ILoad, 0);
    code.visit_jump_insn(JumpInsn::If(classweave::jvm::code::OrdComparison::EQ), other);
    code.visit_var_insn(VarInsn::ALoad, 1);
    code.visit_jump_insn(JumpInsn::Goto, join);
    code.visit_label(other);
    code.visit_var_insn(VarInsn::ALoad, 2);
    code.visit_label(join);
    code.visit_return_insn();
    code.visit_end().unwrap();
    let bytes = class.to_bytes().unwrap();

    let reader = ClassReader::parse(&bytes).unwrap();
    assert!(reader
        .constants()
        .iter()
        .any(|(_, constant)| matches!(
            constant,
            classweave::jvm::class_file::Constant::Utf8(name) if name == "java/lang/RuntimeException"
        )));

    fs::remove_dir_all(&directory).unwrap();
}

/// Class with a single `static void run(int)` method written by `body`
fn single_method(
    flags: ComputeFlags,
    graph: &ClassGraph,
    body: impl FnOnce(&mut MethodWriter<'_, '_>),
) -> Vec<u8> {
    let mut class = ClassWriter::new(flags, graph);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC,
        "demo/Wide",
        Some("java/lang/Object"),
        &[],
    );
    let mut code = class
        .visit_method(MethodAccessFlags::STATIC, "run", "(I)V")
        .unwrap();
    body(&mut code);
    code.visit_end().unwrap();
    class.to_bytes().unwrap()
}

fn int_frame(code: &mut MethodWriter<'_, '_>) {
    code.visit_frame(vec![VerificationType::Integer], vec![]);
}

fn position(bytes: &[u8], needle: &[u8]) -> Option<usize> {
    bytes.windows(needle.len()).position(|window| window == needle)
}

#[test]
fn widened_conditional_with_supplied_frames() {
    let graph = ClassGraph::with_java_classes();
    let body = |code: &mut MethodWriter<'_, '_>| {
        let far = code.new_label();
        code.visit_var_insn(VarInsn::ILoad, 0);
        code.visit_jump_insn(JumpInsn::If(OrdComparison::NE), far);
        for _ in 0..12000 {
            code.visit_iinc_insn(0, 1);
        }
        code.visit_return_insn();
        code.visit_label(far);
        int_frame(code);
        code.visit_return_insn();
    };
    let supplied = single_method(ComputeFlags::COMPUTE_MAXS, &graph, body);
    let computed = single_method(ComputeFlags::COMPUTE_FRAMES, &graph, body);

    // iload_0; ifne +6; goto +8; goto_w
    assert!(position(&supplied, &[0x1a, 0x9a, 0x00, 0x06, 0xa7, 0x00, 0x08, 0xc8]).is_some());

    // The code after `goto_w` only gets entered by a jump, so it needs a frame too
    assert_eq!(supplied, computed);
}

#[test]
fn backward_goto_over_32k() {
    let graph = ClassGraph::with_java_classes();
    let body = |code: &mut MethodWriter<'_, '_>| {
        let head = code.new_label();
        code.visit_label(head);
        int_frame(code);
        for _ in 0..11000 {
            code.visit_iinc_insn(0, 1);
        }
        code.visit_jump_insn(JumpInsn::Goto, head);
    };
    let supplied = single_method(ComputeFlags::COMPUTE_MAXS, &graph, body);
    let computed = single_method(ComputeFlags::COMPUTE_FRAMES, &graph, body);

    // nop; nop; goto_w -33002
    let mut widened = vec![0x00, 0x00, 0xc8];
    widened.extend_from_slice(&(-33002i32).to_be_bytes());
    assert!(position(&supplied, &widened).is_some());
    assert_eq!(supplied, computed);
}

#[test]
fn switch_padding_survives_widening() {
    let graph = ClassGraph::with_java_classes();
    let body = |code: &mut MethodWriter<'_, '_>| {
        let (far, first, second, default) = (
            code.new_label(),
            code.new_label(),
            code.new_label(),
            code.new_label(),
        );
        code.visit_var_insn(VarInsn::ILoad, 0);
        code.visit_jump_insn(JumpInsn::If(OrdComparison::NE), far);
        code.visit_var_insn(VarInsn::ILoad, 0);
        code.visit_table_switch_insn(0, default, vec![first, second]);
        code.visit_label(first);
        int_frame(code);
        for _ in 0..12000 {
            code.visit_iinc_insn(0, 1);
        }
        code.visit_return_insn();
        code.visit_label(second);
        int_frame(code);
        code.visit_return_insn();
        code.visit_label(default);
        int_frame(code);
        code.visit_return_insn();
        code.visit_label(far);
        int_frame(code);
        code.visit_return_insn();
    };
    let supplied = single_method(ComputeFlags::COMPUTE_MAXS, &graph, body);
    let computed = single_method(ComputeFlags::COMPUTE_FRAMES, &graph, body);

    // The rewrite adds 8 bytes in front of the switch, which keeps it at 2 bytes of padding
    let start = position(&supplied, &[0x1a, 0x9a, 0x00, 0x06, 0xa7, 0x00, 0x08, 0xc8]).unwrap();
    assert_eq!(supplied[start + 12..start + 16], [0x1a, 0xaa, 0x00, 0x00]);

    // Default, low, high, then the cases, relative to the `tableswitch` at 13
    assert_eq!(supplied[start + 16..start + 20], (23i32 + 36002).to_be_bytes());
    assert_eq!(supplied[start + 20..start + 24], [0, 0, 0, 0]);
    assert_eq!(supplied[start + 24..start + 28], [0, 0, 0, 1]);
    assert_eq!(supplied[start + 28..start + 32], 23i32.to_be_bytes());
    assert_eq!(supplied[start + 32..start + 36], (23i32 + 36001).to_be_bytes());
    assert_eq!(supplied, computed);
}
