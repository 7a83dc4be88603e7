use classweave::jvm::class_file::{ConstantValue, SymbolTable};
use classweave::jvm::class_graph::ClassGraph;
use classweave::jvm::*;
use std::collections::HashSet;

#[test]
fn distinct_values_get_distinct_indices() {
    let values = vec![
        ConstantValue::Integer(7),
        ConstantValue::String(String::from("7")),
        ConstantValue::Long(7),
        ConstantValue::Float(7.0),
        ConstantValue::Double(7.0),
        ConstantValue::Type(String::from("Ljava/lang/String;")),
        ConstantValue::Type(String::from("[I")),
        ConstantValue::Type(String::from("(I)V")),
        ConstantValue::Float(-0.0),
        ConstantValue::Float(0.0),
    ];

    // Same requests in a different order, with repeats
    let mut forward = SymbolTable::new();
    let mut backward = SymbolTable::new();
    let mut forward_indices = HashSet::new();
    let mut backward_indices = HashSet::new();
    for _ in 0..3 {
        for value in &values {
            forward_indices.insert(forward.add_constant(value).unwrap());
        }
        for value in values.iter().rev() {
            backward_indices.insert(backward.add_constant(value).unwrap());
        }
    }
    assert_eq!(forward_indices.len(), values.len());
    assert_eq!(backward_indices.len(), values.len());
    assert_eq!(forward.len(), backward.len());
}

#[test]
fn narrow_integers_share_int_constants() {
    let mut table = SymbolTable::new();
    let int = table.add_constant(&ConstantValue::Integer(65)).unwrap();
    assert_eq!(table.add_constant(&ConstantValue::Char(65)).unwrap(), int);
    assert_eq!(table.add_constant(&ConstantValue::Short(65)).unwrap(), int);
    assert_eq!(table.add_constant(&ConstantValue::Byte(65)).unwrap(), int);

    let one = table.add_constant(&ConstantValue::Integer(1)).unwrap();
    assert_eq!(table.add_constant(&ConstantValue::Boolean(true)).unwrap(), one);
}

#[test]
fn primitive_type_constants_are_rejected() {
    let mut table = SymbolTable::new();
    table.add_integer(1);
    let before = table.len();
    assert!(matches!(
        table.add_constant(&ConstantValue::Type(String::from("I"))),
        Err(Error::InvalidConstant(_))
    ));
    assert_eq!(table.len(), before);
}

fn filled_class(graph: &ClassGraph, entries: usize) -> Result<Vec<u8>, Error> {
    let mut class = ClassWriter::new(ComputeFlags::COMPUTE_NONE, graph);
    class.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC,
        "demo/Full",
        Some("java/lang/Object"),
        &[],
    );
    let mut next = 0;
    while class.symbols().len() < entries {
        class.symbols().add_integer(next);
        next += 1;
    }
    class.to_bytes()
}

#[test]
fn capacity_boundary() {
    let graph = ClassGraph::with_java_classes();

    let bytes = filled_class(&graph, 65534).unwrap();
    assert_eq!(&bytes[8..10], &[0xff, 0xff]);

    // Adding past the limit only fails once the class is written
    assert!(matches!(
        filled_class(&graph, 65535),
        Err(Error::ConstantPoolOverflow { slots: 65535 })
    ));
}

#[test]
fn wide_constants_take_two_slots() {
    let mut table = SymbolTable::new();
    table.add_long(1);
    table.add_double(2.0);
    table.add_integer(3);
    assert_eq!(table.len(), 3);
    assert_eq!(table.constant_pool_count(), 6);
}
