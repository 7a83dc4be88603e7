use super::{BinaryName, ClassAccessFlags, ClassData, ClassGraph};

const CLASS: ClassAccessFlags = ClassAccessFlags::PUBLIC.union(ClassAccessFlags::SUPER);
const FINAL_CLASS: ClassAccessFlags = CLASS.union(ClassAccessFlags::FINAL);
const INTERFACE: ClassAccessFlags = ClassAccessFlags::PUBLIC
    .union(ClassAccessFlags::INTERFACE)
    .union(ClassAccessFlags::ABSTRACT);

/// Standard classes, listed after their superclass: `(name, superclass, access, interfaces)`
const JAVA_CLASSES: &[(BinaryName, BinaryName, ClassAccessFlags, &[BinaryName])] = &[
    // Interfaces
    (BinaryName::CHARSEQUENCE, BinaryName::OBJECT, INTERFACE, &[]),
    (BinaryName::COMPARABLE, BinaryName::OBJECT, INTERFACE, &[]),
    (BinaryName::RUNNABLE, BinaryName::OBJECT, INTERFACE, &[]),
    (BinaryName::ITERABLE, BinaryName::OBJECT, INTERFACE, &[]),
    (BinaryName::CLONEABLE, BinaryName::OBJECT, INTERFACE, &[]),
    (BinaryName::SERIALIZABLE, BinaryName::OBJECT, INTERFACE, &[]),
    // Core classes
    (
        BinaryName::STRING,
        BinaryName::OBJECT,
        FINAL_CLASS,
        &[
            BinaryName::SERIALIZABLE,
            BinaryName::COMPARABLE,
            BinaryName::CHARSEQUENCE,
        ],
    ),
    (BinaryName::CLASS, BinaryName::OBJECT, FINAL_CLASS, &[BinaryName::SERIALIZABLE]),
    (BinaryName::NUMBER, BinaryName::OBJECT, CLASS, &[BinaryName::SERIALIZABLE]),
    (BinaryName::INTEGER, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::LONG, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::FLOAT, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::DOUBLE, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::SHORT, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::BYTE, BinaryName::NUMBER, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::BOOLEAN, BinaryName::OBJECT, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::CHARACTER, BinaryName::OBJECT, FINAL_CLASS, &[BinaryName::COMPARABLE]),
    (BinaryName::METHODHANDLE, BinaryName::OBJECT, CLASS, &[]),
    (BinaryName::METHODTYPE, BinaryName::OBJECT, FINAL_CLASS, &[BinaryName::SERIALIZABLE]),
    // Throwables
    (BinaryName::THROWABLE, BinaryName::OBJECT, CLASS, &[BinaryName::SERIALIZABLE]),
    (BinaryName::ERROR, BinaryName::THROWABLE, CLASS, &[]),
    (BinaryName::ASSERTIONERROR, BinaryName::ERROR, CLASS, &[]),
    (BinaryName::LINKAGEERROR, BinaryName::ERROR, CLASS, &[]),
    (BinaryName::EXCEPTION, BinaryName::THROWABLE, CLASS, &[]),
    (BinaryName::RUNTIMEEXCEPTION, BinaryName::EXCEPTION, CLASS, &[]),
    (BinaryName::ARITHMETICEXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (BinaryName::CLASSCASTEXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (BinaryName::ILLEGALARGUMENTEXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (BinaryName::ILLEGALSTATEEXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (BinaryName::NULLPOINTEREXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (BinaryName::INDEXOUTOFBOUNDSEXCEPTION, BinaryName::RUNTIMEEXCEPTION, CLASS, &[]),
    (
        BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION,
        BinaryName::INDEXOUTOFBOUNDSEXCEPTION,
        CLASS,
        &[],
    ),
    (
        BinaryName::STRINGINDEXOUTOFBOUNDSEXCEPTION,
        BinaryName::INDEXOUTOFBOUNDSEXCEPTION,
        CLASS,
        &[],
    ),
];

/// Add the classes inside `java.lang.*` (and `java.io.Serializable`) to the graph
pub fn add_to_graph(class_graph: &ClassGraph) {
    class_graph.add_class(ClassData {
        name: BinaryName::OBJECT,
        superclass: None,
        interfaces: vec![],
        access_flags: CLASS,
    });

    for (name, superclass, access_flags, interfaces) in JAVA_CLASSES {
        class_graph.add_class(ClassData {
            name: name.clone(),
            superclass: Some(superclass.clone()),
            interfaces: interfaces.to_vec(),
            access_flags: *access_flags,
        });
    }
}
