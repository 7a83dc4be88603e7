//! Read and write JVM classes
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public final int x;
//!     public final int y;
//!
//!     public Point(int x, int y) {
//!         this.x = x;
//!         this.y = y;
//!     }
//!
//!     public int max() {
//!         return x > y ? x : y;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows. Since `max` branches, its stack map
//! frames need to be computed, which requires knowing the class hierarchy.
//!
//! ```
//! use classweave::jvm::class_graph::ClassGraph;
//! use classweave::jvm::code::OrdComparison;
//! use classweave::jvm::*;
//!
//! # fn generate_class() -> Result<Vec<u8>, Error> {
//! // Standard library types are needed to merge object types in frames
//! let graph = ClassGraph::with_java_classes();
//!
//! let mut class = ClassWriter::new(ComputeFlags::COMPUTE_FRAMES, &graph);
//! class.visit(
//!     Version::JAVA11,
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     "me/alec/Point",
//!     Some("java/lang/Object"),
//!     &[],
//! );
//! class.visit_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::FINAL, "x", "I", None)?;
//! class.visit_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::FINAL, "y", "I", None)?;
//!
//! // Constructor
//! let mut code = class.visit_method(MethodAccessFlags::PUBLIC, "<init>", "(II)V")?;
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_method_insn(MethodInsn::Special, "java/lang/Object", "<init>", "()V", false)?;
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_var_insn(VarInsn::ILoad, 1);
//! code.visit_field_insn(FieldInsn::PutField, "me/alec/Point", "x", "I")?;
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_var_insn(VarInsn::ILoad, 2);
//! code.visit_field_insn(FieldInsn::PutField, "me/alec/Point", "y", "I")?;
//! code.visit_return_insn();
//! code.visit_end()?;
//!
//! // `max` method
//! let mut code = class.visit_method(MethodAccessFlags::PUBLIC, "max", "()I")?;
//! let take_y = code.new_label();
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_field_insn(FieldInsn::GetField, "me/alec/Point", "x", "I")?;
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_field_insn(FieldInsn::GetField, "me/alec/Point", "y", "I")?;
//! code.visit_jump_insn(JumpInsn::IfICmp(OrdComparison::LE), take_y);
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_field_insn(FieldInsn::GetField, "me/alec/Point", "x", "I")?;
//! code.visit_return_insn();
//! code.visit_label(take_y);
//! code.visit_var_insn(VarInsn::ALoad, 0);
//! code.visit_field_insn(FieldInsn::GetField, "me/alec/Point", "y", "I")?;
//! code.visit_return_insn();
//! code.visit_end()?;
//!
//! // Finally, encode the class into bytes
//! class.to_bytes()
//! # }
//! # generate_class().unwrap();
//! ```
//!
//! Existing classes are decoded with [`ClassReader`] and replayed into a writer with
//! [`ClassReader::accept`], which is also how frames get recomputed for a class compiled
//! elsewhere.

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod class_graph;
mod class_reader;
mod class_writer;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;
mod version;

pub use access_flags::*;
pub use binary_format::*;
pub use class_reader::*;
pub use class_writer::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use version::*;
