//! Bytecode representation and encoding
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. Method bodies are essentially just a CFG of basic blocks, with an
//! operand stack and a stack of local variables. We split up the [list of bytecode
//! instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions (the body of the basic blocks)
//!   - [`BranchInstruction`] for instructions that may branch (the end of the basic blocks)
//!
//! A method writer records a flat stream of [`CodeItem`]s. That stream gets split into a
//! [`ControlFlowGraph`] of [`BasicBlock`]s, where jump targets are block indices instead of
//! labels.
//!
//! ### Encoding
//!
//! [`MethodCode::assemble`] turns the recorded stream into a `Code` attribute: it computes the
//! maximum stack and locals ([`MaxSizes`]), infers stack map frames (see
//! [`crate::jvm::verifier`]), replaces unreachable code, widens jumps that don't fit in 16 bits
//! (see [`jump_encoding`]), and finally lays out the bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod basic_block;
mod code;
mod instruction;
pub mod jump_encoding;
mod label;
mod max_size;

pub use basic_block::*;
pub use code::*;
pub use instruction::*;
pub use label::*;
pub use max_size::*;
