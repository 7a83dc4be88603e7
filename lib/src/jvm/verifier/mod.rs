//! Stack map frames and their inference
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! The "types" used in verification (represented using [`VerificationType`]) are slightly
//! augmented to take into account initialization and null.
//!
//! The JVM checks methods by [type-checking][0] against the frames recorded in the
//! [`crate::jvm::class_file::StackMapTable`] attribute. When frames are not supplied, they are
//! inferred here (see [`infer_frames`]): the frames reaching a block from different places are
//! unified until a fixed point is reached. Unifying two object types requires knowing the class
//! hierarchy, which is where [`crate::jvm::class_graph::CommonSuperclass`] comes in.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod engine;
mod frame;
mod types;

pub use engine::*;
pub use frame::*;
pub use types::*;
