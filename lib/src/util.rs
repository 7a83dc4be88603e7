//! Small data structures shared by the class file model and the code engines

mod offset_vec;
mod segment_tree;

pub use offset_vec::*;
pub use segment_tree::*;
