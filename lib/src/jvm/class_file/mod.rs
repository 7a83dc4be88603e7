//! Low-level representation of the class file format
//!
//! Everything here maps closely onto the structures of [chapter 4 of the JVMS][0]. Higher level
//! code builds these up (see [`crate::jvm::ClassWriter`]) and then serializes them.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod member;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use member::*;
