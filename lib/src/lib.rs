//! Encode JVM class files, computing maximum stack/locals and stack map frames
//!
//! The entry points are [`jvm::ClassWriter`] for generating classes from scratch and
//! [`jvm::ClassReader`] for decoding existing ones (and replaying them into a writer). See the
//! [`jvm`] module documentation for an example.

pub mod jvm;
pub mod settings;
pub mod util;

mod errors;

pub use errors::*;
