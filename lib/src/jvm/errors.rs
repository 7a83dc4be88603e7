use super::code::Label;
use crate::util::Offset;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Request to add a constant of a kind that has no constant pool representation
    InvalidConstant(String),

    /// More constant pool slots are in use than `constant_pool_count` can describe
    ConstantPoolOverflow { slots: usize },

    /// Constant index does not point at an entry
    MissingConstant(u32),

    /// Constant index points at an entry of the wrong kind
    UnexpectedConstant { index: u32, expected: &'static str },

    IoError(std::io::Error),

    MethodCodeMaxStackOverflow(Offset),
    MethodCodeMaxLocalsOverflow(Offset),

    /// Method code is longer than 65535 bytes, even after widening jumps
    MethodCodeOverflow(Offset),

    /// A label is used by a jump, switch, or exception handler but never placed
    UndefinedLabel(Label),

    /// A label is placed at two different positions
    DuplicateLabel(Label),

    /// `jsr`/`ret` are incompatible with computing stack map frames
    SubroutineWithFrames,

    /// Class hierarchy could not resolve this class name
    TypeNotPresent(String),

    InvalidDescriptor(String),
    InvalidName(String),

    /// Two paths reach the same instruction with different stack heights
    IncompatibleStackHeights {
        block: usize,
        expected: usize,
        found: usize,
    },

    /// Instruction pops more than is on the stack, or the wrong width
    StackUnderflow(String),

    /// Local variable index does not fit in the frame
    InvalidLocal(usize),

    /// Input bytes are not a well formed class file
    MalformedClass(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConstant(what) => write!(f, "invalid constant: {}", what),
            Error::ConstantPoolOverflow { slots } => {
                write!(f, "constant pool too large ({} slots)", slots)
            }
            Error::MissingConstant(idx) => write!(f, "no constant at index {}", idx),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant {} is not a {}", index, expected)
            }
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::MethodCodeMaxStackOverflow(max) => {
                write!(f, "max stack {} does not fit in 16 bits", max.0)
            }
            Error::MethodCodeMaxLocalsOverflow(max) => {
                write!(f, "max locals {} does not fit in 16 bits", max.0)
            }
            Error::MethodCodeOverflow(len) => write!(f, "method code too large ({} bytes)", len.0),
            Error::UndefinedLabel(label) => write!(f, "label {:?} is never placed", label),
            Error::DuplicateLabel(label) => write!(f, "label {:?} is placed twice", label),
            Error::SubroutineWithFrames => {
                write!(f, "jsr/ret instructions cannot be used with frame computation")
            }
            Error::TypeNotPresent(name) => write!(f, "type not present: {}", name),
            Error::InvalidDescriptor(desc) => write!(f, "invalid descriptor: {}", desc),
            Error::InvalidName(msg) => write!(f, "invalid name: {}", msg),
            Error::IncompatibleStackHeights {
                block,
                expected,
                found,
            } => write!(
                f,
                "block {} reached with stack heights {} and {}",
                block, expected, found
            ),
            Error::StackUnderflow(insn) => write!(f, "stack underflow at {}", insn),
            Error::InvalidLocal(idx) => write!(f, "invalid local variable {}", idx),
            Error::MalformedClass(msg) => write!(f, "malformed class file: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
