use std::fmt;

/// Opaque label handed out by a method writer
///
/// A label names a position in the instruction stream. It only becomes a concrete bytecode offset
/// once the method is laid out.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Index of a basic block in the block arena of a method
///
/// Every label is resolved to one of these exactly once, when the control flow graph is built.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockId(pub usize);

impl BlockId {
    /// First block in the method (the entry point)
    pub const START: BlockId = BlockId(0);
}

impl fmt::Debug for BlockId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("b{}", self.0))
    }
}
