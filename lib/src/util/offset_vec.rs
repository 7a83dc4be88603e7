use std::fmt;

/// Number of slots (or bytes) something takes up
pub trait Width {
    fn width(&self) -> usize;
}

/// Position measured in slots (or bytes) rather than in elements
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Offset(pub usize);

/// Vector indexed both by position and by offset, where each element advances the offset by
/// its width
///
/// The constant pool (`long` and `double` take two indices), method code (instructions take 1 to
/// 6 bytes), and the operand stack (`long` and `double` take two slots) all work this way.
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    /// Elements, each paired with its starting offset
    entries: Vec<(Offset, T)>,

    /// Offset that the next pushed element will get
    end: Offset,

    /// Offset of the first element
    start: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::starting_at(Offset(0))
    }

    /// Empty vector whose first element will be at `start` (the constant pool starts at 1)
    pub fn starting_at(start: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            end: start,
            start,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next pushed element will get
    pub fn offset_len(&self) -> Offset {
        self.end
    }

    /// Sum of the widths of all elements
    pub fn total_width(&self) -> usize {
        self.end.0 - self.start.0
    }

    /// Append an element, returning its offset
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.end;
        self.end.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    pub fn pop(&mut self) -> Option<T> {
        let (offset, elem) = self.entries.pop()?;
        self.end = offset;
        Some(elem)
    }

    /// Element starting exactly at `offset`
    ///
    /// Offsets pointing into the middle of a wide element find nothing.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(start, _)| *start)
            .ok()
            .map(|found| &self.entries[found].1)
    }

    /// Element at a position
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|(_, elem)| elem)
    }

    /// Update every element in place, without changing widths
    pub fn for_each_mut(&mut self, mut update: impl FnMut(&mut T)) {
        for (_, elem) in &mut self.entries {
            let width = elem.width();
            update(elem);
            debug_assert_eq!(width, elem.width(), "element width changed");
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.entries.iter().map(|(_, elem)| elem)
    }

    /// Iterate through elements along with their starting offsets
    pub fn iter_offsets(&self) -> impl DoubleEndedIterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, elem)| (*offset, elem))
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elems: I) -> Self {
        let mut offset_vec = OffsetVec::new();
        offset_vec.extend(elems);
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, elems: I) {
        for elem in elems {
            self.push(elem);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(offset, elem)| (offset.0, elem)))
            .finish()
    }
}
