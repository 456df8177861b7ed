//! Invalid set: write pointers whose data every reader must skip

use std::collections::BTreeSet;
use txcoord_core::WritePointer;

/// Write pointers excluded from all future reads
#[derive(Debug, Clone, Default)]
pub struct InvalidSet {
    pointers: BTreeSet<WritePointer>,
}

impl InvalidSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted pointers
    pub fn from_pointers(pointers: BTreeSet<WritePointer>) -> Self {
        Self { pointers }
    }

    /// Mark `pointer` invalid. Returns false if it already was.
    pub fn add(&mut self, pointer: WritePointer) -> bool {
        self.pointers.insert(pointer)
    }

    /// Clear the mark. Returns false if it was not set.
    pub fn remove(&mut self, pointer: WritePointer) -> bool {
        self.pointers.remove(&pointer)
    }

    /// Whether `pointer` is invalid
    pub fn contains(&self, pointer: WritePointer) -> bool {
        self.pointers.contains(&pointer)
    }

    /// Number of invalid pointers
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    /// True if nothing is invalid
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// All invalid pointers, ascending
    pub fn to_vec(&self) -> Vec<WritePointer> {
        self.pointers.iter().copied().collect()
    }

    /// Copy of the underlying set
    pub fn to_set(&self) -> BTreeSet<WritePointer> {
        self.pointers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let mut invalid = InvalidSet::new();
        assert!(invalid.add(5));
        assert!(!invalid.add(5));
        assert!(invalid.add(2));
        assert_eq!(invalid.to_vec(), vec![2, 5]);
        assert!(invalid.remove(5));
        assert!(!invalid.remove(5));
        assert_eq!(invalid.len(), 1);
    }
}
