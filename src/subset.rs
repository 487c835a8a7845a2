//! Subset indexing: a composable mapping from logical row order to physical
//! storage order.
//!
//! Raw columns are never addressed directly; every access goes through a
//! [`SubsetIndexing`] so that reordered or partial views over a physical
//! backing array cost nothing to express. Two indexings compose into a new
//! one without materializing data (except in the fully general case, where
//! an index vector is built).

/// A contiguous range of physical indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsetBlock {
    pub begin: u32,
    pub end: u32,
}

impl SubsetBlock {
    /// Create a block covering `[begin, end)`.
    #[inline]
    pub fn new(begin: u32, end: u32) -> Self {
        debug_assert!(begin <= end, "block range reversed: [{}, {})", begin, end);
        Self { begin, end }
    }

    /// Number of indices in the block.
    #[inline]
    pub fn len(self) -> u32 {
        self.end - self.begin
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.begin == self.end
    }
}

/// Mapping from logical row position to physical row position.
///
/// Variants, cheapest first:
/// - `Full` - identity over `[0, size)`
/// - `Blocks` - concatenation of contiguous physical ranges
/// - `Indexed` - fully general index vector
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubsetIndexing {
    /// Identity mapping over `size` rows.
    Full(u32),
    /// Logical order is the concatenation of the blocks.
    Blocks(Vec<SubsetBlock>),
    /// Explicit physical index per logical position.
    Indexed(Vec<u32>),
}

impl SubsetIndexing {
    /// Subset selecting the first `n` logical rows.
    #[inline]
    pub fn head(n: u32) -> Self {
        Self::Blocks(vec![SubsetBlock::new(0, n)])
    }

    /// Logical size of the subset.
    pub fn size(&self) -> u32 {
        match self {
            Self::Full(size) => *size,
            Self::Blocks(blocks) => blocks.iter().map(|b| b.len()).sum(),
            Self::Indexed(indices) => indices.len() as u32,
        }
    }

    /// Whether this is the identity mapping.
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Physical index for a logical position.
    ///
    /// Callers guarantee `logical < self.size()`. `Blocks` lookup is linear
    /// in the number of blocks; use [`for_each`](Self::for_each) for bulk
    /// traversal.
    pub fn index(&self, logical: u32) -> u32 {
        match self {
            Self::Full(size) => {
                debug_assert!(logical < *size);
                logical
            }
            Self::Blocks(blocks) => {
                let mut remaining = logical;
                for block in blocks {
                    if remaining < block.len() {
                        return block.begin + remaining;
                    }
                    remaining -= block.len();
                }
                panic!("logical index {} out of bounds for blocks subset", logical)
            }
            Self::Indexed(indices) => indices[logical as usize],
        }
    }

    /// Visit `(logical, physical)` pairs in logical order.
    pub fn for_each(&self, mut f: impl FnMut(u32, u32)) {
        match self {
            Self::Full(size) => {
                for i in 0..*size {
                    f(i, i);
                }
            }
            Self::Blocks(blocks) => {
                let mut logical = 0;
                for block in blocks {
                    for physical in block.begin..block.end {
                        f(logical, physical);
                        logical += 1;
                    }
                }
            }
            Self::Indexed(indices) => {
                for (logical, &physical) in indices.iter().enumerate() {
                    f(logical as u32, physical);
                }
            }
        }
    }

    /// Compose with an inner subset: the result maps logical position `i` to
    /// `self.index(subset.index(i))`.
    ///
    /// The result's logical size equals `subset.size()`. No data is copied
    /// when either side is `Full`; otherwise an index vector is built.
    pub fn compose(&self, subset: &SubsetIndexing) -> SubsetIndexing {
        debug_assert!(subset.size() <= self.size() || subset.is_full());
        match (self, subset) {
            (_, Self::Full(size)) => {
                debug_assert_eq!(*size, self.size());
                self.clone()
            }
            (Self::Full(_), _) => subset.clone(),
            _ => {
                let mut indices = Vec::with_capacity(subset.size() as usize);
                subset.for_each(|_, mid| indices.push(self.index(mid)));
                Self::Indexed(indices)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_identity() {
        let full = SubsetIndexing::Full(5);
        assert_eq!(full.size(), 5);
        assert!(full.is_full());
        for i in 0..5 {
            assert_eq!(full.index(i), i);
        }
    }

    #[test]
    fn test_blocks() {
        let blocks = SubsetIndexing::Blocks(vec![
            SubsetBlock::new(10, 12),
            SubsetBlock::new(0, 3),
        ]);
        assert_eq!(blocks.size(), 5);
        assert_eq!(blocks.index(0), 10);
        assert_eq!(blocks.index(1), 11);
        assert_eq!(blocks.index(2), 0);
        assert_eq!(blocks.index(4), 2);

        let mut seen = Vec::new();
        blocks.for_each(|logical, physical| seen.push((logical, physical)));
        assert_eq!(seen, vec![(0, 10), (1, 11), (2, 0), (3, 1), (4, 2)]);
    }

    #[test]
    fn test_head() {
        let head = SubsetIndexing::head(3);
        assert_eq!(head.size(), 3);
        assert_eq!(head.index(2), 2);
    }

    #[test]
    fn test_compose_with_full_is_identity() {
        let indexed = SubsetIndexing::Indexed(vec![4, 2, 0]);
        let full = SubsetIndexing::Full(3);
        assert_eq!(indexed.compose(&full), indexed);

        let full_outer = SubsetIndexing::Full(10);
        assert_eq!(full_outer.compose(&indexed), indexed);
    }

    #[test]
    fn test_compose_general() {
        // src reorders rows, subset takes the first two logical positions
        let src = SubsetIndexing::Indexed(vec![5, 3, 1, 0]);
        let head = SubsetIndexing::head(2);
        let composed = src.compose(&head);
        assert_eq!(composed, SubsetIndexing::Indexed(vec![5, 3]));
    }

    #[test]
    fn test_compose_associative_and_size_preserving() {
        let a = SubsetIndexing::Indexed(vec![9, 8, 7, 6, 5, 4]);
        let b = SubsetIndexing::Indexed(vec![5, 3, 1, 0]);
        let c = SubsetIndexing::Indexed(vec![2, 0]);

        let left = a.compose(&b).compose(&c);
        let right = a.compose(&b.compose(&c));
        assert_eq!(left, right);
        assert_eq!(left.size(), c.size());
    }
}
