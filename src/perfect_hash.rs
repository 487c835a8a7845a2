//! Perfect-hash encoding for categorical features.
//!
//! Raw categorical values arrive as opaque 32-bit hashes. Each feature owns a
//! [`PerfectHashTable`] mapping hashes to dense codes assigned in first-seen
//! order. Codes are append-only: re-encoding more data grows the table but
//! never renumbers an existing token, so quantized chunks produced at
//! different times stay mutually consistent.

use std::collections::HashMap;

use crate::compressed::CompressedArray;
use crate::features_info::QuantizedFeaturesInfo;
use crate::subset::SubsetIndexing;

/// Dense first-seen-order code assignment for hashed categorical tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerfectHashTable {
    map: HashMap<u32, u32>,
}

impl PerfectHashTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Code for `token`, inserting the next dense code if unseen.
    #[inline]
    pub fn code_or_insert(&mut self, token: u32) -> u32 {
        let next = self.map.len() as u32;
        *self.map.entry(token).or_insert(next)
    }

    /// Code for `token` if it has been seen.
    #[inline]
    pub fn code(&self, token: u32) -> Option<u32> {
        self.map.get(&token).copied()
    }

    /// Number of distinct tokens seen so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Encode one categorical column through its feature's perfect hash.
///
/// Extends the feature's table with unseen tokens and, when `dst` is given,
/// writes the dense code of each subset row into it at the row's logical
/// position. The table is taken out of `info` for the duration, so per-feature
/// encoding is sequential while different features proceed in parallel.
pub(crate) fn update_perfect_hash_and_maybe_quantize(
    feature_idx: usize,
    values: &[u32],
    subset: &SubsetIndexing,
    info: &QuantizedFeaturesInfo,
    mut dst: Option<&mut CompressedArray>,
) {
    let mut table = info.take_perfect_hash(feature_idx);
    subset.for_each(|logical, physical| {
        let code = table.code_or_insert(values[physical as usize]);
        if let Some(dst) = dst.as_deref_mut() {
            dst.set(logical as usize, code as u64);
        }
    });
    info.store_perfect_hash(feature_idx, table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borders::BinarizationOptions;

    #[test]
    fn test_codes_assigned_in_first_seen_order() {
        let mut table = PerfectHashTable::new();
        assert_eq!(table.code_or_insert(0xDEAD), 0);
        assert_eq!(table.code_or_insert(0xBEEF), 1);
        assert_eq!(table.code_or_insert(0xDEAD), 0);
        assert_eq!(table.code_or_insert(0xF00D), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.code(0xBEEF), Some(1));
        assert_eq!(table.code(0xCAFE), None);
    }

    #[test]
    fn test_update_writes_codes_at_logical_positions() {
        let info = QuantizedFeaturesInfo::new(BinarizationOptions::default(), 0, 1);
        let values = [50u32, 10, 50, 30, 10];
        let subset = SubsetIndexing::Full(5);
        let mut dst = CompressedArray::new(5, 32);

        update_perfect_hash_and_maybe_quantize(0, &values, &subset, &info, Some(&mut dst));

        assert_eq!(dst.get(0), 0); // 50
        assert_eq!(dst.get(1), 1); // 10
        assert_eq!(dst.get(2), 0);
        assert_eq!(dst.get(3), 2); // 30
        assert_eq!(dst.get(4), 1);
        assert_eq!(info.perfect_hash_len(0), 3);
    }

    #[test]
    fn test_codes_stable_across_chunks() {
        let info = QuantizedFeaturesInfo::new(BinarizationOptions::default(), 0, 1);

        let first = [7u32, 8, 9];
        let mut dst1 = CompressedArray::new(3, 32);
        update_perfect_hash_and_maybe_quantize(
            0,
            &first,
            &SubsetIndexing::Full(3),
            &info,
            Some(&mut dst1),
        );

        // second chunk reuses two tokens and adds one
        let second = [9u32, 100, 7];
        let mut dst2 = CompressedArray::new(3, 32);
        update_perfect_hash_and_maybe_quantize(
            0,
            &second,
            &SubsetIndexing::Full(3),
            &info,
            Some(&mut dst2),
        );

        assert_eq!(dst2.get(0), 2); // 9 keeps its code
        assert_eq!(dst2.get(1), 3); // 100 gets the next one
        assert_eq!(dst2.get(2), 0); // 7 keeps its code
        assert_eq!(info.perfect_hash_len(0), 4);
    }

    #[test]
    fn test_update_without_destination_only_grows_table() {
        let info = QuantizedFeaturesInfo::new(BinarizationOptions::default(), 0, 1);
        let values = [1u32, 2, 1];
        update_perfect_hash_and_maybe_quantize(0, &values, &SubsetIndexing::Full(3), &info, None);
        assert_eq!(info.perfect_hash_len(0), 2);
        assert_eq!(info.perfect_hash_code(0, 2), Some(1));
    }

    #[test]
    fn test_subset_limits_visible_tokens() {
        let info = QuantizedFeaturesInfo::new(BinarizationOptions::default(), 0, 1);
        let values = [1u32, 2, 3, 4, 5];
        update_perfect_hash_and_maybe_quantize(
            0,
            &values,
            &SubsetIndexing::head(2),
            &info,
            None,
        );
        assert_eq!(info.perfect_hash_len(0), 2);
        assert_eq!(info.perfect_hash_code(0, 3), None);
    }
}
