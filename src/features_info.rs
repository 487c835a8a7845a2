//! Shared quantization metadata.
//!
//! [`QuantizedFeaturesInfo`] holds the per-feature borders, nan modes and
//! perfect hash tables, all populated lazily as features are processed. It is
//! shared behind an `Arc` between the quantization engine and any quantized
//! views that decode lazily, and reused across data chunks so the second
//! chunk is encoded against the first chunk's metadata.

use std::sync::{Arc, RwLock};

use crate::borders::{BinarizationOptions, NanMode};
use crate::error::QuantizeError;
use crate::perfect_hash::PerfectHashTable;

#[derive(Debug, Default)]
struct FeaturesState {
    nan_modes: Vec<Option<NanMode>>,
    borders: Vec<Option<Arc<[f32]>>>,
    perfect_hashes: Vec<PerfectHashTable>,
}

/// Per-feature quantization metadata, filled in as features are processed.
///
/// Interior mutability with reader/writer locking: many feature tasks read
/// concurrently, writers publish computed metadata. A feature's borders and
/// nan mode are set together and never overwritten once present.
#[derive(Debug)]
pub struct QuantizedFeaturesInfo {
    binarization: BinarizationOptions,
    float_feature_count: usize,
    cat_feature_count: usize,
    state: RwLock<FeaturesState>,
}

impl QuantizedFeaturesInfo {
    /// Create metadata storage for a schema of `float_feature_count` float
    /// and `cat_feature_count` categorical features.
    pub fn new(
        binarization: BinarizationOptions,
        float_feature_count: usize,
        cat_feature_count: usize,
    ) -> Self {
        Self {
            binarization,
            float_feature_count,
            cat_feature_count,
            state: RwLock::new(FeaturesState {
                nan_modes: vec![None; float_feature_count],
                borders: vec![None; float_feature_count],
                perfect_hashes: vec![PerfectHashTable::new(); cat_feature_count],
            }),
        }
    }

    /// Binarization options the metadata was built with.
    #[inline]
    pub fn binarization(&self) -> &BinarizationOptions {
        &self.binarization
    }

    /// Number of float features in the schema.
    #[inline]
    pub fn float_feature_count(&self) -> usize {
        self.float_feature_count
    }

    /// Number of categorical features in the schema.
    #[inline]
    pub fn cat_feature_count(&self) -> usize {
        self.cat_feature_count
    }

    /// Whether any float feature still lacks computed borders.
    pub fn need_to_calc_borders(&self) -> bool {
        let state = self.state.read().expect("features state lock poisoned");
        state.borders.iter().any(|b| b.is_none())
    }

    /// Whether borders have been computed for a float feature.
    pub fn has_borders(&self, feature_idx: usize) -> bool {
        let state = self.state.read().expect("features state lock poisoned");
        state.borders[feature_idx].is_some()
    }

    /// Borders and nan mode for a float feature, if computed.
    ///
    /// The two are always published together; observing one without the
    /// other is a logic defect.
    pub fn borders_and_nan_mode(
        &self,
        feature_idx: usize,
    ) -> Result<Option<(NanMode, Arc<[f32]>)>, QuantizeError> {
        let state = self.state.read().expect("features state lock poisoned");
        match (state.nan_modes[feature_idx], &state.borders[feature_idx]) {
            (Some(nan_mode), Some(borders)) => Ok(Some((nan_mode, Arc::clone(borders)))),
            (None, None) => Ok(None),
            _ => Err(QuantizeError::internal(format!(
                "float feature #{}: borders and nan mode out of sync",
                feature_idx
            ))),
        }
    }

    /// Publish borders and nan mode for a float feature unless another task
    /// got there first. Returns the metadata now in effect.
    pub fn set_borders_and_nan_mode_if_absent(
        &self,
        feature_idx: usize,
        nan_mode: NanMode,
        borders: Arc<[f32]>,
    ) -> (NanMode, Arc<[f32]>) {
        let mut state = self.state.write().expect("features state lock poisoned");
        if let (Some(existing_mode), Some(existing_borders)) = (
            state.nan_modes[feature_idx],
            state.borders[feature_idx].clone(),
        ) {
            return (existing_mode, existing_borders);
        }
        state.nan_modes[feature_idx] = Some(nan_mode);
        state.borders[feature_idx] = Some(Arc::clone(&borders));
        (nan_mode, borders)
    }

    /// Take a categorical feature's hash table out for exclusive extension.
    ///
    /// Pair with [`store_perfect_hash`](Self::store_perfect_hash); a table
    /// read while taken appears empty.
    pub(crate) fn take_perfect_hash(&self, feature_idx: usize) -> PerfectHashTable {
        let mut state = self.state.write().expect("features state lock poisoned");
        std::mem::take(&mut state.perfect_hashes[feature_idx])
    }

    /// Put an extended hash table back.
    pub(crate) fn store_perfect_hash(&self, feature_idx: usize, table: PerfectHashTable) {
        let mut state = self.state.write().expect("features state lock poisoned");
        state.perfect_hashes[feature_idx] = table;
    }

    /// Dense code of a categorical token, if the token has been seen.
    pub fn perfect_hash_code(&self, feature_idx: usize, token: u32) -> Option<u32> {
        let state = self.state.read().expect("features state lock poisoned");
        state.perfect_hashes[feature_idx].code(token)
    }

    /// Number of distinct tokens seen for a categorical feature.
    pub fn perfect_hash_len(&self, feature_idx: usize) -> usize {
        let state = self.state.read().expect("features state lock poisoned");
        state.perfect_hashes[feature_idx].len()
    }
}
