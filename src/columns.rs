//! Column holders: raw feature values and their quantized counterparts.
//!
//! Raw columns wrap their backing arrays in `Arc` so chunked pipelines can
//! share them without copying. Quantized columns come in two flavours: an
//! eagerly packed [`CompressedArray`], or a lazy view that re-quantizes from
//! the raw values on access using the shared metadata.

use std::sync::Arc;

use crate::borders::bucket_for_value;
use crate::compressed::CompressedArray;
use crate::error::QuantizeError;
use crate::features_info::QuantizedFeaturesInfo;
use crate::subset::SubsetIndexing;

// =============================================================================
// Raw columns
// =============================================================================

/// Raw float feature column.
#[derive(Clone, Debug)]
pub struct FloatValuesHolder {
    id: u32,
    values: Arc<[f32]>,
}

impl FloatValuesHolder {
    /// Wrap a raw column under a stable feature id.
    pub fn new(id: u32, values: Vec<f32>) -> Self {
        Self {
            id,
            values: Arc::from(values),
        }
    }

    /// Stable feature id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Physical backing values.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Shared handle to the backing values.
    #[inline]
    pub fn values_arc(&self) -> Arc<[f32]> {
        Arc::clone(&self.values)
    }
}

/// Raw categorical feature column of hashed tokens.
#[derive(Clone, Debug)]
pub struct HashedCatValuesHolder {
    id: u32,
    values: Arc<[u32]>,
}

impl HashedCatValuesHolder {
    /// Wrap a raw column under a stable feature id.
    pub fn new(id: u32, values: Vec<u32>) -> Self {
        Self {
            id,
            values: Arc::from(values),
        }
    }

    /// Stable feature id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Physical backing values.
    #[inline]
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Shared handle to the backing values.
    #[inline]
    pub fn values_arc(&self) -> Arc<[u32]> {
        Arc::clone(&self.values)
    }
}

// =============================================================================
// Quantized columns
// =============================================================================

#[derive(Clone, Debug)]
enum QuantizedFloatData {
    Packed(CompressedArray),
    /// Lazy view over the raw values; buckets are computed on access from the
    /// shared metadata.
    Raw {
        values: Arc<[f32]>,
        src_subset: Arc<SubsetIndexing>,
        info: Arc<QuantizedFeaturesInfo>,
        feature_idx: usize,
    },
}

/// Quantized float feature column.
#[derive(Clone, Debug)]
pub struct QuantizedFloatValuesHolder {
    id: u32,
    data: QuantizedFloatData,
}

impl QuantizedFloatValuesHolder {
    /// Column backed by eagerly packed bucket codes in logical order.
    pub fn packed(id: u32, data: CompressedArray) -> Self {
        Self {
            id,
            data: QuantizedFloatData::Packed(data),
        }
    }

    /// Lazily quantized view over raw values.
    pub fn lazy(
        id: u32,
        values: Arc<[f32]>,
        src_subset: Arc<SubsetIndexing>,
        info: Arc<QuantizedFeaturesInfo>,
        feature_idx: usize,
    ) -> Self {
        Self {
            id,
            data: QuantizedFloatData::Raw {
                values,
                src_subset,
                info,
                feature_idx,
            },
        }
    }

    /// Stable feature id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether bucket codes are materialized.
    #[inline]
    pub fn is_packed(&self) -> bool {
        matches!(self.data, QuantizedFloatData::Packed(_))
    }

    /// Packed codes, if materialized.
    pub fn packed_data(&self) -> Option<&CompressedArray> {
        match &self.data {
            QuantizedFloatData::Packed(arr) => Some(arr),
            QuantizedFloatData::Raw { .. } => None,
        }
    }

    /// Bucket code of the value at logical row `i`.
    pub fn bucket(&self, i: u32) -> Result<u32, QuantizeError> {
        match &self.data {
            QuantizedFloatData::Packed(arr) => Ok(arr.get(i as usize) as u32),
            QuantizedFloatData::Raw {
                values,
                src_subset,
                info,
                feature_idx,
            } => {
                let (nan_mode, borders) =
                    info.borders_and_nan_mode(*feature_idx)?.ok_or_else(|| {
                        QuantizeError::internal(format!(
                            "float feature #{}: lazy column without computed borders",
                            self.id
                        ))
                    })?;
                let value = values[src_subset.index(i) as usize];
                bucket_for_value(value, nan_mode, &borders, self.id)
            }
        }
    }
}

#[derive(Clone, Debug)]
enum QuantizedCatData {
    Packed(CompressedArray),
    Raw {
        values: Arc<[u32]>,
        src_subset: Arc<SubsetIndexing>,
        info: Arc<QuantizedFeaturesInfo>,
        feature_idx: usize,
    },
}

/// Quantized categorical feature column of dense perfect-hash codes.
#[derive(Clone, Debug)]
pub struct QuantizedCatValuesHolder {
    id: u32,
    data: QuantizedCatData,
}

impl QuantizedCatValuesHolder {
    /// Column backed by eagerly packed codes in logical order.
    pub fn packed(id: u32, data: CompressedArray) -> Self {
        Self {
            id,
            data: QuantizedCatData::Packed(data),
        }
    }

    /// Lazily encoded view over raw hashed tokens.
    pub fn lazy(
        id: u32,
        values: Arc<[u32]>,
        src_subset: Arc<SubsetIndexing>,
        info: Arc<QuantizedFeaturesInfo>,
        feature_idx: usize,
    ) -> Self {
        Self {
            id,
            data: QuantizedCatData::Raw {
                values,
                src_subset,
                info,
                feature_idx,
            },
        }
    }

    /// Stable feature id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether codes are materialized.
    #[inline]
    pub fn is_packed(&self) -> bool {
        matches!(self.data, QuantizedCatData::Packed(_))
    }

    /// Packed codes, if materialized.
    pub fn packed_data(&self) -> Option<&CompressedArray> {
        match &self.data {
            QuantizedCatData::Packed(arr) => Some(arr),
            QuantizedCatData::Raw { .. } => None,
        }
    }

    /// Dense code of the token at logical row `i`.
    ///
    /// The perfect hash covers every token the engine has seen; an unknown
    /// token under a lazy column means the table and the column diverged.
    pub fn code(&self, i: u32) -> Result<u32, QuantizeError> {
        match &self.data {
            QuantizedCatData::Packed(arr) => Ok(arr.get(i as usize) as u32),
            QuantizedCatData::Raw {
                values,
                src_subset,
                info,
                feature_idx,
            } => {
                let token = values[src_subset.index(i) as usize];
                info.perfect_hash_code(*feature_idx, token).ok_or_else(|| {
                    QuantizeError::internal(format!(
                        "cat feature #{}: token {} missing from perfect hash",
                        self.id, token
                    ))
                })
            }
        }
    }
}
