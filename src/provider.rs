//! Data providers: the raw input to quantization and its quantized output.

use std::sync::Arc;

use crate::columns::{
    FloatValuesHolder, HashedCatValuesHolder, QuantizedCatValuesHolder, QuantizedFloatValuesHolder,
};
use crate::features_info::QuantizedFeaturesInfo;
use crate::subset::SubsetIndexing;

/// Known ordering of the logical rows of a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectsOrder {
    /// Nothing is known about the row order.
    #[default]
    Undefined,
    /// Rows are already randomly shuffled, so a prefix is an unbiased sample.
    RandomShuffled,
}

/// Raw columnar dataset handed to the quantization engine.
///
/// Columns share a single [`SubsetIndexing`] mapping logical rows to the
/// physical backing arrays. Cheap to clone: columns are `Arc`-backed.
#[derive(Clone, Debug)]
pub struct RawDataProvider {
    object_count: u32,
    subset_indexing: Arc<SubsetIndexing>,
    objects_order: ObjectsOrder,
    float_features: Vec<FloatValuesHolder>,
    cat_features: Vec<HashedCatValuesHolder>,
}

impl RawDataProvider {
    /// Assemble a provider over columns sharing `subset_indexing`.
    ///
    /// # Panics
    /// Panics if a column's physical length cannot cover the subset.
    pub fn new(
        subset_indexing: SubsetIndexing,
        objects_order: ObjectsOrder,
        float_features: Vec<FloatValuesHolder>,
        cat_features: Vec<HashedCatValuesHolder>,
    ) -> Self {
        let object_count = subset_indexing.size();
        if let SubsetIndexing::Full(n) = &subset_indexing {
            for holder in &float_features {
                assert!(
                    holder.values().len() >= *n as usize,
                    "float feature #{} shorter than the subset",
                    holder.id()
                );
            }
            for holder in &cat_features {
                assert!(
                    holder.values().len() >= *n as usize,
                    "cat feature #{} shorter than the subset",
                    holder.id()
                );
            }
        }
        Self {
            object_count,
            subset_indexing: Arc::new(subset_indexing),
            objects_order,
            float_features,
            cat_features,
        }
    }

    /// Provider over plainly ordered columns (identity subset).
    pub fn from_columns(
        object_count: u32,
        float_features: Vec<FloatValuesHolder>,
        cat_features: Vec<HashedCatValuesHolder>,
    ) -> Self {
        Self::new(
            SubsetIndexing::Full(object_count),
            ObjectsOrder::Undefined,
            float_features,
            cat_features,
        )
    }

    /// Number of logical rows.
    #[inline]
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Logical-to-physical mapping shared by all columns.
    #[inline]
    pub fn subset_indexing(&self) -> &Arc<SubsetIndexing> {
        &self.subset_indexing
    }

    /// Known row ordering.
    #[inline]
    pub fn objects_order(&self) -> ObjectsOrder {
        self.objects_order
    }

    /// Declare the known row ordering.
    pub fn with_objects_order(mut self, order: ObjectsOrder) -> Self {
        self.objects_order = order;
        self
    }

    /// Raw float columns.
    #[inline]
    pub fn float_features(&self) -> &[FloatValuesHolder] {
        &self.float_features
    }

    /// Raw categorical columns.
    #[inline]
    pub fn cat_features(&self) -> &[HashedCatValuesHolder] {
        &self.cat_features
    }

    pub(crate) fn into_parts(self) -> (Vec<FloatValuesHolder>, Vec<HashedCatValuesHolder>) {
        (self.float_features, self.cat_features)
    }
}

/// Quantized columnar dataset.
///
/// Rows are in logical order (the subset is always the identity), and the
/// metadata the columns were quantized against travels with the data.
#[derive(Clone, Debug)]
pub struct QuantizedDataProvider {
    object_count: u32,
    subset_indexing: Arc<SubsetIndexing>,
    float_features: Vec<QuantizedFloatValuesHolder>,
    cat_features: Vec<QuantizedCatValuesHolder>,
    info: Arc<QuantizedFeaturesInfo>,
}

impl QuantizedDataProvider {
    pub(crate) fn new(
        object_count: u32,
        float_features: Vec<QuantizedFloatValuesHolder>,
        cat_features: Vec<QuantizedCatValuesHolder>,
        info: Arc<QuantizedFeaturesInfo>,
    ) -> Self {
        Self {
            object_count,
            subset_indexing: Arc::new(SubsetIndexing::Full(object_count)),
            float_features,
            cat_features,
            info,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Destination row mapping. Always the identity: quantized columns are
    /// materialized (or decoded) in logical order.
    #[inline]
    pub fn subset_indexing(&self) -> &Arc<SubsetIndexing> {
        &self.subset_indexing
    }

    /// Quantized float columns.
    #[inline]
    pub fn float_features(&self) -> &[QuantizedFloatValuesHolder] {
        &self.float_features
    }

    /// Quantized categorical columns.
    #[inline]
    pub fn cat_features(&self) -> &[QuantizedCatValuesHolder] {
        &self.cat_features
    }

    /// Metadata the columns were quantized against.
    #[inline]
    pub fn features_info(&self) -> &Arc<QuantizedFeaturesInfo> {
        &self.info
    }
}
