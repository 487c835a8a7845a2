//! # binquant
//!
//! Feature quantization for gradient boosted tree training: float columns
//! become small bucket codes against per-feature borders, categorical hash
//! columns become dense perfect-hash codes, all stored bit-packed.
//!
//! ```ignore
//! use std::sync::Arc;
//! use rand::{rngs::StdRng, SeedableRng};
//! use binquant::{
//!     quantize, BinarizationOptions, FloatValuesHolder, QuantizationOptions,
//!     QuantizedFeaturesInfo, RawDataProvider, run_with_threads,
//! };
//!
//! let raw = Arc::new(RawDataProvider::from_columns(
//!     4,
//!     vec![FloatValuesHolder::new(0, vec![0.5, 1.5, 2.5, 3.5])],
//!     vec![],
//! ));
//! let info = Arc::new(QuantizedFeaturesInfo::new(
//!     BinarizationOptions::default(),
//!     1,
//!     0,
//! ));
//! let mut rng = StdRng::seed_from_u64(0);
//!
//! let quantized = run_with_threads(0, |parallelism| {
//!     quantize(&QuantizationOptions::default(), raw, info, &mut rng, parallelism)
//! })?;
//! # Ok::<(), binquant::QuantizeError>(())
//! ```

mod borders;
mod columns;
mod compressed;
mod error;
mod executor;
mod features_info;
mod perfect_hash;
mod provider;
mod quantize;
mod sampling;
mod subset;
mod utils;

pub use borders::{
    bucket_for_value, calc_borders_and_nan_mode, BinarizationOptions, BorderSelectionType, NanMode,
};
pub use columns::{
    FloatValuesHolder, HashedCatValuesHolder, QuantizedCatValuesHolder, QuantizedFloatValuesHolder,
};
pub use compressed::CompressedArray;
pub use error::QuantizeError;
pub use executor::{resident_memory_bytes, ResourceConstrainedExecutor};
pub use features_info::QuantizedFeaturesInfo;
pub use perfect_hash::PerfectHashTable;
pub use provider::{ObjectsOrder, QuantizedDataProvider, RawDataProvider};
pub use quantize::{
    quantize, QuantizationOptions, CAT_BITS_PER_KEY, FLOAT_BITS_PER_KEY,
};
pub use sampling::sample_size_for_border_selection_type;
pub use subset::{SubsetBlock, SubsetIndexing};
pub use utils::{run_with_threads, Parallelism};
