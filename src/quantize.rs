//! The quantization engine.
//!
//! [`quantize`] turns a [`RawDataProvider`] into a [`QuantizedDataProvider`]:
//! float columns become packed bucket codes against computed borders,
//! categorical columns become dense perfect-hash codes. Feature columns are
//! independent, so each becomes one task scheduled under an advisory memory
//! budget derived from `cpu_ram_limit` and the current resident set size.

use std::sync::{Arc, Mutex};

use bon::Builder;
use log::warn;
use rand::Rng;
use rayon::prelude::*;

use crate::borders::{bucket_for_value, calc_borders_and_nan_mode, BinarizationOptions};
use crate::columns::{
    FloatValuesHolder, HashedCatValuesHolder, QuantizedCatValuesHolder, QuantizedFloatValuesHolder,
};
use crate::compressed::CompressedArray;
use crate::error::QuantizeError;
use crate::executor::{resident_memory_bytes, ResourceConstrainedExecutor};
use crate::features_info::QuantizedFeaturesInfo;
use crate::perfect_hash::update_perfect_hash_and_maybe_quantize;
use crate::provider::{QuantizedDataProvider, RawDataProvider};
use crate::sampling::subset_for_build_borders;
use crate::subset::SubsetIndexing;
use crate::utils::Parallelism;

/// Bit width of packed float bucket codes.
pub const FLOAT_BITS_PER_KEY: u32 = 8;
/// Bit width of packed categorical codes.
// TODO: narrow to 8/16 bits when the perfect hash stays small enough
pub const CAT_BITS_PER_KEY: u32 = 32;

/// Words filled per unit of parallel packing work.
const PACK_CHUNK_WORDS: usize = 1024;

// =============================================================================
// Options
// =============================================================================

/// Configuration for a [`quantize`] run.
///
/// At least one output format must be requested. The cpu format packs every
/// column eagerly; the gpu format allows columns to stay lazy when the raw
/// data outlives the call.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
pub struct QuantizationOptions {
    /// Produce eagerly packed columns (default: true).
    #[builder(default = true)]
    pub cpu_compatible_format: bool,
    /// Allow lazily decoded columns for gpu-side packing (default: false).
    #[builder(default = false)]
    pub gpu_compatible_format: bool,
    /// Row budget for border calculation under superlinear selectors
    /// (default: 200 000).
    #[builder(default = 200_000)]
    pub max_subset_size_for_slow_border_algorithms: u32,
    /// Advisory memory ceiling in bytes for concurrently running feature
    /// tasks (default: unlimited).
    #[builder(default = u64::MAX)]
    pub cpu_ram_limit: u64,
    /// Shuffle all rows before taking the border-calculation sample, so the
    /// selected rows do not depend on the sample size (default: false).
    #[builder(default = false)]
    pub shuffle_over_full_data_for_reproducibility: bool,
}

impl Default for QuantizationOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

// =============================================================================
// Memory estimates
// =============================================================================

/// Estimated peak bytes for one float feature task: the finite-value copy
/// made for border calculation, selector scratch, and the packed destination.
pub(crate) fn estimate_mem_usage_for_float_feature(
    object_count: u32,
    border_sample_size: u32,
    binarization: &BinarizationOptions,
    need_borders: bool,
    materialize: bool,
) -> u64 {
    let mut estimate = 0u64;
    if need_borders {
        estimate += border_sample_size as u64 * 4;
        estimate += binarization
            .border_selection_type
            .scratch_bytes(binarization.border_count);
    }
    if materialize {
        estimate += object_count as u64 * (FLOAT_BITS_PER_KEY as u64 / 8);
    }
    estimate
}

/// Estimated peak bytes for one categorical feature task: hash table nodes
/// plus the packed destination.
pub(crate) fn estimate_mem_usage_for_cat_feature(object_count: u32, materialize: bool) -> u64 {
    // pessimistic: every token distinct, ~32 bytes per hash map entry
    let mut estimate = object_count as u64 * 32;
    if materialize {
        estimate += object_count as u64 * (CAT_BITS_PER_KEY as u64 / 8);
    }
    estimate
}

// =============================================================================
// Packing
// =============================================================================

/// Fill `dst` from a per-index code source, chunked over whole words so
/// parallel workers never share a word.
fn pack_codes<F>(
    dst: &mut CompressedArray,
    parallelism: Parallelism,
    code_at: F,
) -> Result<(), QuantizeError>
where
    F: Fn(usize) -> Result<u64, QuantizeError> + Sync,
{
    let len = dst.len();
    let bits_per_key = dst.bits_per_key();
    let keys_per_word = dst.keys_per_word();

    let fill_chunk = |chunk_idx: usize, words: &mut [u64]| -> Result<(), QuantizeError> {
        let first_key = chunk_idx * PACK_CHUNK_WORDS * keys_per_word;
        for (w, word) in words.iter_mut().enumerate() {
            let base = first_key + w * keys_per_word;
            let mut acc = 0u64;
            for k in 0..keys_per_word {
                let i = base + k;
                if i >= len {
                    break;
                }
                acc |= code_at(i)? << (k as u32 * bits_per_key);
            }
            *word = acc;
        }
        Ok(())
    };

    if parallelism.is_parallel() {
        dst.words_mut()
            .par_chunks_mut(PACK_CHUNK_WORDS)
            .enumerate()
            .map(|(chunk_idx, words)| fill_chunk(chunk_idx, words))
            .collect::<Result<(), _>>()
    } else {
        dst.words_mut()
            .chunks_mut(PACK_CHUNK_WORDS)
            .enumerate()
            .try_for_each(|(chunk_idx, words)| fill_chunk(chunk_idx, words))
    }
}

// =============================================================================
// Per-feature processing
// =============================================================================

fn process_float_feature(
    feature_idx: usize,
    holder: FloatValuesHolder,
    src_subset: &Arc<SubsetIndexing>,
    borders_subset: Option<&SubsetIndexing>,
    info: &Arc<QuantizedFeaturesInfo>,
    materialize: bool,
    parallelism: Parallelism,
) -> Result<QuantizedFloatValuesHolder, QuantizeError> {
    // metadata may already exist (second chunk, or a concurrent writer)
    let (nan_mode, borders) = match info.borders_and_nan_mode(feature_idx)? {
        Some(existing) => existing,
        None => {
            let (nan_mode, borders) = calc_borders_and_nan_mode(
                holder.id(),
                holder.values(),
                borders_subset.unwrap_or(src_subset),
                info.binarization(),
            )?;
            info.set_borders_and_nan_mode_if_absent(feature_idx, nan_mode, Arc::from(borders))
        }
    };

    if !materialize {
        return Ok(QuantizedFloatValuesHolder::lazy(
            holder.id(),
            holder.values_arc(),
            Arc::clone(src_subset),
            Arc::clone(info),
            feature_idx,
        ));
    }

    let values = holder.values();
    let feature_id = holder.id();
    let mut dst = CompressedArray::new(src_subset.size() as usize, FLOAT_BITS_PER_KEY);
    pack_codes(&mut dst, parallelism, |i| {
        let value = values[src_subset.index(i as u32) as usize];
        bucket_for_value(value, nan_mode, &borders, feature_id).map(u64::from)
    })?;
    Ok(QuantizedFloatValuesHolder::packed(feature_id, dst))
}

fn process_cat_feature(
    feature_idx: usize,
    holder: HashedCatValuesHolder,
    src_subset: &Arc<SubsetIndexing>,
    info: &Arc<QuantizedFeaturesInfo>,
    materialize: bool,
) -> QuantizedCatValuesHolder {
    if materialize {
        let mut dst = CompressedArray::new(src_subset.size() as usize, CAT_BITS_PER_KEY);
        update_perfect_hash_and_maybe_quantize(
            feature_idx,
            holder.values(),
            src_subset,
            info,
            Some(&mut dst),
        );
        QuantizedCatValuesHolder::packed(holder.id(), dst)
    } else {
        update_perfect_hash_and_maybe_quantize(feature_idx, holder.values(), src_subset, info, None);
        QuantizedCatValuesHolder::lazy(
            holder.id(),
            holder.values_arc(),
            Arc::clone(src_subset),
            Arc::clone(info),
            feature_idx,
        )
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Quantize a raw dataset against (and into) shared metadata.
///
/// Metadata already present in `info` is reused as-is, so feeding chunks of a
/// stream through the same `info` yields mutually consistent quantized data.
/// When the caller passes the sole `Arc` reference to `raw`, each raw column
/// is dropped as soon as its quantized counterpart exists and every output
/// column is packed; a shared `raw` additionally allows lazy gpu-format
/// columns that keep decoding from the raw values.
pub fn quantize<R: Rng>(
    options: &QuantizationOptions,
    raw: Arc<RawDataProvider>,
    info: Arc<QuantizedFeaturesInfo>,
    rng: &mut R,
    parallelism: Parallelism,
) -> Result<QuantizedDataProvider, QuantizeError> {
    if !options.cpu_compatible_format && !options.gpu_compatible_format {
        return Err(QuantizeError::NoOutputFormat);
    }

    // sole ownership means raw columns can be freed feature by feature
    let (raw, clear_src) = match Arc::try_unwrap(raw) {
        Ok(provider) => (provider, true),
        Err(shared) => ((*shared).clone(), false),
    };

    if raw.float_features().len() != info.float_feature_count()
        || raw.cat_features().len() != info.cat_feature_count()
    {
        return Err(QuantizeError::internal(format!(
            "provider schema ({} float, {} cat) does not match metadata ({} float, {} cat)",
            raw.float_features().len(),
            raw.cat_features().len(),
            info.float_feature_count(),
            info.cat_feature_count()
        )));
    }

    let object_count = raw.object_count();
    let src_subset = Arc::clone(raw.subset_indexing());
    let materialize = options.cpu_compatible_format || clear_src;

    let borders_subset = subset_for_build_borders(
        &src_subset,
        &info,
        raw.objects_order(),
        options,
        rng,
    );
    let border_sample_size = borders_subset
        .as_ref()
        .map(|s| s.size())
        .unwrap_or(object_count);
    let borders_subset = Arc::new(borders_subset);

    let resident = resident_memory_bytes().unwrap_or(0);
    if resident > options.cpu_ram_limit {
        warn!(
            "current resident memory {} already exceeds cpu_ram_limit {}",
            resident, options.cpu_ram_limit
        );
    }
    let budget = options.cpu_ram_limit.saturating_sub(resident);

    let (float_holders, cat_holders) = raw.into_parts();
    let float_slots: Vec<Mutex<Option<QuantizedFloatValuesHolder>>> =
        (0..float_holders.len()).map(|_| Mutex::new(None)).collect();
    let cat_slots: Vec<Mutex<Option<QuantizedCatValuesHolder>>> =
        (0..cat_holders.len()).map(|_| Mutex::new(None)).collect();

    let mut executor = ResourceConstrainedExecutor::new(budget, parallelism);

    for (feature_idx, holder) in float_holders.into_iter().enumerate() {
        let cost = estimate_mem_usage_for_float_feature(
            object_count,
            border_sample_size,
            info.binarization(),
            !info.has_borders(feature_idx),
            materialize,
        );
        let slot = &float_slots[feature_idx];
        let src_subset = Arc::clone(&src_subset);
        let borders_subset = Arc::clone(&borders_subset);
        let info = Arc::clone(&info);
        executor.add(cost, move || {
            let quantized = process_float_feature(
                feature_idx,
                holder,
                &src_subset,
                borders_subset.as_ref().as_ref(),
                &info,
                materialize,
                parallelism,
            )?;
            *slot.lock().expect("result slot lock poisoned") = Some(quantized);
            Ok(())
        });
    }

    for (feature_idx, holder) in cat_holders.into_iter().enumerate() {
        let cost = estimate_mem_usage_for_cat_feature(object_count, materialize);
        let slot = &cat_slots[feature_idx];
        let src_subset = Arc::clone(&src_subset);
        let info = Arc::clone(&info);
        executor.add(cost, move || {
            *slot.lock().expect("result slot lock poisoned") = Some(process_cat_feature(
                feature_idx,
                holder,
                &src_subset,
                &info,
                materialize,
            ));
            Ok(())
        });
    }

    executor.exec_tasks()?;

    let float_features = float_slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .expect("result slot lock poisoned")
                .ok_or_else(|| QuantizeError::internal("float feature task left no result"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cat_features = cat_slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .expect("result slot lock poisoned")
                .ok_or_else(|| QuantizeError::internal("cat feature task left no result"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QuantizedDataProvider::new(
        object_count,
        float_features,
        cat_features,
        info,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = QuantizationOptions::default();
        assert!(options.cpu_compatible_format);
        assert!(!options.gpu_compatible_format);
        assert_eq!(options.max_subset_size_for_slow_border_algorithms, 200_000);
        assert_eq!(options.cpu_ram_limit, u64::MAX);
        assert!(!options.shuffle_over_full_data_for_reproducibility);
    }

    #[test]
    fn test_float_estimate_components() {
        let binarization = BinarizationOptions::default();
        let none = estimate_mem_usage_for_float_feature(1000, 100, &binarization, false, false);
        assert_eq!(none, 0);

        let borders_only =
            estimate_mem_usage_for_float_feature(1000, 100, &binarization, true, false);
        assert_eq!(borders_only, 400);

        let with_dst = estimate_mem_usage_for_float_feature(1000, 100, &binarization, true, true);
        assert_eq!(with_dst, 400 + 1000);
    }

    #[test]
    fn test_cat_estimate_components() {
        assert_eq!(estimate_mem_usage_for_cat_feature(1000, false), 32_000);
        assert_eq!(estimate_mem_usage_for_cat_feature(1000, true), 32_000 + 4000);
    }

    #[test]
    fn test_pack_codes_sequential_and_parallel_agree() {
        let len = 10_000;
        let code = |i: usize| Ok((i % 251) as u64);

        let mut sequential = CompressedArray::new(len, FLOAT_BITS_PER_KEY);
        pack_codes(&mut sequential, Parallelism::Sequential, code).unwrap();

        let mut parallel = CompressedArray::new(len, FLOAT_BITS_PER_KEY);
        pack_codes(&mut parallel, Parallelism::Parallel, code).unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.get(0), 0);
        assert_eq!(sequential.get(252), 1);
    }

    #[test]
    fn test_pack_codes_propagates_errors() {
        let mut dst = CompressedArray::new(100, FLOAT_BITS_PER_KEY);
        let result = pack_codes(&mut dst, Parallelism::Sequential, |i| {
            if i == 57 {
                Err(QuantizeError::UnexpectedNan { feature: 9 })
            } else {
                Ok(0)
            }
        });
        assert!(matches!(
            result,
            Err(QuantizeError::UnexpectedNan { feature: 9 })
        ));
    }
}
