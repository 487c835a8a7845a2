//! Row subsampling for border calculation.
//!
//! Superlinear border selectors cannot afford a full pass over large
//! datasets, so border calculation runs on a bounded random sample. Already
//! shuffled data gets a plain prefix; otherwise a seeded random selection is
//! drawn, optionally via a full shuffle so the chosen rows do not depend on
//! the sample size.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::borders::BorderSelectionType;
use crate::features_info::QuantizedFeaturesInfo;
use crate::provider::ObjectsOrder;
use crate::quantize::QuantizationOptions;
use crate::subset::SubsetIndexing;

/// Row budget for border calculation under a given selector.
///
/// Only selectors that are superlinear in the row count are capped; the rest
/// see every row.
pub fn sample_size_for_border_selection_type(
    object_count: u32,
    selection_type: BorderSelectionType,
    max_subset_size_for_slow_border_algorithms: u32,
) -> u32 {
    if selection_type.needs_subsampling() {
        object_count.min(max_subset_size_for_slow_border_algorithms)
    } else {
        object_count
    }
}

/// Subset of `src` to run border calculation on, or `None` when border
/// calculation either is not needed (all borders already computed) or can
/// afford the full dataset.
pub(crate) fn subset_for_build_borders(
    src: &SubsetIndexing,
    info: &QuantizedFeaturesInfo,
    objects_order: ObjectsOrder,
    options: &QuantizationOptions,
    rng: &mut impl Rng,
) -> Option<SubsetIndexing> {
    if !info.need_to_calc_borders() {
        return None;
    }

    let object_count = src.size();
    let sample_size = sample_size_for_border_selection_type(
        object_count,
        info.binarization().border_selection_type,
        options.max_subset_size_for_slow_border_algorithms,
    );
    if sample_size >= object_count {
        return None;
    }

    if objects_order == ObjectsOrder::RandomShuffled {
        return Some(src.compose(&SubsetIndexing::head(sample_size)));
    }

    let mut indices: Vec<u32> = (0..object_count).collect();
    if options.shuffle_over_full_data_for_reproducibility {
        // the selected rows stay identical for any sample size drawn from
        // the same seed
        indices.shuffle(rng);
    } else {
        for i in 0..sample_size as usize {
            let j = rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
    }
    indices.truncate(sample_size as usize);

    Some(src.compose(&SubsetIndexing::Indexed(indices)))
}
