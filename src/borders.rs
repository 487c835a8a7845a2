//! Border calculation for float features.
//!
//! A float feature is quantized against an ordered list of *borders*
//! (strictly increasing thresholds). This module computes borders and the
//! effective nan mode for one column, and maps values to bucket codes.
//!
//! The bucket contract: for finite `v`, the code is the count of borders
//! `<= v` (so `v < borders[0]` gives 0 and `v >= borders[last]` gives
//! `borders.len()`). Nan values map to the extremal bucket selected by the
//! nan mode.

use bon::Builder;

use crate::error::QuantizeError;
use crate::subset::SubsetIndexing;

// =============================================================================
// Options
// =============================================================================

/// Policy for encoding nan values of a float feature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NanMode {
    /// Nan values are not allowed.
    #[default]
    Forbidden,
    /// Nans map to bucket 0; the most negative representable border is
    /// injected so no finite value shares that bucket.
    Min,
    /// Nans map to the last bucket; the most positive representable border
    /// is injected.
    Max,
}

/// Algorithm used to place border candidates over the finite values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BorderSelectionType {
    /// Equal-width borders over `[min, max]`.
    /// Fast but poor for skewed data.
    Uniform,

    /// Equal-frequency (quantile) borders.
    #[default]
    Median,

    /// Greedy splitting maximizing the sum of log bucket sizes. Better for
    /// heavy-tailed data, but superlinear in the value count, so border
    /// calculation subsamples large columns for this selector.
    GreedyLogSum,
}

impl BorderSelectionType {
    /// Whether border calculation for this selector is capped to
    /// `max_subset_size_for_slow_border_algorithms` rows.
    #[inline]
    pub fn needs_subsampling(self) -> bool {
        matches!(self, Self::GreedyLogSum)
    }

    /// Approximate scratch memory used by the selector, for the scheduler's
    /// advisory per-task estimates.
    pub(crate) fn scratch_bytes(self, border_count: u32) -> u64 {
        match self {
            // min/max scan and in-place sort of the value copy
            Self::Uniform | Self::Median => 0,
            // segment bookkeeping plus distinct-boundary index
            Self::GreedyLogSum => (border_count as u64 + 1) * 48,
        }
    }
}

/// Configuration for float feature binarization.
///
/// ```ignore
/// use binquant::BinarizationOptions;
///
/// let options = BinarizationOptions::builder()
///     .border_count(128)
///     .build();
/// ```
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
pub struct BinarizationOptions {
    /// Maximum number of computed borders per feature (default: 254, so the
    /// bucket codes plus an optional nan bucket fit in 8 bits).
    #[builder(default = 254)]
    pub border_count: u32,
    /// Border placement algorithm (default: Median).
    #[builder(default)]
    pub border_selection_type: BorderSelectionType,
    /// Configured nan policy (default: Min). The *effective* mode for a
    /// feature degrades to Forbidden when no nans are observed.
    #[builder(default = NanMode::Min)]
    pub nan_mode: NanMode,
}

impl Default for BinarizationOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

// =============================================================================
// Bucket mapping
// =============================================================================

/// Map a raw value to its bucket code.
///
/// Finite values get the count of borders `<= value` via binary search.
/// Nan requires a non-Forbidden mode and maps to bucket 0 (Min) or the last
/// bucket (Max).
#[inline]
pub fn bucket_for_value(
    value: f32,
    nan_mode: NanMode,
    borders: &[f32],
    feature_id: u32,
) -> Result<u32, QuantizeError> {
    if value.is_nan() {
        return match nan_mode {
            NanMode::Forbidden => Err(QuantizeError::UnexpectedNan {
                feature: feature_id,
            }),
            NanMode::Min => Ok(0),
            NanMode::Max => Ok(borders.len() as u32),
        };
    }
    Ok(borders.partition_point(|b| *b <= value) as u32)
}

// =============================================================================
// Border calculation
// =============================================================================

/// Compute borders and the effective nan mode for one float column.
///
/// `values` is the physical backing array; rows are reached through `subset`
/// (already composed with any border-calculation subsample). The returned
/// borders are strictly increasing, with the extremal border injected when
/// the effective nan mode is Min or Max.
pub fn calc_borders_and_nan_mode(
    feature_id: u32,
    values: &[f32],
    subset: &SubsetIndexing,
    options: &BinarizationOptions,
) -> Result<(NanMode, Vec<f32>), QuantizeError> {
    let mut finite_values = Vec::with_capacity(subset.size() as usize);
    let mut has_nans = false;

    subset.for_each(|_, physical| {
        let value = values[physical as usize];
        if value.is_nan() {
            has_nans = true;
        } else {
            finite_values.push(value);
        }
    });

    if has_nans && options.nan_mode == NanMode::Forbidden {
        return Err(QuantizeError::NansForbidden {
            feature: feature_id,
        });
    }

    let nan_mode = if has_nans {
        options.nan_mode
    } else {
        NanMode::Forbidden
    };

    let mut borders = compute_border_candidates(
        options.border_selection_type,
        &mut finite_values,
        options.border_count,
    );

    // infinite input values can produce infinite candidates; a border must
    // be finite or the extremal injection below breaks the ordering
    borders.retain(|b| b.is_finite());
    // BestSplit-style selectors can emit negative zeros
    for border in &mut borders {
        if *border == 0.0 {
            *border = 0.0;
        }
    }
    borders.sort_unstable_by(|a, b| a.partial_cmp(b).expect("nan filtered before sorting borders"));
    borders.dedup();

    match nan_mode {
        NanMode::Min => {
            if borders.first() != Some(&f32::MIN) {
                borders.insert(0, f32::MIN);
            }
        }
        NanMode::Max => {
            if borders.last() != Some(&f32::MAX) {
                borders.push(f32::MAX);
            }
        }
        NanMode::Forbidden => {}
    }
    debug_assert!(borders.windows(2).all(|w| w[0] < w[1]));

    if borders.len() >= 256 {
        return Err(QuantizeError::internal(format!(
            "feature #{}: {} borders do not fit 8-bit bucket codes",
            feature_id,
            borders.len()
        )));
    }

    Ok((nan_mode, borders))
}

/// Dispatch to the configured selector. `values` must not contain nans; the
/// slice is sorted in place by the quantile-based selectors.
pub fn compute_border_candidates(
    selection_type: BorderSelectionType,
    values: &mut [f32],
    border_count: u32,
) -> Vec<f32> {
    if values.is_empty() || border_count == 0 {
        return Vec::new();
    }
    match selection_type {
        BorderSelectionType::Uniform => uniform_borders(values, border_count),
        BorderSelectionType::Median => median_borders(values, border_count),
        BorderSelectionType::GreedyLogSum => greedy_log_sum_borders(values, border_count),
    }
}

/// Equal-width borders strictly inside `[min, max]`.
fn uniform_borders(values: &[f32], border_count: u32) -> Vec<f32> {
    let mut min_val = f64::INFINITY;
    let mut max_val = f64::NEG_INFINITY;
    for &v in values.iter().filter(|v| v.is_finite()) {
        min_val = min_val.min(v as f64);
        max_val = max_val.max(v as f64);
    }
    if !(min_val < max_val) {
        return Vec::new();
    }
    (1..=border_count)
        .map(|i| {
            (min_val + (max_val - min_val) * i as f64 / (border_count + 1) as f64) as f32
        })
        .collect()
}

/// Equal-frequency borders: value at each quantile position.
fn median_borders(values: &mut [f32], border_count: u32) -> Vec<f32> {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).expect("nan filtered before border selection"));
    let n = values.len();
    (1..=border_count)
        .map(|i| {
            let q = i as f64 / (border_count + 1) as f64;
            let idx = ((q * (n - 1) as f64).round() as usize).min(n - 1);
            values[idx]
        })
        .collect()
}

/// Greedy log-sum borders.
///
/// Starts with one segment over the sorted values and repeatedly splits the
/// segment yielding the largest `ln(n1) + ln(n2) - ln(n)` gain, always at the
/// distinct-value boundary nearest the segment midpoint. The border value is
/// the midpoint between the two values around the chosen boundary.
fn greedy_log_sum_borders(values: &mut [f32], border_count: u32) -> Vec<f32> {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).expect("nan filtered before border selection"));

    // positions p with values[p - 1] < values[p]
    let boundaries: Vec<usize> = (1..values.len())
        .filter(|&p| values[p - 1] < values[p])
        .collect();
    if boundaries.is_empty() {
        return Vec::new();
    }

    // element range plus the subrange of `boundaries` lying strictly inside it
    struct Segment {
        begin: usize,
        end: usize,
        b_lo: usize,
        b_hi: usize,
    }

    // best splittable boundary of a segment: the one nearest the midpoint
    let best_split = |seg: &Segment| -> Option<(usize, f64)> {
        if seg.b_lo >= seg.b_hi {
            return None;
        }
        let mid = (seg.begin + seg.end) / 2;
        let candidates = &boundaries[seg.b_lo..seg.b_hi];
        let pos = candidates.partition_point(|&p| p < mid);
        let mut best: Option<(usize, f64)> = None;
        for k in [pos.wrapping_sub(1), pos] {
            if k >= candidates.len() {
                continue;
            }
            let p = candidates[k];
            let n = (seg.end - seg.begin) as f64;
            let n1 = (p - seg.begin) as f64;
            let n2 = (seg.end - p) as f64;
            let gain = n1.ln() + n2.ln() - n.ln();
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((seg.b_lo + k, gain));
            }
        }
        best
    };

    let mut segments = vec![Segment {
        begin: 0,
        end: values.len(),
        b_lo: 0,
        b_hi: boundaries.len(),
    }];
    let mut borders = Vec::with_capacity(border_count as usize);

    while (borders.len() as u32) < border_count {
        let mut chosen: Option<(usize, usize, f64)> = None;
        for (seg_idx, seg) in segments.iter().enumerate() {
            if let Some((boundary_idx, gain)) = best_split(seg) {
                if chosen.map_or(true, |(_, _, g)| gain > g) {
                    chosen = Some((seg_idx, boundary_idx, gain));
                }
            }
        }
        let Some((seg_idx, boundary_idx, _)) = chosen else {
            break;
        };

        let p = boundaries[boundary_idx];
        // f64 midpoint: the f32 sum overflows for large finite neighbors
        borders.push((0.5 * (values[p - 1] as f64 + values[p] as f64)) as f32);

        let seg = segments.swap_remove(seg_idx);
        segments.push(Segment {
            begin: seg.begin,
            end: p,
            b_lo: seg.b_lo,
            b_hi: boundary_idx,
        });
        segments.push(Segment {
            begin: p,
            end: seg.end,
            b_lo: boundary_idx + 1,
            b_hi: seg.b_hi,
        });
    }

    borders
}
