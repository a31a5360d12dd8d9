//! A collection of small statistics helpers on arrays and slices of pixels,
//! shared by the reference-image computation and the noise estimate.

use ndarray::ArrayView2;

use crate::Float;

/// `NaN` is the only value that does not compare equal to itself.
pub(crate) fn is_nan<F: Float>(value: F) -> bool {
    value != value
}

fn mean<F: Float>(values: &[F]) -> F {
    if values.is_empty() {
        return F::from_f64(f64::NAN).unwrap();
    }
    let sum = values.iter().copied().fold(F::zero(), |acc, v| acc + v);
    sum / F::from_usize(values.len()).unwrap()
}

/// Mean and sample standard deviation. The deviation of fewer than two values is zero.
pub(crate) fn mean_std<F: Float>(values: &[F]) -> (F, F) {
    let mean = mean(values);
    if values.len() < 2 {
        return (mean, F::zero());
    }
    let sum_sq = values
        .iter()
        .map(|&v| (v - mean) * (v - mean))
        .fold(F::zero(), |acc, v| acc + v);
    let var = sum_sq / F::from_usize(values.len() - 1).unwrap();
    (mean, var.sqrt())
}

/// Ratio of the standard deviation to the interquartile range of a normal distribution.
const IQR_TO_STDDEV: f64 = 0.741301;

/// Value at `fraction` of the way through a sorted sample, linearly interpolated.
fn percentile<F: Float>(sorted: &[F], fraction: f64) -> F {
    let position = fraction * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let weight = F::from_f64(position - position.floor()).unwrap();
    sorted[below] + (sorted[above] - sorted[below]) * weight
}

/// Median and a standard deviation estimated from the interquartile range.
///
/// The quartile estimate is insensitive to the tails of the sample, so the clip bounds derived
/// from it cannot be widened by the very outliers they are meant to reject.
fn median_and_iqr_std<F: Float>(values: &[F]) -> (F, F) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let iqr = percentile(&sorted, 0.75) - percentile(&sorted, 0.25);
    (
        percentile(&sorted, 0.5),
        iqr * F::from_f64(IQR_TO_STDDEV).unwrap(),
    )
}

/// Iteratively sigma-clipped mean of a small sample.
///
/// Values farther than `num_sigma_clip` deviations from the current center are rejected for up
/// to `num_iter` rounds. The first round clips about the median with an interquartile-range
/// deviation estimate, later rounds about the mean and standard deviation of the retained set.
/// With `nan_safe`, `NaN` values are dropped up front; otherwise a single `NaN` poisons the
/// result, matching the unclipped statistics convention.
pub(crate) fn sigma_clipped_mean<F: Float>(
    values: &[F],
    num_sigma_clip: F,
    num_iter: usize,
    nan_safe: bool,
) -> F {
    let mut keep: Vec<F> = if nan_safe {
        values.iter().copied().filter(|&v| !is_nan(v)).collect()
    } else {
        values.to_vec()
    };
    if keep.is_empty() || keep.iter().copied().any(is_nan) {
        return mean(&keep);
    }

    for iteration in 0..num_iter {
        let (center, std) = if iteration == 0 {
            median_and_iqr_std(&keep)
        } else {
            mean_std(&keep)
        };
        let retained: Vec<F> = keep
            .iter()
            .copied()
            .filter(|&v| (v - center).abs() <= num_sigma_clip * std)
            .collect();
        if retained.len() == keep.len() || retained.is_empty() {
            break;
        }
        keep = retained;
    }

    mean(&keep)
}

/// Standard deviation of the pixels whose mask value has none of `exclude_bits` set.
pub(crate) fn masked_std<F: Float>(
    image: ArrayView2<F>,
    mask: ArrayView2<u32>,
    exclude_bits: u32,
    nan_safe: bool,
) -> F {
    let values: Vec<F> = image
        .iter()
        .zip(mask.iter())
        .filter(|&(&v, &m)| m & exclude_bits == 0 && !(nan_safe && is_nan(v)))
        .map(|(&v, _)| v)
        .collect();
    mean_std(&values).1
}
