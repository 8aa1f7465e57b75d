//! Percentile-based threshold derivation.
//!
//! The break points adapt to each image's own brightness distribution:
//! `shadows_max` is the brightness at index `floor(0.25 * N)` of the
//! sorted samples and `midtones_max` the brightness at
//! `floor(0.75 * N)`. A dark photo and a bright photo therefore both get
//! a meaningful four-way split.

use crate::luminosity::brightness_samples;
use crate::types::{PixelBuffer, ThresholdSet};

/// Index of the 25th percentile sample in a sorted sequence of `n`.
#[must_use]
pub const fn lower_quartile_index(n: usize) -> usize {
    n / 4
}

/// Index of the 75th percentile sample in a sorted sequence of `n`.
///
/// `3n / 4` in integers is exactly `floor(0.75 * n)` and stays below
/// `n` for every `n >= 1`.
#[must_use]
pub const fn upper_quartile_index(n: usize) -> usize {
    n.saturating_mul(3) / 4
}

/// Derive the threshold set for an image.
///
/// A valid [`PixelBuffer`] always has at least one pixel, so this never
/// fails.
#[must_use]
pub fn compute_thresholds(image: &PixelBuffer) -> ThresholdSet {
    let samples = brightness_samples(image);
    let n = samples.len();
    let thresholds = thresholds_from_samples(samples)
        .unwrap_or_else(|| ThresholdSet::from_breakpoints(0.0, 0.0));
    log::debug!(
        "thresholds from {n} samples: shadows_max={:.3} midtones_max={:.3}",
        thresholds.shadows_max(),
        thresholds.midtones_max(),
    );
    thresholds
}

/// Derive thresholds from raw brightness samples.
///
/// Returns `None` for an empty sample set.
#[must_use]
pub fn thresholds_from_samples(mut samples: Vec<f64>) -> Option<ThresholdSet> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable_by(f64::total_cmp);
    let n = samples.len();
    let shadows_max = samples[lower_quartile_index(n)];
    let midtones_max = samples[upper_quartile_index(n)];
    Some(ThresholdSet::from_breakpoints(shadows_max, midtones_max))
}
