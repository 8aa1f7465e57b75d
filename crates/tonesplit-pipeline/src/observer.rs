//! Stage notifications for progress reporting.
//!
//! The engine tells an observer when each stage finishes. Observers only
//! watch: nothing they do can change what the engine computes.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ThresholdSet, TonalRange};

/// A stage boundary reached by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageEvent {
    /// The source was decoded.
    Decoded {
        /// Dimensions of the decoded image.
        dimensions: Dimensions,
    },
    /// Thresholds were derived from the brightness distribution.
    ThresholdsComputed(ThresholdSet),
    /// A single fused pass rendered all four ranges at once.
    ///
    /// Followed by one [`StageEvent::RangeRendered`] or
    /// [`StageEvent::RangeFailed`] per range, which carry no render time
    /// of their own.
    FusedPassRendered,
    /// One range image finished rendering.
    RangeRendered {
        /// The range that was rendered.
        range: TonalRange,
        /// Pixels that fell inside the range.
        included_pixels: u64,
    },
    /// One range image was turned into its deliverable artifact.
    RangeEncoded {
        /// The range that was encoded.
        range: TonalRange,
    },
    /// One range could not be rendered or encoded.
    RangeFailed {
        /// The range that failed.
        range: TonalRange,
        /// Human-readable failure description.
        message: String,
    },
    /// Every range has been attempted.
    Complete,
}

impl StageEvent {
    /// Overall progress in percent when this event fires.
    ///
    /// Decoding ends at 25%, thresholds at 50%, and the four ranges
    /// share the last quarter in processing order. A fused pass reports
    /// 75%, the point where per-range progress begins.
    #[must_use]
    pub fn progress(&self) -> f64 {
        match self {
            Self::Decoded { .. } => 25.0,
            Self::ThresholdsComputed(_) => 50.0,
            Self::FusedPassRendered => 75.0,
            Self::RangeRendered { range, .. }
            | Self::RangeEncoded { range }
            | Self::RangeFailed { range, .. } => range_progress(*range),
            Self::Complete => 100.0,
        }
    }

    /// Human-readable description of the work that follows this event.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Decoded { .. } => "Analyzing brightness values...".to_owned(),
            Self::ThresholdsComputed(_) => "Calculating tonal thresholds...".to_owned(),
            Self::FusedPassRendered => "Rendered all ranges in one pass".to_owned(),
            Self::RangeRendered { range, .. } => format!("Generating {range} image..."),
            Self::RangeEncoded { range } => format!("Encoded {range} image"),
            Self::RangeFailed { range, message } => format!("Failed {range} image: {message}"),
            Self::Complete => "Complete!".to_owned(),
        }
    }
}

/// Progress after `range` is done: `75 + (i + 1) * 25 / 4`.
#[allow(clippy::cast_precision_loss)]
fn range_progress(range: TonalRange) -> f64 {
    let done = (range.index() + 1) as f64;
    let total = TonalRange::ALL.len() as f64;
    done.mul_add(25.0 / total, 75.0)
}

/// Receives stage events from the engine.
pub trait ProgressObserver {
    /// Called once per stage boundary, in order.
    fn on_event(&mut self, event: &StageEvent);
}

/// The no-op observer.
impl ProgressObserver for () {
    fn on_event(&mut self, _event: &StageEvent) {}
}

impl<F: FnMut(&StageEvent)> ProgressObserver for F {
    fn on_event(&mut self, event: &StageEvent) {
        self(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_share_the_last_quarter_evenly() {
        let steps: Vec<f64> = TonalRange::ALL
            .into_iter()
            .map(|range| {
                StageEvent::RangeRendered {
                    range,
                    included_pixels: 0,
                }
                .progress()
            })
            .collect();
        assert_eq!(steps.len(), 4);
        for (actual, expected) in steps.iter().zip([81.25, 87.5, 93.75, 100.0]) {
            assert!((actual - expected).abs() < 1e-12, "{actual} != {expected}");
        }
    }

    #[test]
    fn fixed_stage_progress() {
        let decoded = StageEvent::Decoded {
            dimensions: Dimensions {
                width: 1,
                height: 1,
            },
        };
        assert!((decoded.progress() - 25.0).abs() < f64::EPSILON);
        let thresholds = StageEvent::ThresholdsComputed(ThresholdSet::from_breakpoints(1.0, 2.0));
        assert!((thresholds.progress() - 50.0).abs() < f64::EPSILON);
        assert!((StageEvent::FusedPassRendered.progress() - 75.0).abs() < f64::EPSILON);
        assert!((StageEvent::Complete.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn labels_name_the_range() {
        let event = StageEvent::RangeRendered {
            range: TonalRange::Midtones,
            included_pixels: 3,
        };
        assert_eq!(event.label(), "Generating midtones image...");
        assert_eq!(StageEvent::Complete.label(), "Complete!");
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &StageEvent| seen.push(event.clone());
            observer.on_event(&StageEvent::Complete);
        }
        assert_eq!(seen, vec![StageEvent::Complete]);
    }
}
