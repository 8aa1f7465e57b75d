//! Decomposition diagnostics: per-stage timing and coverage.
//!
//! [`DiagnosticsRecorder`] is a [`ProgressObserver`] that timestamps
//! every stage event. Each stage's duration is the time elapsed since the
//! previous event, so the decode stage covers everything from the
//! recorder's creation until the image was decoded.
//!
//! Time is read through the [`Clock`] trait so native callers can use
//! `std::time::Instant` and WASM callers `web_time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observer::{ProgressObserver, StageEvent};
use crate::types::{Dimensions, ThresholdSet, TonalRange, TonalRanges};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }

    /// `Option<Duration>` as optional fractional seconds.
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            duration.map(|d| d.as_secs_f64()).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<f64>::deserialize(deserializer)?
                .map(|secs| {
                    Duration::try_from_secs_f64(secs)
                        .map_err(|_| serde::de::Error::custom("invalid duration seconds"))
                })
                .transpose()
        }
    }
}

/// Source of timestamps.
pub trait Clock {
    /// A point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics for one tonal range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeDiagnostics {
    /// Time spent rendering.
    #[serde(with = "duration_serde::option")]
    pub render: Option<Duration>,
    /// Time spent encoding.
    #[serde(with = "duration_serde::option")]
    pub encode: Option<Duration>,
    /// Pixels inside the range.
    pub included_pixels: Option<u64>,
    /// Failure message, if the range failed.
    pub error: Option<String>,
}

/// Diagnostics collected from a single decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionDiagnostics {
    /// Decoded image dimensions, if decoding completed.
    pub dimensions: Option<Dimensions>,
    /// Thresholds, if they were computed.
    pub thresholds: Option<ThresholdSet>,
    /// Time until the image was decoded.
    #[serde(with = "duration_serde::option")]
    pub decode: Option<Duration>,
    /// Time spent deriving thresholds.
    #[serde(with = "duration_serde::option")]
    pub threshold: Option<Duration>,
    /// Time spent in the single fused render pass, when one was used.
    /// Per-range render times are left unset in that case.
    #[serde(with = "duration_serde::option")]
    pub fused_render: Option<Duration>,
    /// Per-range metrics.
    pub ranges: TonalRanges<RangeDiagnostics>,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Records stage timings while observing an engine run.
pub struct DiagnosticsRecorder<'a, C: Clock> {
    clock: &'a C,
    started: C::Instant,
    last: C::Instant,
    fused: bool,
    diagnostics: DecompositionDiagnostics,
}

impl<'a, C: Clock> DiagnosticsRecorder<'a, C> {
    /// Start recording now.
    pub fn new(clock: &'a C) -> Self {
        Self {
            clock,
            started: clock.now(),
            last: clock.now(),
            fused: false,
            diagnostics: DecompositionDiagnostics {
                dimensions: None,
                thresholds: None,
                decode: None,
                threshold: None,
                fused_render: None,
                ranges: TonalRanges::from_fn(|_| RangeDiagnostics::default()),
                total_duration: Duration::ZERO,
            },
        }
    }

    /// Stop recording and return the collected diagnostics.
    #[must_use]
    pub fn finish(mut self) -> DecompositionDiagnostics {
        self.diagnostics.total_duration = self.clock.elapsed(&self.started);
        self.diagnostics
    }

    fn lap(&mut self) -> Duration {
        let elapsed = self.clock.elapsed(&self.last);
        self.last = self.clock.now();
        elapsed
    }
}

impl<C: Clock> ProgressObserver for DiagnosticsRecorder<'_, C> {
    fn on_event(&mut self, event: &StageEvent) {
        let lap = self.lap();
        let diagnostics = &mut self.diagnostics;
        match event {
            StageEvent::Decoded { dimensions } => {
                diagnostics.dimensions = Some(*dimensions);
                diagnostics.decode = Some(lap);
            }
            StageEvent::ThresholdsComputed(thresholds) => {
                diagnostics.thresholds = Some(*thresholds);
                diagnostics.threshold = Some(lap);
            }
            StageEvent::FusedPassRendered => {
                self.fused = true;
                diagnostics.fused_render = Some(lap);
            }
            StageEvent::RangeRendered {
                range,
                included_pixels,
            } => {
                let entry = diagnostics.ranges.get_mut(*range);
                if !self.fused {
                    entry.render = Some(lap);
                }
                entry.included_pixels = Some(*included_pixels);
            }
            StageEvent::RangeEncoded { range } => {
                diagnostics.ranges.get_mut(*range).encode = Some(lap);
            }
            StageEvent::RangeFailed { range, message } => {
                diagnostics.ranges.get_mut(*range).error = Some(message.clone());
            }
            StageEvent::Complete => {}
        }
    }
}

impl DecompositionDiagnostics {
    /// Percentage of all pixels that fell inside `range`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage_percent(&self, range: TonalRange) -> Option<f64> {
        let total = self.dimensions?.pixel_count();
        let included = self.ranges.get(range).included_pixels?;
        (total > 0).then(|| included as f64 / total as f64 * 100.0)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Tonal Decomposition Report\n{}", "=".repeat(60)));
        if let Some(d) = self.dimensions {
            lines.push(format!(
                "Image: {}x{} ({} pixels)",
                d.width,
                d.height,
                d.pixel_count()
            ));
        }
        if let Some(t) = self.thresholds {
            lines.push(format!(
                "Thresholds: darks < {:.2} <= shadows < {:.2} <= midtones < {:.2} <= highlights",
                t.darks_max(),
                t.midtones_min(),
                t.highlights_min(),
            ));
        }
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>11} {:>11} {:>10}  {}",
            "Stage", "Render", "Encode", "Coverage", "Details"
        ));
        lines.push("-".repeat(70));

        lines.push(format!(
            "{:<12} {:>9.3}ms",
            "Decode",
            self.decode.map_or(0.0, duration_ms)
        ));
        lines.push(format!(
            "{:<12} {:>9.3}ms",
            "Thresholds",
            self.threshold.map_or(0.0, duration_ms)
        ));
        if let Some(fused) = self.fused_render {
            lines.push(format!(
                "{:<12} {:>9.3}ms  (all ranges, one pass)",
                "Fused",
                duration_ms(fused)
            ));
        }

        for (range, diag) in self.ranges.iter() {
            let render = diag
                .render
                .map_or_else(|| "-".to_owned(), |d| format!("{:.3}ms", duration_ms(d)));
            let encode = diag
                .encode
                .map_or_else(|| "-".to_owned(), |d| format!("{:.3}ms", duration_ms(d)));
            let coverage = self
                .coverage_percent(range)
                .map_or_else(|| "-".to_owned(), |pct| format!("{pct:.1}%"));
            let details = match (&diag.error, diag.included_pixels) {
                (Some(error), _) => format!("FAILED: {error}"),
                (None, Some(count)) => format!("{count} pixels"),
                (None, None) => String::new(),
            };
            lines.push(format!(
                "{:<12} {render:>11} {encode:>11} {coverage:>10}  {details}",
                range.name()
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
