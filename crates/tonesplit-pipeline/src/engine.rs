//! End-to-end decomposition: source bytes in, four artifacts out.
//!
//! Thresholds are computed once per image and shared read-only by every
//! range. Ranges are rendered and encoded independently: a range that
//! fails to allocate or encode is reported on its own while the others
//! are still delivered. A failed range never yields a partial image.

use serde::{Deserialize, Serialize};

use crate::classify::{RenderStrategy, RenderedRange, render_fused, render_range_counted};
use crate::decode::{SourceLimits, decode, validate_source};
use crate::observer::{ProgressObserver, StageEvent};
use crate::threshold::compute_thresholds;
use crate::types::{
    Dimensions, PipelineError, PixelBuffer, ProcessedImage, ThresholdSet, TonalRange, TonalRanges,
};

/// File extension of every deliverable artifact.
pub const ARTIFACT_EXTENSION: &str = "jpg";

/// Base name used when the source file name has none.
pub const FALLBACK_BASE_NAME: &str = "image";

/// Engine configuration.
///
/// Thresholds are always derived from the image; only the execution
/// strategy and source limits are configurable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How the four range images are rendered.
    #[serde(default)]
    pub render_strategy: RenderStrategy,
    /// Limits applied to source files before decoding.
    #[serde(default)]
    pub limits: SourceLimits,
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `limits.max_bytes` is
    /// zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.limits.max_bytes == 0 {
            return Err(PipelineError::InvalidConfig(
                "limits.max_bytes must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Turns a finished range image into a deliverable artifact.
pub trait ArtifactEncoder {
    /// The deliverable form (file bytes, URL, ...).
    type Artifact;
    /// Encoder failure.
    type Error: std::error::Error;

    /// Encode one finished range image.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error when serialization fails.
    fn encode(&self, image: &PixelBuffer) -> Result<Self::Artifact, Self::Error>;
}

/// Rendered range images of one source, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Dimensions shared by the input and all outputs.
    pub dimensions: Dimensions,
    /// Thresholds shared by all four ranges.
    pub thresholds: ThresholdSet,
    /// One render result per range.
    pub ranges: TonalRanges<Result<RenderedRange, PipelineError>>,
}

/// Result of processing one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome<A> {
    /// Dimensions of the decoded source.
    pub dimensions: Dimensions,
    /// Thresholds shared by all four ranges.
    pub thresholds: ThresholdSet,
    /// Included pixel count per range; `None` where rendering failed.
    pub coverage: TonalRanges<Option<u64>>,
    /// One artifact or error per range.
    pub images: TonalRanges<Result<ProcessedImage<A>, PipelineError>>,
}

impl<A> ProcessOutcome<A> {
    /// The first per-range error in processing order, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&PipelineError> {
        self.images.iter().find_map(|(_, result)| result.as_ref().err())
    }

    /// `true` when all four ranges produced an artifact.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.first_error().is_none()
    }

    /// Successfully produced images in processing order.
    pub fn successes(&self) -> impl Iterator<Item = &ProcessedImage<A>> {
        self.images.iter().filter_map(|(_, result)| result.as_ref().ok())
    }
}

/// Base name of a source file: everything before the first `.`.
///
/// Falls back to [`FALLBACK_BASE_NAME`] when that is empty.
#[must_use]
pub fn base_name(file_name: &str) -> &str {
    match file_name.split('.').next() {
        Some(base) if !base.is_empty() => base,
        _ => FALLBACK_BASE_NAME,
    }
}

/// Deliverable file name for one range: `{base}_{range}.jpg`.
#[must_use]
pub fn artifact_name(base: &str, range: TonalRange) -> String {
    format!("{base}_{}.{ARTIFACT_EXTENSION}", range.name())
}

/// Compute thresholds and render all four ranges of a decoded image.
pub fn decompose(
    image: &PixelBuffer,
    strategy: RenderStrategy,
    observer: &mut impl ProgressObserver,
) -> Decomposition {
    let dimensions = image.dimensions();
    observer.on_event(&StageEvent::Decoded { dimensions });

    let thresholds = compute_thresholds(image);
    observer.on_event(&StageEvent::ThresholdsComputed(thresholds));

    let ranges = match strategy {
        RenderStrategy::FourPass => TonalRanges::from_fn(|range| {
            let rendered = render_range_counted(image, &thresholds, range);
            notify_rendered(observer, range, &rendered);
            rendered
        }),
        RenderStrategy::Fused => {
            let ranges = render_fused(image, &thresholds);
            observer.on_event(&StageEvent::FusedPassRendered);
            for (range, rendered) in ranges.iter() {
                notify_rendered(observer, range, rendered);
            }
            ranges
        }
    };

    Decomposition {
        dimensions,
        thresholds,
        ranges,
    }
}

/// Validate, decode, decompose, and encode one source file.
///
/// # Errors
///
/// Returns an error, before any range is processed, if the configuration
/// is invalid or the source cannot be validated or decoded. Per-range
/// failures are reported inside [`ProcessOutcome::images`].
pub fn process<E: ArtifactEncoder>(
    bytes: &[u8],
    file_name: &str,
    config: &EngineConfig,
    encoder: &E,
    observer: &mut impl ProgressObserver,
) -> Result<ProcessOutcome<E::Artifact>, PipelineError> {
    config.validate()?;
    validate_source(bytes, &config.limits)?;
    let image = decode(bytes)?;
    Ok(process_image(
        &image,
        file_name,
        config.render_strategy,
        encoder,
        observer,
    ))
}

/// Decompose and encode an already-decoded image.
pub fn process_image<E: ArtifactEncoder>(
    image: &PixelBuffer,
    file_name: &str,
    strategy: RenderStrategy,
    encoder: &E,
    observer: &mut impl ProgressObserver,
) -> ProcessOutcome<E::Artifact> {
    let base = base_name(file_name);
    let Decomposition {
        dimensions,
        thresholds,
        ranges,
    } = decompose(image, strategy, observer);

    let coverage = TonalRanges::from_fn(|range| {
        ranges
            .get(range)
            .as_ref()
            .ok()
            .map(|rendered| rendered.included_pixels)
    });

    let images = encode_ranges(ranges, base, encoder, observer);

    observer.on_event(&StageEvent::Complete);

    ProcessOutcome {
        dimensions,
        thresholds,
        coverage,
        images,
    }
}

/// Encode every successfully rendered range; failed renders pass through.
fn encode_ranges<E: ArtifactEncoder>(
    ranges: TonalRanges<Result<RenderedRange, PipelineError>>,
    base: &str,
    encoder: &E,
    observer: &mut impl ProgressObserver,
) -> TonalRanges<Result<ProcessedImage<E::Artifact>, PipelineError>> {
    ranges.map(|range, rendered| {
        let result = rendered.and_then(|rendered| {
            let artifact = encoder
                .encode(&rendered.image)
                .map_err(|e| PipelineError::Encode {
                    range,
                    message: e.to_string(),
                })?;
            Ok(ProcessedImage {
                name: artifact_name(base, range),
                range,
                image: rendered.image,
                artifact,
            })
        });
        match &result {
            Ok(_) => observer.on_event(&StageEvent::RangeEncoded { range }),
            Err(e @ PipelineError::Encode { .. }) => notify_failed(observer, range, e),
            // Render failures were already reported.
            Err(_) => {}
        }
        result
    })
}

fn notify_rendered(
    observer: &mut impl ProgressObserver,
    range: TonalRange,
    rendered: &Result<RenderedRange, PipelineError>,
) {
    match rendered {
        Ok(rendered) => {
            log::debug!("{range}: {} pixels included", rendered.included_pixels);
            observer.on_event(&StageEvent::RangeRendered {
                range,
                included_pixels: rendered.included_pixels,
            });
        }
        Err(e) => notify_failed(observer, range, e),
    }
}

fn notify_failed(observer: &mut impl ProgressObserver, range: TonalRange, error: &PipelineError) {
    log::warn!("{range} image failed: {error}");
    observer.on_event(&StageEvent::RangeFailed {
        range,
        message: error.to_string(),
    });
}
