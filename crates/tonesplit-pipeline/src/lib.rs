//! tonesplit-pipeline: Pure tonal decomposition engine (sans-IO).
//!
//! Splits a photograph into four reference images by brightness:
//! decode -> luminosity -> percentile thresholds -> per-range rendering.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and pixel buffers and returns structured data. Encoding
//! the finished images lives behind the [`ArtifactEncoder`] trait
//! (implemented by `tonesplit-export`); file and browser interaction
//! lives in the binaries.
//!
//! ```rust
//! # use tonesplit_pipeline::{PixelBuffer, TonalRange, compute_thresholds, render_range};
//! # fn run() -> Result<(), tonesplit_pipeline::PipelineError> {
//! let image = PixelBuffer::from_raw(2, 1, vec![20, 20, 20, 255, 220, 220, 220, 255])?;
//! let thresholds = compute_thresholds(&image);
//! let highlights = render_range(&image, &thresholds, TonalRange::Highlights)?;
//! assert_eq!(highlights.pixel(1, 0), Some([220, 220, 220, 255]));
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod decode;
pub mod diagnostics;
pub mod engine;
pub mod luminosity;
pub mod observer;
pub mod threshold;
pub mod types;

pub use classify::{RangeCoverage, RenderStrategy, RenderedRange, render_all, render_range};
pub use decode::{SourceFormat, SourceLimits, decode, validate_source};
pub use engine::{
    ArtifactEncoder, Decomposition, EngineConfig, ProcessOutcome, artifact_name, base_name,
    decompose, process, process_image,
};
pub use luminosity::luminosity;
pub use observer::{ProgressObserver, StageEvent};
pub use threshold::compute_thresholds;
pub use types::{
    Dimensions, ErrorKind, PipelineError, PixelBuffer, ProcessedImage, RgbaImage, ThresholdSet,
    TonalRange, TonalRanges,
};
