//! Tonal classification and rendering.
//!
//! Each pixel's brightness is tested against the range's half-open
//! interval:
//!
//! | Range      | Included when                                  |
//! |------------|------------------------------------------------|
//! | darks      | `L < shadows_max * 0.5`                        |
//! | shadows    | `shadows_max * 0.5 <= L < midtones_min`        |
//! | midtones   | `midtones_min <= L < midtones_max`             |
//! | highlights | `L >= highlights_min`                          |
//!
//! Included pixels become grey at their brightness. Excluded pixels are
//! opaque white, except in the highlights image where they are opaque
//! black and included pixels are forced opaque, so highlights read as a
//! map of where the light falls.
//!
//! Two equivalent strategies are provided: [`render_range`] re-scans the
//! whole input once per range, [`render_all`] computes brightness once
//! per pixel and writes all four outputs in a single pass. Both produce
//! identical bytes.

use serde::{Deserialize, Serialize};

use crate::luminosity::{luminosity, to_gray};
use crate::types::{Dimensions, PipelineError, PixelBuffer, ThresholdSet, TonalRange, TonalRanges};

/// Background for excluded pixels in the highlights image.
pub const HIGHLIGHTS_BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Background for excluded pixels in the midtones, shadows, and darks
/// images.
pub const PAGE_BACKGROUND: [u8; 4] = [255, 255, 255, 255];

/// Included pixel count per range.
pub type RangeCoverage = TonalRanges<u64>;

/// How the four range images are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStrategy {
    /// One independent full pass per range.
    #[default]
    FourPass,
    /// A single pass emitting all four outputs.
    Fused,
}

/// A rendered range image together with how many pixels it includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRange {
    /// The output image.
    pub image: PixelBuffer,
    /// Number of input pixels that fell inside the range.
    pub included_pixels: u64,
}

impl TonalRange {
    /// Whether brightness `l` falls inside this range.
    #[must_use]
    pub fn includes(self, l: f64, thresholds: &ThresholdSet) -> bool {
        match self {
            Self::Darks => l < thresholds.darks_max(),
            Self::Shadows => l >= thresholds.darks_max() && l < thresholds.midtones_min(),
            Self::Midtones => l >= thresholds.midtones_min() && l < thresholds.midtones_max(),
            Self::Highlights => l >= thresholds.highlights_min(),
        }
    }

    /// Output RGBA for a pixel of brightness `l` and source alpha `alpha`.
    #[must_use]
    pub fn render_pixel(self, included: bool, l: f64, alpha: u8) -> [u8; 4] {
        match (self, included) {
            (Self::Highlights, true) => {
                let gray = to_gray(l);
                [gray, gray, gray, 255]
            }
            (Self::Highlights, false) => HIGHLIGHTS_BACKGROUND,
            (_, true) => {
                let gray = to_gray(l);
                [gray, gray, gray, alpha]
            }
            (_, false) => PAGE_BACKGROUND,
        }
    }
}

/// Render one range as an independent full pass over `image`.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the output buffer cannot be
/// allocated.
pub fn render_range(
    image: &PixelBuffer,
    thresholds: &ThresholdSet,
    range: TonalRange,
) -> Result<PixelBuffer, PipelineError> {
    render_range_counted(image, thresholds, range).map(|rendered| rendered.image)
}

/// [`render_range`], also reporting the included pixel count.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the output buffer cannot be
/// allocated.
pub fn render_range_counted(
    image: &PixelBuffer,
    thresholds: &ThresholdSet,
    range: TonalRange,
) -> Result<RenderedRange, PipelineError> {
    let dimensions = image.dimensions();
    let mut out = allocate(dimensions)?;
    let mut included_pixels = 0;
    for [r, g, b, a] in image.pixels() {
        let l = luminosity(r, g, b);
        let included = range.includes(l, thresholds);
        included_pixels += u64::from(included);
        out.extend_from_slice(&range.render_pixel(included, l, a));
    }
    Ok(RenderedRange {
        image: PixelBuffer::from_raw(dimensions.width, dimensions.height, out)?,
        included_pixels,
    })
}

/// Render all four ranges in one pass over `image`.
///
/// # Errors
///
/// Returns the first range's [`PipelineError::Allocation`] if any output
/// buffer cannot be allocated.
pub fn render_all(
    image: &PixelBuffer,
    thresholds: &ThresholdSet,
) -> Result<TonalRanges<PixelBuffer>, PipelineError> {
    let TonalRanges {
        highlights,
        midtones,
        shadows,
        darks,
    } = render_fused(image, thresholds);
    Ok(TonalRanges {
        highlights: highlights?.image,
        midtones: midtones?.image,
        shadows: shadows?.image,
        darks: darks?.image,
    })
}

/// Single-pass rendering with an independent result per range: a range
/// whose buffer cannot be allocated fails alone.
pub fn render_fused(
    image: &PixelBuffer,
    thresholds: &ThresholdSet,
) -> TonalRanges<Result<RenderedRange, PipelineError>> {
    let dimensions = image.dimensions();
    let mut outputs = TonalRanges::from_fn(|_| allocate(dimensions));
    let mut counts = RangeCoverage::from_fn(|_| 0);

    for [r, g, b, a] in image.pixels() {
        let l = luminosity(r, g, b);
        for range in TonalRange::ALL {
            if let Ok(out) = outputs.get_mut(range) {
                let included = range.includes(l, thresholds);
                *counts.get_mut(range) += u64::from(included);
                out.extend_from_slice(&range.render_pixel(included, l, a));
            }
        }
    }

    outputs.map(|range, out| {
        let pixels = out?;
        Ok(RenderedRange {
            image: PixelBuffer::from_raw(dimensions.width, dimensions.height, pixels)?,
            included_pixels: *counts.get(range),
        })
    })
}

/// Render every range with the chosen strategy.
pub fn render(
    image: &PixelBuffer,
    thresholds: &ThresholdSet,
    strategy: RenderStrategy,
) -> TonalRanges<Result<RenderedRange, PipelineError>> {
    match strategy {
        RenderStrategy::FourPass => {
            TonalRanges::from_fn(|range| render_range_counted(image, thresholds, range))
        }
        RenderStrategy::Fused => render_fused(image, thresholds),
    }
}

/// Reserve an RGBA output buffer without aborting on exhaustion.
fn allocate(dimensions: Dimensions) -> Result<Vec<u8>, PipelineError> {
    let error = || PipelineError::Allocation {
        width: dimensions.width,
        height: dimensions.height,
    };
    let len = usize::try_from(dimensions.pixel_count())
        .ok()
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(error)?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| error())?;
    Ok(buffer)
}
