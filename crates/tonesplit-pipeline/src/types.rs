//! Shared types for the tonesplit decomposition engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can build and inspect
/// pixel buffers without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A decoded RGBA8 image: row-major, top-left origin, four bytes per
/// pixel.
///
/// Always has a non-zero width and height, and a byte length of exactly
/// `width * height * 4`. The engine only ever reads an input buffer;
/// every stage allocates a fresh buffer for its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer(RgbaImage);

impl PixelBuffer {
    /// Build a buffer from raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidBuffer`] if either dimension is
    /// zero or `pixels.len() != width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, PipelineError> {
        let dimensions = Dimensions { width, height };
        check_non_empty(dimensions)?;
        let expected = dimensions.pixel_count() * 4;
        if u64::try_from(pixels.len()).ok() != Some(expected) {
            return Err(PipelineError::InvalidBuffer(format!(
                "expected {expected} bytes for a {width}x{height} RGBA image, got {}",
                pixels.len(),
            )));
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(Self)
            .ok_or_else(|| {
                PipelineError::InvalidBuffer(format!("{width}x{height} does not fit in memory"))
            })
    }

    /// Wrap an already-decoded RGBA image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidBuffer`] if the image has a zero
    /// dimension.
    pub fn from_rgba(image: RgbaImage) -> Result<Self, PipelineError> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.into_raw())
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height together.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Number of pixels in the buffer.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.0.as_raw().len() / 4
    }

    /// The raw RGBA bytes in row-major order.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Borrow the underlying `image` buffer.
    #[must_use]
    pub const fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    /// The `[R, G, B, A]` value at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.0.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Iterate over pixels as `[R, G, B, A]` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.0.pixels().map(|p| p.0)
    }

    /// Consume the buffer and return the underlying `image` buffer.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.0
    }
}

fn check_non_empty(dimensions: Dimensions) -> Result<(), PipelineError> {
    if dimensions.width == 0 || dimensions.height == 0 {
        return Err(PipelineError::InvalidBuffer(format!(
            "image has zero size ({}x{})",
            dimensions.width, dimensions.height,
        )));
    }
    Ok(())
}

/// Serde proxy: raster data as `(width, height, bytes)`.
#[derive(Serialize, Deserialize)]
struct PixelBufferProxy(u32, u32, Vec<u8>);

impl Serialize for PixelBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PixelBufferProxy(self.width(), self.height(), self.as_raw().to_vec()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PixelBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let PixelBufferProxy(width, height, pixels) = PixelBufferProxy::deserialize(deserializer)?;
        Self::from_raw(width, height, pixels).map_err(serde::de::Error::custom)
    }
}

/// The three brightness break points of one image, exposed as the four
/// named boundaries of the tonal ranges.
///
/// `midtones_min == shadows_max` and `highlights_min == midtones_max`
/// always hold: the only constructor takes the two independent break
/// points, and deserialization rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct ThresholdSet {
    shadows_max: f64,
    midtones_min: f64,
    midtones_max: f64,
    highlights_min: f64,
}

impl ThresholdSet {
    /// Build a threshold set from the 25th and 75th percentile
    /// brightness values.
    #[must_use]
    pub const fn from_breakpoints(shadows_max: f64, midtones_max: f64) -> Self {
        Self {
            shadows_max,
            midtones_min: shadows_max,
            midtones_max,
            highlights_min: midtones_max,
        }
    }

    /// Upper (exclusive) bound of the shadows range.
    #[must_use]
    pub const fn shadows_max(&self) -> f64 {
        self.shadows_max
    }

    /// Lower (inclusive) bound of the midtones range.
    #[must_use]
    pub const fn midtones_min(&self) -> f64 {
        self.midtones_min
    }

    /// Upper (exclusive) bound of the midtones range.
    #[must_use]
    pub const fn midtones_max(&self) -> f64 {
        self.midtones_max
    }

    /// Lower (inclusive) bound of the highlights range.
    #[must_use]
    pub const fn highlights_min(&self) -> f64 {
        self.highlights_min
    }

    /// Boundary between darks and shadows: half of `shadows_max`.
    #[must_use]
    pub fn darks_max(&self) -> f64 {
        self.shadows_max * 0.5
    }
}

#[derive(Deserialize)]
struct RawThresholds {
    shadows_max: f64,
    midtones_min: f64,
    midtones_max: f64,
    highlights_min: f64,
}

impl TryFrom<RawThresholds> for ThresholdSet {
    type Error = String;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        #[allow(clippy::float_cmp)]
        let contiguous =
            raw.midtones_min == raw.shadows_max && raw.highlights_min == raw.midtones_max;
        if !contiguous {
            return Err(format!(
                "thresholds must be contiguous: midtones_min ({}) must equal shadows_max ({}) \
                 and highlights_min ({}) must equal midtones_max ({})",
                raw.midtones_min, raw.shadows_max, raw.highlights_min, raw.midtones_max,
            ));
        }
        Ok(Self::from_breakpoints(raw.shadows_max, raw.midtones_max))
    }
}

/// One of the four tonal bands an image is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonalRange {
    /// The brightest quarter, rendered white-on-black.
    Highlights,
    /// The middle half of the brightness distribution.
    Midtones,
    /// From half the 25th percentile up to the 25th percentile.
    Shadows,
    /// Everything below half the 25th percentile.
    Darks,
}

impl TonalRange {
    /// All ranges in processing order.
    pub const ALL: [Self; 4] = [Self::Highlights, Self::Midtones, Self::Shadows, Self::Darks];

    /// Lowercase name used in artifact file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Highlights => "highlights",
            Self::Midtones => "midtones",
            Self::Shadows => "shadows",
            Self::Darks => "darks",
        }
    }

    /// Position of this range in [`TonalRange::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Highlights => 0,
            Self::Midtones => 1,
            Self::Shadows => 2,
            Self::Darks => 3,
        }
    }
}

impl fmt::Display for TonalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown tonal range name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tonal range '{0}' (expected highlights, midtones, shadows, or darks)")]
pub struct ParseTonalRangeError(String);

impl FromStr for TonalRange {
    type Err = ParseTonalRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTonalRangeError(s.to_owned()))
    }
}

/// One value per tonal range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TonalRanges<T> {
    /// Value for [`TonalRange::Highlights`].
    pub highlights: T,
    /// Value for [`TonalRange::Midtones`].
    pub midtones: T,
    /// Value for [`TonalRange::Shadows`].
    pub shadows: T,
    /// Value for [`TonalRange::Darks`].
    pub darks: T,
}

impl<T> TonalRanges<T> {
    /// Build by calling `f` once per range, in [`TonalRange::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(TonalRange) -> T) -> Self {
        Self {
            highlights: f(TonalRange::Highlights),
            midtones: f(TonalRange::Midtones),
            shadows: f(TonalRange::Shadows),
            darks: f(TonalRange::Darks),
        }
    }

    /// The value for `range`.
    #[must_use]
    pub const fn get(&self, range: TonalRange) -> &T {
        match range {
            TonalRange::Highlights => &self.highlights,
            TonalRange::Midtones => &self.midtones,
            TonalRange::Shadows => &self.shadows,
            TonalRange::Darks => &self.darks,
        }
    }

    /// Mutable access to the value for `range`.
    pub const fn get_mut(&mut self, range: TonalRange) -> &mut T {
        match range {
            TonalRange::Highlights => &mut self.highlights,
            TonalRange::Midtones => &mut self.midtones,
            TonalRange::Shadows => &mut self.shadows,
            TonalRange::Darks => &mut self.darks,
        }
    }

    /// Iterate over `(range, value)` pairs in [`TonalRange::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (TonalRange, &T)> {
        TonalRange::ALL.into_iter().map(move |range| (range, self.get(range)))
    }

    /// Transform every value, keeping the range association.
    pub fn map<U>(self, mut f: impl FnMut(TonalRange, T) -> U) -> TonalRanges<U> {
        TonalRanges {
            highlights: f(TonalRange::Highlights, self.highlights),
            midtones: f(TonalRange::Midtones, self.midtones),
            shadows: f(TonalRange::Shadows, self.shadows),
            darks: f(TonalRange::Darks, self.darks),
        }
    }
}

/// A finished output image for one tonal range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage<A> {
    /// Deliverable file name, `{base}_{range}.jpg`.
    pub name: String,
    /// Which range this image shows.
    pub range: TonalRange,
    /// The rendered pixels.
    pub image: PixelBuffer,
    /// Encoded form produced by the artifact encoder.
    pub artifact: A,
}

/// Broad error categories, for callers that only care about which
/// collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source could not be validated or decoded; nothing was processed.
    Decode,
    /// An output buffer could not be allocated.
    Allocation,
    /// A finished buffer could not be encoded.
    Encode,
    /// The engine was configured with invalid values.
    Config,
}

/// Errors that can occur during decomposition.
///
/// Every variant carries plain data so results can be serialized across
/// the web worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The source file exceeds the accepted size.
    #[error("file too large ({size} bytes). Maximum size is {}MB", .max / (1024 * 1024))]
    SourceTooLarge {
        /// Size of the rejected source in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        max: usize,
    },

    /// The source is not one of the accepted image formats.
    #[error(
        "unsupported file format ({0}). Please upload: image/jpeg, image/png, image/gif, image/webp"
    )]
    UnsupportedFormat(String),

    /// A pixel buffer violated its size invariants.
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// An output buffer could not be allocated.
    #[error("unable to allocate a {width}x{height} output image")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A finished range could not be encoded into an artifact.
    #[error("failed to encode {range} image: {message}")]
    Encode {
        /// The range whose encoding failed.
        range: TonalRange,
        /// Encoder error message.
        message: String,
    },

    /// Engine configuration is invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// The collaborator category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageDecode(_)
            | Self::EmptyInput
            | Self::SourceTooLarge { .. }
            | Self::UnsupportedFormat(_)
            | Self::InvalidBuffer(_) => ErrorKind::Decode,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageDecode(err.to_string())
    }
}
