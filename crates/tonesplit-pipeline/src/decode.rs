//! Source validation and decoding.
//!
//! Accepts raw image file bytes (JPEG, PNG, GIF, WebP) and produces the
//! RGBA [`PixelBuffer`] the rest of the engine works on. The format and
//! size checks mirror what the upload form enforces, so command-line and
//! worker callers reject the same files a browser user would.

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, PixelBuffer};

/// Accepted source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl SourceFormat {
    /// MIME type of the format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    const fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Upper bounds on what the engine will accept as a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLimits {
    /// Maximum source file size in bytes.
    pub max_bytes: usize,
}

impl SourceLimits {
    /// Default maximum source size: 10 MiB.
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }
}

/// Check that `bytes` is a supported image within `limits`.
///
/// Only the file signature is inspected; the body is not decoded.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty,
/// [`PipelineError::SourceTooLarge`] if it exceeds `limits.max_bytes`,
/// or [`PipelineError::UnsupportedFormat`] if the signature is not
/// JPEG, PNG, GIF, or WebP.
pub fn validate_source(bytes: &[u8], limits: &SourceLimits) -> Result<SourceFormat, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    if bytes.len() > limits.max_bytes {
        return Err(PipelineError::SourceTooLarge {
            size: bytes.len(),
            max: limits.max_bytes,
        });
    }
    match image::guess_format(bytes) {
        Ok(format) => SourceFormat::from_image_format(format).ok_or_else(|| {
            PipelineError::UnsupportedFormat(format.to_mime_type().to_owned())
        }),
        Err(_) => Err(PipelineError::UnsupportedFormat("unrecognized".to_owned())),
    }
}

/// Decode raw image bytes into an RGBA pixel buffer.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty,
/// [`PipelineError::ImageDecode`] if the data is corrupt or in an
/// unsupported format, or [`PipelineError::InvalidBuffer`] if the image
/// has no pixels.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let image = image::load_from_memory(bytes)?;
    PixelBuffer::from_rgba(image.into_rgba8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(img: &image::RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut buf, format)
            .unwrap();
        buf.into_inner()
    }

    fn sample_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(4, 3, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x * 60) as u8, (y * 80) as u8, 10, 200])
        });
        encode(&img, ImageFormat::Png)
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            validate_source(&[], &SourceLimits::default()),
            Err(PipelineError::EmptyInput)
        ));
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(matches!(
            decode(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(PipelineError::ImageDecode(_))
        ));
    }

    #[test]
    fn png_is_accepted_and_decoded() {
        let png = sample_png();
        assert_eq!(
            validate_source(&png, &SourceLimits::default()).unwrap(),
            SourceFormat::Png
        );
        let buffer = decode(&png).unwrap();
        assert_eq!(buffer.width(), 4);
        assert_eq!(buffer.height(), 3);
        assert_eq!(buffer.pixel(1, 2), Some([60, 160, 10, 200]));
    }

    #[test]
    fn jpeg_and_gif_signatures_are_recognized() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255]));
        let rgb = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();
        let mut jpeg = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(rgb)
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .unwrap();
        let limits = SourceLimits::default();
        assert_eq!(
            validate_source(jpeg.get_ref(), &limits).unwrap(),
            SourceFormat::Jpeg
        );
        let gif = encode(&img, ImageFormat::Gif);
        assert_eq!(validate_source(&gif, &limits).unwrap(), SourceFormat::Gif);
    }

    #[test]
    fn oversized_source_is_rejected() {
        let png = sample_png();
        let limits = SourceLimits {
            max_bytes: png.len() - 1,
        };
        assert!(matches!(
            validate_source(&png, &limits),
            Err(PipelineError::SourceTooLarge { size, max }) if size == png.len() && max == png.len() - 1
        ));
    }

    #[test]
    fn unknown_signature_is_unsupported() {
        let result = validate_source(b"definitely not an image", &SourceLimits::default());
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
    }

    #[test]
    fn bmp_is_recognized_but_not_accepted() {
        let bmp = b"BM\x00\x00\x00\x00\x00\x00\x00\x00\x36\x00\x00\x00";
        let result = validate_source(bmp, &SourceLimits::default());
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(ref m)) if m == "image/bmp"));
    }

    #[test]
    fn default_limit_is_ten_megabytes() {
        assert_eq!(SourceLimits::default().max_bytes, 10_485_760);
    }
}
