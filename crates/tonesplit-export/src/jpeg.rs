//! JPEG artifact encoder.
//!
//! Every range image is delivered twice from the same encoded bytes: as
//! a JPEG file for download and as a `data:image/jpeg;base64,...` URL for
//! inline display. JPEG has no alpha channel, so every pixel is first
//! composited source-over onto opaque black, the same way a browser
//! canvas flattens an image it exports as JPEG.
//!
//! This is a pure function with no I/O -- it returns bytes and strings.

use base64::Engine as _;
use image::ImageEncoder;
use tonesplit_pipeline::{ArtifactEncoder, PixelBuffer};

/// Encoder quality for every artifact.
pub const JPEG_QUALITY: u8 = 90;

/// MIME type of the encoded artifacts.
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Errors that can occur while encoding an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The JPEG encoder rejected the image.
    #[error("JPEG encoding failed: {0}")]
    Encode(String),

    /// Quality outside `1..=100`.
    #[error("JPEG quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Encode a pixel buffer as JPEG at the given quality (1-100).
///
/// # Errors
///
/// Returns [`ExportError::InvalidQuality`] if `quality` is outside
/// `1..=100`, or [`ExportError::Encode`] if the encoder fails.
pub fn encode_jpeg(image: &PixelBuffer, quality: u8) -> Result<Vec<u8>, ExportError> {
    if !(1..=100).contains(&quality) {
        return Err(ExportError::InvalidQuality(quality));
    }

    // 1. Flatten onto black.
    let rgb: Vec<u8> = image
        .as_raw()
        .chunks_exact(4)
        .flat_map(|p| {
            let a = p[3];
            [over_black(p[0], a), over_black(p[1], a), over_black(p[2], a)]
        })
        .collect();

    // 2. Encode RGB -> JPEG bytes.
    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder.write_image(
        &rgb,
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(jpeg)
}

/// Source-over compositing of one channel onto opaque black:
/// `round(c * a / 255)`.
fn over_black(channel: u8, alpha: u8) -> u8 {
    let scaled = (u16::from(channel) * u16::from(alpha) + 127) / 255;
    u8::try_from(scaled).unwrap_or(u8::MAX)
}

/// Build a `data:` URL embedding `bytes` as base64.
#[must_use]
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime_type};base64,{encoded}")
}

/// A range image encoded for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegArtifact {
    /// The JPEG file contents.
    pub bytes: Vec<u8>,
    /// The same bytes as an inline `data:` URL.
    pub data_url: String,
}

/// [`ArtifactEncoder`] producing [`JpegArtifact`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegEncoder {
    /// Encoder quality (1-100).
    pub quality: u8,
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self {
            quality: JPEG_QUALITY,
        }
    }
}

impl ArtifactEncoder for JpegEncoder {
    type Artifact = JpegArtifact;
    type Error = ExportError;

    fn encode(&self, image: &PixelBuffer) -> Result<JpegArtifact, ExportError> {
        let bytes = encode_jpeg(image, self.quality)?;
        let data_url = to_data_url(JPEG_MIME_TYPE, &bytes);
        Ok(JpegArtifact { bytes, data_url })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_rgba(image::RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
            .unwrap()
    }

    #[test]
    fn encoded_bytes_are_a_decodable_jpeg() {
        let bytes = encode_jpeg(&solid(16, 9, [128, 128, 128, 255]), JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "missing JPEG SOI marker");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 9));
        for p in decoded.pixels() {
            assert!(p.0.iter().all(|&c| c.abs_diff(128) <= 2), "{p:?}");
        }
    }

    fn decoded_solid(rgba: [u8; 4]) -> image::RgbImage {
        let bytes = encode_jpeg(&solid(8, 8, rgba), JPEG_QUALITY).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8()
    }

    #[test]
    fn transparent_pixels_flatten_to_black() {
        let decoded = decoded_solid([255, 255, 255, 0]);
        assert!(decoded.pixels().all(|p| p.0.iter().all(|&c| c <= 2)));

        let decoded = decoded_solid([150, 150, 150, 0]);
        assert!(decoded.pixels().all(|p| p.0.iter().all(|&c| c <= 2)));
    }

    #[test]
    fn translucent_pixels_are_darkened_by_alpha() {
        let decoded = decoded_solid([200, 200, 200, 128]);
        for p in decoded.pixels() {
            assert!(p.0.iter().all(|&c| c.abs_diff(100) <= 2), "{p:?}");
        }
    }

    #[test]
    fn over_black_scales_by_alpha() {
        assert_eq!(over_black(255, 255), 255);
        assert_eq!(over_black(255, 0), 0);
        assert_eq!(over_black(200, 128), 100);
        assert_eq!(over_black(1, 128), 1);
        assert_eq!(over_black(0, 255), 0);
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        let image = solid(1, 1, [0, 0, 0, 255]);
        assert!(matches!(
            encode_jpeg(&image, 0),
            Err(ExportError::InvalidQuality(0))
        ));
        assert!(matches!(
            encode_jpeg(&image, 101),
            Err(ExportError::InvalidQuality(101))
        ));
    }

    #[test]
    fn data_url_is_base64_encoded() {
        assert_eq!(to_data_url("image/jpeg", b"hi"), "data:image/jpeg;base64,aGk=");
    }

    #[test]
    fn artifact_url_embeds_artifact_bytes() {
        let artifact = JpegEncoder::default()
            .encode(&solid(4, 4, [10, 20, 30, 255]))
            .unwrap();
        assert_eq!(artifact.data_url, to_data_url(JPEG_MIME_TYPE, &artifact.bytes));
        assert!(artifact.data_url.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn default_quality_is_ninety() {
        assert_eq!(JpegEncoder::default().quality, 90);
    }
}
