//! tonesplit-export: Pure artifact encoders (sans-IO)
//!
//! Turns rendered range images into deliverable artifacts: a JPEG file
//! and an inline `data:` URL of the same bytes.

pub mod jpeg;

pub use jpeg::{
    ExportError, JPEG_MIME_TYPE, JPEG_QUALITY, JpegArtifact, JpegEncoder, encode_jpeg, to_data_url,
};
