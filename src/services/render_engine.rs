//! Produces the bytes stored for each variant of an upload.

use crate::models::variant::VariantSpec;
use bytes::Bytes;
use image::{ImageError, ImageFormat, ImageReader, imageops::FilterType};
use std::{io::Cursor, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("source is not a decodable image: {0}")]
    Decode(#[source] ImageError),
    #[error("failed to encode resized image: {0}")]
    Encode(#[source] ImageError),
    #[error("render task failed: {0}")]
    Task(String),
}

/// The resize capability. Implementations decide aspect-ratio policy and
/// output encoding.
pub trait Resizer: Send + Sync {
    fn resize(&self, source: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError>;
}

/// Resizer backed by the `image` crate.
///
/// Fits the image inside the bounding box, keeping its aspect ratio, and
/// re-encodes it in the format it was uploaded in.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageResizer;

impl Resizer for ImageResizer {
    fn resize(&self, source: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|err| RenderError::Decode(ImageError::IoError(err)))?;
        let format = reader.format().unwrap_or(ImageFormat::Png);
        let img = reader.decode().map_err(RenderError::Decode)?;

        let resized = img.resize(width, height, FilterType::Lanczos3);

        let mut buffer = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut buffer), format)
            .map_err(RenderError::Encode)?;
        Ok(buffer)
    }
}

#[derive(Clone)]
pub struct RenderEngine {
    resizer: Arc<dyn Resizer>,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new(Arc::new(ImageResizer))
    }
}

impl RenderEngine {
    pub fn new(resizer: Arc<dyn Resizer>) -> Self {
        Self { resizer }
    }

    /// Render `source` for one variant.
    ///
    /// Variants without a size return `source` untouched. Resizing runs on
    /// the blocking pool.
    pub async fn render(&self, source: Bytes, spec: &VariantSpec) -> Result<Bytes, RenderError> {
        let Some((width, height)) = spec.size else {
            return Ok(source);
        };

        let resizer = Arc::clone(&self.resizer);
        tokio::task::spawn_blocking(move || resizer.resize(&source, width, height))
            .await
            .map_err(|err| RenderError::Task(err.to_string()))?
            .map(Bytes::from)
    }
}
