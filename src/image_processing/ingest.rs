use image::{ImageFormat, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProcessingError, ProcessingResult};
use crate::utils::{content_hash, mime_from_path};

/// Declared types admitted into the pipeline
pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// A queued source: encoded bytes plus identity. Decoding happens per item
/// inside the batch so a bad file only fails itself.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: String,
    pub filename: String,
    pub mime: &'static str,
    pub data: Arc<[u8]>,
}

impl SourceImage {
    /// Admit a buffer if its declared type is accepted
    pub fn from_bytes(filename: &str, declared_mime: &str, data: Vec<u8>) -> ProcessingResult<Self> {
        let mime = ACCEPTED_MIME_TYPES
            .iter()
            .copied()
            .find(|accepted| accepted.eq_ignore_ascii_case(declared_mime.trim()))
            .ok_or_else(|| ProcessingError::UnsupportedInput {
                filename: filename.to_string(),
                mime: declared_mime.to_string(),
            })?;

        Ok(Self {
            id: content_hash(&data, filename),
            filename: filename.to_string(),
            mime,
            data: data.into(),
        })
    }

    /// Read a file; the declared type comes from its extension
    pub fn from_path(path: &Path) -> ProcessingResult<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        let mime = mime_from_path(path).unwrap_or("application/octet-stream");
        if !ACCEPTED_MIME_TYPES.contains(&mime) {
            return Err(ProcessingError::UnsupportedInput { filename, mime: mime.to_string() });
        }
        let data = std::fs::read(path)?;
        Self::from_bytes(&filename, mime, data)
    }

    fn image_format(&self) -> ImageFormat {
        match self.mime {
            "image/png" => ImageFormat::Png,
            "image/webp" => ImageFormat::WebP,
            _ => ImageFormat::Jpeg,
        }
    }

    /// Decode to RGBA. Content sniffing wins over the declared type so a
    /// mislabeled file still decodes when its bytes are a supported format.
    pub fn decode(&self) -> ProcessingResult<RgbaImage> {
        let format = image::guess_format(&self.data).unwrap_or_else(|_| self.image_format());
        let decoded = image::load_from_memory_with_format(&self.data, format)
            .map_err(|e| ProcessingError::decode(&self.filename, e))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(ProcessingError::decode(&self.filename, "image has no pixels"));
        }
        Ok(decoded.to_rgba8())
    }
}

/// Ordered list of sources waiting for a run
#[derive(Debug, Default, Clone)]
pub struct SourceQueue {
    sources: Vec<SourceImage>,
}

impl SourceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer; unsupported types are dropped silently. Returns whether
    /// the buffer was queued.
    pub fn push_bytes(&mut self, filename: &str, declared_mime: &str, data: Vec<u8>) -> bool {
        match SourceImage::from_bytes(filename, declared_mime, data) {
            Ok(source) => {
                self.sources.push(source);
                true
            }
            Err(e) => {
                debug!("Dropping input: {}", e);
                false
            }
        }
    }

    /// Add a file; unsupported extensions are dropped silently, read errors are returned
    pub fn push_path(&mut self, path: &Path) -> ProcessingResult<bool> {
        match SourceImage::from_path(path) {
            Ok(source) => {
                self.sources.push(source);
                Ok(true)
            }
            Err(ProcessingError::UnsupportedInput { filename, mime }) => {
                debug!("Dropping input {} ({})", filename, mime);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a source by id, returning it if present
    pub fn remove(&mut self, id: &str) -> Option<SourceImage> {
        let index = self.sources.iter().position(|s| s.id == id)?;
        Some(self.sources.remove(index))
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[SourceImage] {
        &self.sources
    }
}
