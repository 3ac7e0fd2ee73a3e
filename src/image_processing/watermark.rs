use image::{ImageFormat, RgbaImage};
use std::path::Path;
use tracing::{debug, warn};

use super::geometry::PixelRect;
use crate::error::{ProcessingError, ProcessingResult};

/// Constant opacity applied to the watermark draw
pub const WATERMARK_OPACITY: f32 = 0.5;
/// Watermark width as a fraction of canvas width
pub const WATERMARK_WIDTH_RATIO: f64 = 0.20;
/// Margin from the bottom-right corner, as a fraction of canvas width (both axes)
pub const WATERMARK_MARGIN_RATIO: f64 = 0.05;

/// Decoded watermark, shared read-only across a run
#[derive(Debug, Clone)]
pub struct Watermark {
    pub name: String,
    pub image: RgbaImage,
}

/// Where the watermark lands on a given canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkPlacement {
    pub rect: PixelRect,
    /// The rectangle extends past the canvas and will be clipped
    pub overflows: bool,
}

impl Watermark {
    /// Accept a watermark buffer.
    ///
    /// Only `image/png` is accepted; any other declared type yields `Ok(None)`,
    /// which clears the watermark configuration.
    pub fn from_bytes(name: &str, mime: &str, bytes: &[u8]) -> ProcessingResult<Option<Self>> {
        if !mime.eq_ignore_ascii_case("image/png") {
            debug!("Ignoring watermark {} with type {}", name, mime);
            return Ok(None);
        }

        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| ProcessingError::decode(name, e))?;

        let image = decoded.to_rgba8();
        if image.width() == 0 || image.height() == 0 {
            return Err(ProcessingError::decode(name, "watermark has no pixels"));
        }

        Ok(Some(Self {
            name: name.to_string(),
            image,
        }))
    }

    /// Load a watermark from disk; the declared type comes from the extension
    pub fn load(path: &Path) -> ProcessingResult<Option<Self>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("watermark")
            .to_string();
        let mime = crate::utils::mime_from_path(path).unwrap_or("application/octet-stream");
        if mime != "image/png" {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&name, mime, &bytes)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.image.width() as f64 / self.image.height() as f64
    }

    /// Bottom-right placement on a `canvas_width`x`canvas_height` canvas
    pub fn placement(&self, canvas_width: u32, canvas_height: u32) -> WatermarkPlacement {
        let width_f = canvas_width as f64 * WATERMARK_WIDTH_RATIO;
        let height_f = width_f / self.aspect_ratio();
        let margin = (canvas_width as f64 * WATERMARK_MARGIN_RATIO).round_ties_even() as i64;

        let width = snap(width_f);
        let height = snap(height_f);
        let x = canvas_width as i64 - width as i64 - margin;
        let y = canvas_height as i64 - height as i64 - margin;

        let rect = PixelRect {
            x,
            y,
            width,
            height,
        };
        let overflows = !rect.fits_within(canvas_width, canvas_height);
        if overflows {
            warn!(
                "Watermark {}x{} at ({}, {}) does not fit a {}x{} canvas; it will be clipped",
                width, height, x, y, canvas_width, canvas_height
            );
        }

        WatermarkPlacement { rect, overflows }
    }
}

fn snap(value: f64) -> u32 {
    let rounded = value.round_ties_even();
    if rounded < 1.0 {
        1
    } else {
        rounded.min(u32::MAX as f64) as u32
    }
}
