use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::debug;

use super::geometry::{Geometry, PixelRect};
use super::resize::{resample_region, resample_rgba, SourceRegion};
use super::watermark::{Watermark, WATERMARK_OPACITY};
use crate::cli::{FitMode, OutputFormat};
use crate::error::ProcessingResult;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Canvas treatment before the source is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// Opaque white fill (formats without alpha)
    White,
    /// Explicitly cleared to transparent (padding stays see-through)
    Transparent,
    /// Left untouched; the source covers every pixel
    Untouched,
}

pub fn background_for(format: OutputFormat, fit_mode: FitMode) -> Background {
    match (format.supports_alpha(), fit_mode) {
        (false, _) => Background::White,
        (true, FitMode::Contain) => Background::Transparent,
        (true, FitMode::Cover) => Background::Untouched,
    }
}

/// Render `source` into a `target_width`x`target_height` canvas.
///
/// One resample into the draw rectangle performs both the resize and the fit;
/// pixels outside the rectangle keep the background treatment.
pub fn composite(
    source: &RgbaImage,
    geometry: &Geometry,
    target_width: u32,
    target_height: u32,
    format: OutputFormat,
    fit_mode: FitMode,
    watermark: Option<&Watermark>,
) -> ProcessingResult<RgbaImage> {
    let mut canvas: RgbaImage = ImageBuffer::new(target_width, target_height);

    match background_for(format, fit_mode) {
        Background::White => fill(&mut canvas, WHITE),
        Background::Transparent => fill(&mut canvas, TRANSPARENT),
        Background::Untouched => {}
    }

    let rect = geometry.to_pixel_rect(target_width, target_height);
    debug!(
        "Drawing {}x{} source at ({}, {}) size {}x{}",
        source.width(),
        source.height(),
        rect.x,
        rect.y,
        rect.width,
        rect.height
    );
    draw_source(&mut canvas, source, rect)?;

    if let Some(watermark) = watermark {
        apply_watermark(&mut canvas, watermark)?;
    }

    Ok(canvas)
}

/// Stamp the watermark bottom-right at constant opacity.
///
/// Opacity is scoped to this draw only.
pub fn apply_watermark(canvas: &mut RgbaImage, watermark: &Watermark) -> ProcessingResult<()> {
    let (width, height) = canvas.dimensions();
    let placement = watermark.placement(width, height);
    let PixelRect {
        x,
        y,
        width: mark_width,
        height: mark_height,
    } = placement.rect;

    let scaled = resample_rgba(&watermark.image, mark_width, mark_height)?;
    draw_over(canvas, &scaled, x, y, WATERMARK_OPACITY);
    Ok(())
}

/// Resample the part of `source` that lands on the canvas and draw it.
/// Cover crops are cut from the source first, so the full oversized draw
/// rectangle is never materialized.
fn draw_source(canvas: &mut RgbaImage, source: &RgbaImage, rect: PixelRect) -> ProcessingResult<()> {
    let (canvas_width, canvas_height) = canvas.dimensions();

    // Visible span in draw-rectangle coordinates
    let x0 = (-rect.x).clamp(0, rect.width as i64) as u32;
    let y0 = (-rect.y).clamp(0, rect.height as i64) as u32;
    let x1 = (canvas_width as i64 - rect.x).clamp(0, rect.width as i64) as u32;
    let y1 = (canvas_height as i64 - rect.y).clamp(0, rect.height as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Ok(());
    }

    if x0 == 0 && y0 == 0 && x1 == rect.width && y1 == rect.height {
        let whole = resample_rgba(source, rect.width, rect.height)?;
        draw_over(canvas, &whole, rect.x, rect.y, 1.0);
        return Ok(());
    }

    let region = source_region(source.dimensions(), rect, (x0, y0, x1, y1));
    let visible = resample_region(source, region, x1 - x0, y1 - y0)?;
    draw_over(canvas, &visible, rect.x + x0 as i64, rect.y + y0 as i64, 1.0);
    Ok(())
}

/// Map a visible span of the draw rectangle back into source pixels.
///
/// Edges are scaled one at a time and clamped to the source, so the region
/// never ends past the last source pixel even when `rect * (src / rect)`
/// rounds up.
fn source_region(
    (source_width, source_height): (u32, u32),
    rect: PixelRect,
    (x0, y0, x1, y1): (u32, u32, u32, u32),
) -> SourceRegion {
    let scale_x = source_width as f64 / rect.width as f64;
    let scale_y = source_height as f64 / rect.height as f64;

    let right = (x1 as f64 * scale_x).min(source_width as f64);
    let left = (x0 as f64 * scale_x).min(right);
    let bottom = (y1 as f64 * scale_y).min(source_height as f64);
    let top = (y0 as f64 * scale_y).min(bottom);

    SourceRegion {
        left,
        top,
        width: span_within(left, right, source_width as f64),
        height: span_within(top, bottom, source_height as f64),
    }
}

/// Length from `start` to `end` such that `start + length` stays at or below `limit`
fn span_within(start: f64, end: f64, limit: f64) -> f64 {
    let length = end - start;
    if start + length > limit {
        (length - limit * f64::EPSILON).max(0.0)
    } else {
        length
    }
}

fn fill(canvas: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in canvas.pixels_mut() {
        *pixel = color;
    }
}

/// Source-over blend `layer` onto `canvas` at (x, y), clipped to the canvas
fn draw_over(canvas: &mut RgbaImage, layer: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let (canvas_width, canvas_height) = canvas.dimensions();

    // Visible intersection in layer coordinates
    let start_x = (-x).max(0) as u32;
    let start_y = (-y).max(0) as u32;
    let end_x = (canvas_width as i64 - x).clamp(0, layer.width() as i64) as u32;
    let end_y = (canvas_height as i64 - y).clamp(0, layer.height() as i64) as u32;

    for ly in start_y..end_y {
        for lx in start_x..end_x {
            let cx = (lx as i64 + x) as u32;
            let cy = (ly as i64 + y) as u32;
            let src = *layer.get_pixel(lx, ly);
            blend_pixel(canvas.get_pixel_mut(cx, cy), src, opacity);
        }
    }
}

/// Porter-Duff source-over with an extra constant opacity on the source
fn blend_pixel(dst: &mut Rgba<u8>, src: Rgba<u8>, opacity: f32) {
    let src_alpha = src[3] as f32 / 255.0 * opacity;
    if src_alpha <= 0.0 {
        return;
    }

    let dst_alpha = dst[3] as f32 / 255.0;
    let inv_src_alpha = 1.0 - src_alpha;
    let out_alpha = src_alpha + dst_alpha * inv_src_alpha;

    for c in 0..3 {
        let blended =
            (src[c] as f32 * src_alpha + dst[c] as f32 * dst_alpha * inv_src_alpha) / out_alpha;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}
