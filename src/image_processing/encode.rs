use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::error::{ProcessingError, ProcessingResult};

/// Size budget and quality ladder for lossy formats.
///
/// Qualities are integer percent so the ladder is exact (0.90 is `90`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub max_bytes: usize,
    pub start_quality: u8,
    pub floor_quality: u8,
    pub step: u8,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 250 * 1024,
            start_quality: 90,
            floor_quality: 60,
            step: 5,
        }
    }
}

impl CompressionPolicy {
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ProcessingResult<()> {
        if self.step == 0 {
            return Err(ProcessingError::InvalidConfig(
                "quality step must be greater than 0".to_string(),
            ));
        }
        if self.floor_quality == 0 || self.floor_quality > self.start_quality || self.start_quality > 100 {
            return Err(ProcessingError::InvalidConfig(format!(
                "quality range {}..={} is not within 1..=100",
                self.floor_quality, self.start_quality
            )));
        }
        Ok(())
    }

    /// Upper bound on encode attempts for one image
    pub fn max_attempts(&self) -> usize {
        let span = (self.start_quality - self.floor_quality) as usize;
        span.div_ceil(self.step as usize) + 1
    }

    /// Within 0.01 of the floor
    fn at_floor(&self, quality: u8) -> bool {
        quality <= self.floor_quality.saturating_add(1)
    }
}

/// One encode call in the quality search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeAttempt {
    pub quality: u8,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// Every encode performed, in order. PNG records a single attempt at 100.
    pub attempts: Vec<EncodeAttempt>,
    pub lossy: bool,
}

impl EncodedImage {
    /// Final quality on the 0.0-1.0 scale, `None` for lossless output
    pub fn quality(&self) -> Option<f32> {
        if !self.lossy {
            return None;
        }
        self.attempts.last().map(|a| a.quality as f32 / 100.0)
    }

    pub fn within_budget(&self, policy: &CompressionPolicy) -> bool {
        !self.lossy || self.bytes.len() <= policy.max_bytes
    }
}

/// Encode a composited canvas to `format`.
///
/// PNG is a single lossless encode; JPEG and WebP run the quality search.
pub fn encode(
    canvas: &RgbaImage,
    format: OutputFormat,
    policy: &CompressionPolicy,
) -> ProcessingResult<EncodedImage> {
    match format {
        OutputFormat::Png => {
            let bytes = encode_png(canvas)?;
            Ok(EncodedImage {
                attempts: vec![EncodeAttempt {
                    quality: 100,
                    size: bytes.len(),
                }],
                bytes,
                lossy: false,
            })
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
            quality_search(policy, |quality| {
                encode_jpeg(rgb.as_raw(), rgb.width(), rgb.height(), quality)
            })
        }
        OutputFormat::Webp => quality_search(policy, |quality| encode_webp(canvas, quality)),
    }
}

/// Walk the quality ladder from `start_quality` down to `floor_quality`.
///
/// Accepts the first encode that fits the budget, or the floor encode
/// regardless of size.
pub fn quality_search<F>(policy: &CompressionPolicy, mut encode_at: F) -> ProcessingResult<EncodedImage>
where
    F: FnMut(u8) -> ProcessingResult<Vec<u8>>,
{
    policy.validate()?;

    let mut quality = policy.start_quality;
    let mut attempts = Vec::with_capacity(policy.max_attempts());

    loop {
        let bytes = encode_at(quality)?;
        attempts.push(EncodeAttempt {
            quality,
            size: bytes.len(),
        });
        debug!("Encoded at quality {}: {} bytes", quality, bytes.len());

        if bytes.len() <= policy.max_bytes || policy.at_floor(quality) {
            return Ok(EncodedImage {
                bytes,
                attempts,
                lossy: true,
            });
        }

        quality = quality.saturating_sub(policy.step).max(policy.floor_quality);
    }
}

fn non_empty(format: OutputFormat, bytes: Vec<u8>) -> ProcessingResult<Vec<u8>> {
    if bytes.is_empty() {
        return Err(ProcessingError::encode(format.extension(), "encoder produced no data"));
    }
    Ok(bytes)
}

fn encode_png(canvas: &RgbaImage) -> ProcessingResult<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(canvas.as_raw(), canvas.width(), canvas.height(), ExtendedColorType::Rgba8)
        .map_err(|e| ProcessingError::encode("png", e))?;
    non_empty(OutputFormat::Png, buffer)
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> ProcessingResult<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ProcessingError::encode("jpeg", e))?;
    non_empty(OutputFormat::Jpeg, buffer)
}

/// Lossy WebP through libwebp; alpha is kept
fn encode_webp(canvas: &RgbaImage, quality: u8) -> ProcessingResult<Vec<u8>> {
    let encoder = webp::Encoder::from_rgba(canvas.as_raw(), canvas.width(), canvas.height());
    let encoded = encoder.encode(quality as f32);
    non_empty(OutputFormat::Webp, encoded.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn noisy_canvas(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503));
            Rgba([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8, 255])
        })
    }

    #[test]
    fn test_ladder_walks_down_to_floor() {
        let policy = CompressionPolicy::default();
        // Always 400 KB: never fits, so every rung is tried
        let result = quality_search(&policy, |_| Ok(vec![0u8; 400 * 1024])).unwrap();

        let qualities: Vec<u8> = result.attempts.iter().map(|a| a.quality).collect();
        assert_eq!(qualities, vec![90, 85, 80, 75, 70, 65, 60]);
        assert_eq!(result.quality(), Some(0.60));
        assert!(!result.within_budget(&policy));
    }

    #[test]
    fn test_ladder_stops_when_budget_met() {
        let policy = CompressionPolicy::default();
        // Shrinks 60 KB per rung: 400 -> 340 -> 280 -> 220
        let result = quality_search(&policy, |q| {
            let kb = 400 - (90 - q as usize) / 5 * 60;
            Ok(vec![0u8; kb * 1024])
        })
        .unwrap();

        assert_eq!(result.attempts.len(), 4);
        assert_eq!(result.quality(), Some(0.75));
        assert_eq!(result.bytes.len(), 220 * 1024);
    }

    #[test]
    fn test_first_attempt_accepted_when_small() {
        let result = quality_search(&CompressionPolicy::default(), |_| Ok(vec![1u8; 10])).unwrap();
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.quality(), Some(0.90));
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let policy = CompressionPolicy::default();
        let result = quality_search(&policy, |_| Ok(vec![0u8; 250 * 1024])).unwrap();
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn test_attempt_bound_for_custom_policies() {
        for (start, floor, step) in [(90u8, 60u8, 5u8), (95, 60, 10), (80, 79, 1), (100, 1, 7)] {
            let policy = CompressionPolicy {
                max_bytes: 0,
                start_quality: start,
                floor_quality: floor,
                step,
            };
            let result = quality_search(&policy, |_| Ok(vec![0u8; 1])).unwrap();
            assert!(result.attempts.len() <= policy.max_attempts());
            let last = result.attempts.last().unwrap().quality;
            assert!(last >= floor && last <= start);
        }
        assert_eq!(CompressionPolicy::default().max_attempts(), 7);
    }

    #[test]
    fn test_encode_error_propagates() {
        let result = quality_search(&CompressionPolicy::default(), |_| {
            Err(ProcessingError::encode("jpeg", "boom"))
        });
        assert!(matches!(result, Err(ProcessingError::Encode { .. })));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let policy = CompressionPolicy {
            step: 0,
            ..CompressionPolicy::default()
        };
        assert!(quality_search(&policy, |_| Ok(vec![0])).is_err());
    }

    #[test]
    fn test_png_roundtrip_dimensions() {
        let canvas = noisy_canvas(37, 21);
        let encoded = encode(&canvas, OutputFormat::Png, &CompressionPolicy::default()).unwrap();
        assert_eq!(encoded.quality(), None);
        assert_eq!(encoded.attempts.len(), 1);

        let decoded = image::load_from_memory_with_format(&encoded.bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (37, 21));
        assert_eq!(decoded.to_rgba8(), canvas);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let canvas = noisy_canvas(64, 48);
        let policy = CompressionPolicy::with_max_bytes(1024);
        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::Webp] {
            let first = encode(&canvas, format, &policy).unwrap();
            let second = encode(&canvas, format, &policy).unwrap();
            assert_eq!(first.bytes, second.bytes, "{}", format);
            assert_eq!(first.attempts, second.attempts);
        }
    }

    #[test]
    fn test_lossy_quality_stays_in_range() {
        let canvas = noisy_canvas(128, 128);
        let policy = CompressionPolicy::with_max_bytes(1);
        for format in [OutputFormat::Jpeg, OutputFormat::Webp] {
            let encoded = encode(&canvas, format, &policy).unwrap();
            assert!(encoded.attempts.len() <= 7);
            let quality = encoded.quality().unwrap();
            assert!((0.60..=0.90).contains(&quality));
        }
    }

    #[test]
    fn test_jpeg_decodes_to_canvas_size() {
        let canvas = noisy_canvas(90, 40);
        let encoded = encode(&canvas, OutputFormat::Jpeg, &CompressionPolicy::default()).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded.bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (90, 40));
    }

    /// Smooth gradients with mild noise, closer to a photo than `noisy_canvas`
    fn photo_like_canvas(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let noise = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) >> 28;
            Rgba([
                ((x * 255 / width) as u8).saturating_add(noise as u8),
                ((y * 255 / height) as u8).saturating_add(noise as u8),
                (((x + y) * 127 / (width + height)) as u8).saturating_add(noise as u8),
                255,
            ])
        })
    }

    #[test]
    fn test_webp_size_shrinks_down_the_ladder() {
        let canvas = photo_like_canvas(400, 400);
        // Zero budget walks every rung
        let policy = CompressionPolicy::with_max_bytes(0);
        let encoded = encode(&canvas, OutputFormat::Webp, &policy).unwrap();

        let sizes: Vec<usize> = encoded.attempts.iter().map(|a| a.size).collect();
        assert_eq!(sizes.len(), 7);
        assert!(sizes.windows(2).all(|w| w[1] <= w[0]), "{:?}", sizes);
        assert!(sizes[6] < sizes[0], "{:?}", sizes);
    }

    #[test]
    fn test_webp_keeps_alpha_and_size() {
        let mut canvas = photo_like_canvas(64, 32);
        for x in 0..64 {
            canvas.put_pixel(x, 0, Rgba([0, 0, 0, 0]));
        }
        let encoded = encode(&canvas, OutputFormat::Webp, &CompressionPolicy::default()).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded.bytes, ImageFormat::WebP)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (64, 32));
        assert_eq!(decoded.get_pixel(10, 0)[3], 0);
        assert_eq!(decoded.get_pixel(10, 20)[3], 255);
    }
}
