use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbaImage;

use crate::error::{ProcessingError, ProcessingResult};

/// Resample an RGBA image to exact dimensions.
///
/// Lanczos3 convolution with premultiplied alpha, so transparent edges do not
/// bleed dark fringes into the result.
pub fn resample_rgba(img: &RgbaImage, width: u32, height: u32) -> ProcessingResult<RgbaImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    resample_region(
        img,
        SourceRegion {
            left: 0.0,
            top: 0.0,
            width: src_width as f64,
            height: src_height as f64,
        },
        width,
        height,
    )
}

/// Sub-rectangle of a source image, in source pixels (fractional allowed)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRegion {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Resample only `region` of `img` to exact dimensions
pub fn resample_region(
    img: &RgbaImage,
    region: SourceRegion,
    width: u32,
    height: u32,
) -> ProcessingResult<RgbaImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == 0 || src_height == 0 || width == 0 || height == 0 {
        return Err(ProcessingError::Resize(format!(
            "cannot resize {}x{} to {}x{}",
            src_width, src_height, width, height
        )));
    }

    let src_image = Image::from_vec_u8(src_width, src_height, img.as_raw().clone(), PixelType::U8x4)
        .map_err(|e| ProcessingError::Resize(e.to_string()))?;

    let mut dst_image = Image::new(width, height, PixelType::U8x4);

    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3))
        .crop(region.left, region.top, region.width, region.height)
        .use_alpha(true);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ProcessingError::Resize(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
        ProcessingError::Resize(format!("resized buffer does not match {}x{}", width, height))
    })
}
