use crate::cli::FitMode;
use crate::error::{ProcessingError, ProcessingResult};

/// Draw rectangle of a source inside the target canvas, in canvas pixel space.
///
/// Values are exact (`f64`); use [`Geometry::to_pixel_rect`] for the rectangle
/// actually rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Integer draw rectangle. Offsets may be negative (cover crops).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// True if the rectangle covers every pixel of a `width`x`height` canvas
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x <= 0 && self.y <= 0 && self.right() >= width as i64 && self.bottom() >= height as i64
    }

    /// True if the rectangle lies entirely inside a `width`x`height` canvas
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && self.right() <= width as i64 && self.bottom() <= height as i64
    }
}

/// Compute the draw rectangle for a source on a target canvas
pub fn resolve(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
    fit_mode: FitMode,
) -> ProcessingResult<Geometry> {
    if source_width == 0 || source_height == 0 || target_width == 0 || target_height == 0 {
        return Err(ProcessingError::InvalidGeometry {
            source_width,
            source_height,
            target_width,
            target_height,
        });
    }

    let (sw, sh) = (source_width as f64, source_height as f64);
    let (tw, th) = (target_width as f64, target_height as f64);
    let source_ratio = sw / sh;
    let target_ratio = tw / th;

    // Cover matches heights when the source is relatively wider, contain matches widths.
    let match_height = match fit_mode {
        FitMode::Cover => source_ratio > target_ratio,
        FitMode::Contain => source_ratio <= target_ratio,
    };

    let geometry = if match_height {
        let draw_width = sw * th / sh;
        Geometry {
            draw_width,
            draw_height: th,
            offset_x: (tw - draw_width) / 2.0,
            offset_y: 0.0,
        }
    } else {
        let draw_height = sh * tw / sw;
        Geometry {
            draw_width: tw,
            draw_height,
            offset_x: 0.0,
            offset_y: (th - draw_height) / 2.0,
        }
    };

    Ok(geometry)
}

impl Geometry {
    /// Snap to whole pixels.
    ///
    /// Draw dimensions round half-to-even (at least 1px); offsets centre the
    /// integer slack with floor division. Target dimensions are integers, so a
    /// draw size >= target stays >= target after rounding (and <= stays <=),
    /// which keeps cover coverage and contain containment exact.
    pub fn to_pixel_rect(&self, target_width: u32, target_height: u32) -> PixelRect {
        let width = snap_dimension(self.draw_width);
        let height = snap_dimension(self.draw_height);
        PixelRect {
            x: center_offset(target_width, width),
            y: center_offset(target_height, height),
            width,
            height,
        }
    }
}

fn snap_dimension(value: f64) -> u32 {
    let rounded = value.round_ties_even();
    if rounded < 1.0 {
        1
    } else if rounded > u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

fn center_offset(target: u32, draw: u32) -> i64 {
    (target as i64 - draw as i64).div_euclid(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_wide_source() {
        let g = resolve(4000, 2000, 1200, 1200, FitMode::Cover).unwrap();
        assert_eq!(g.draw_height, 1200.0);
        assert_eq!(g.draw_width, 2400.0);
        assert_eq!(g.offset_x, -600.0);
        assert_eq!(g.offset_y, 0.0);

        let rect = g.to_pixel_rect(1200, 1200);
        assert_eq!(
            rect,
            PixelRect {
                x: -600,
                y: 0,
                width: 2400,
                height: 1200
            }
        );
    }

    #[test]
    fn test_contain_tall_source() {
        let g = resolve(800, 1200, 1200, 1200, FitMode::Contain).unwrap();
        assert_eq!(g.draw_height, 1200.0);
        assert_eq!(g.draw_width, 800.0);
        assert_eq!(g.offset_x, 200.0);
        assert_eq!(g.offset_y, 0.0);
    }

    #[test]
    fn test_cover_tall_source() {
        let g = resolve(1000, 2000, 500, 500, FitMode::Cover).unwrap();
        assert_eq!(g.draw_width, 500.0);
        assert_eq!(g.draw_height, 1000.0);
        assert_eq!(g.offset_x, 0.0);
        assert_eq!(g.offset_y, -250.0);
    }

    #[test]
    fn test_contain_wide_source() {
        let g = resolve(2000, 1000, 600, 600, FitMode::Contain).unwrap();
        assert_eq!(g.draw_width, 600.0);
        assert_eq!(g.draw_height, 300.0);
        assert_eq!(g.offset_x, 0.0);
        assert_eq!(g.offset_y, 150.0);
    }

    #[test]
    fn test_equal_ratio_is_identity() {
        for mode in [FitMode::Cover, FitMode::Contain] {
            let g = resolve(3000, 2000, 1200, 800, mode).unwrap();
            assert_eq!(g.draw_width, 1200.0);
            assert_eq!(g.draw_height, 800.0);
            assert_eq!(g.offset_x, 0.0);
            assert_eq!(g.offset_y, 0.0);
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(resolve(0, 10, 10, 10, FitMode::Cover).is_err());
        assert!(resolve(10, 10, 10, 0, FitMode::Contain).is_err());
    }

    #[test]
    fn test_odd_slack_rounding() {
        // 3px of slack: cover shifts one extra pixel left, contain one less right
        let cover = resolve(1003, 1000, 1000, 1000, FitMode::Cover)
            .unwrap()
            .to_pixel_rect(1000, 1000);
        assert_eq!((cover.x, cover.width), (-2, 1003));
        assert!(cover.covers(1000, 1000));

        let contain = resolve(1000, 1003, 1000, 1000, FitMode::Contain)
            .unwrap()
            .to_pixel_rect(1000, 1000);
        assert_eq!(contain.height, 1000);
        assert!(contain.fits_within(1000, 1000));
    }

    #[test]
    fn test_extreme_ratio_keeps_one_pixel() {
        let rect = resolve(10000, 1, 100, 100, FitMode::Contain)
            .unwrap()
            .to_pixel_rect(100, 100);
        assert_eq!(rect.height, 1);
        assert!(rect.fits_within(100, 100));
    }
}
