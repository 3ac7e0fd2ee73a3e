use image::{ImageBuffer, Rgba, RgbaImage};
use photobatch_processor::image_processing::composite::composite;
use photobatch_processor::image_processing::encode::{quality_search, CompressionPolicy};
use photobatch_processor::image_processing::geometry::resolve;
use photobatch_processor::{FitMode, OutputFormat, Watermark};
use proptest::prelude::*;

const EPSILON: f64 = 1e-6;

proptest! {
    #[test]
    fn prop_composite_yields_target_size(
        sw in 1..1600u32,
        sh in 1..1600u32,
        tw in 1..200u32,
        th in 1..200u32,
        cover in any::<bool>(),
    ) {
        let fit = if cover { FitMode::Cover } else { FitMode::Contain };
        let source: RgbaImage = ImageBuffer::from_pixel(sw, sh, Rgba([40, 80, 120, 255]));
        let g = resolve(sw, sh, tw, th, fit).unwrap();
        let canvas = composite(&source, &g, tw, th, OutputFormat::Png, fit, None);
        prop_assert!(canvas.is_ok(), "{}x{} -> {}x{}: {:?}", sw, sh, tw, th, canvas.err());
        prop_assert_eq!(canvas.unwrap().dimensions(), (tw, th));
    }

    #[test]
    fn prop_cover_always_covers_canvas(
        sw in 1..5000u32,
        sh in 1..5000u32,
        tw in 1..3000u32,
        th in 1..3000u32,
    ) {
        let g = resolve(sw, sh, tw, th, FitMode::Cover).unwrap();
        prop_assert!(g.offset_x <= EPSILON && g.offset_y <= EPSILON);
        prop_assert!(g.draw_width >= tw as f64 - EPSILON);
        prop_assert!(g.draw_height >= th as f64 - EPSILON);

        let rect = g.to_pixel_rect(tw, th);
        prop_assert!(rect.covers(tw, th), "{:?} on {}x{}", rect, tw, th);
    }

    #[test]
    fn prop_contain_always_fits_canvas(
        sw in 1..5000u32,
        sh in 1..5000u32,
        tw in 1..3000u32,
        th in 1..3000u32,
    ) {
        let g = resolve(sw, sh, tw, th, FitMode::Contain).unwrap();
        prop_assert!(g.offset_x >= -EPSILON && g.offset_y >= -EPSILON);
        prop_assert!(g.draw_width <= tw as f64 + EPSILON);
        prop_assert!(g.draw_height <= th as f64 + EPSILON);

        let rect = g.to_pixel_rect(tw, th);
        prop_assert!(rect.fits_within(tw, th), "{:?} on {}x{}", rect, tw, th);
    }

    #[test]
    fn prop_fit_preserves_source_aspect(
        sw in 1..4000u32,
        sh in 1..4000u32,
        tw in 1..2000u32,
        th in 1..2000u32,
        cover in any::<bool>(),
    ) {
        let fit = if cover { FitMode::Cover } else { FitMode::Contain };
        let g = resolve(sw, sh, tw, th, fit).unwrap();
        let source_ratio = sw as f64 / sh as f64;
        let draw_ratio = g.draw_width / g.draw_height;
        prop_assert!((source_ratio - draw_ratio).abs() / source_ratio < 1e-9);
    }

    #[test]
    fn prop_watermark_inside_reasonable_canvases(
        cw in 20..4000u32,
        ch in 20..4000u32,
        mw in 1..800u32,
        mh in 1..800u32,
    ) {
        let image: RgbaImage = ImageBuffer::from_pixel(mw, mh, Rgba([0, 0, 0, 255]));
        let watermark = Watermark {
            name: "logo.png".to_string(),
            image,
        };
        // The mark is 20% of the canvas width at its own aspect; only marks
        // taller than the remaining height can overflow.
        let mark_height = cw as f64 * 0.20 * mh as f64 / mw as f64;
        let margin = cw as f64 * 0.05;
        prop_assume!(mark_height + margin <= ch as f64 - 1.0);

        let placement = watermark.placement(cw, ch);
        prop_assert!(!placement.overflows);
        prop_assert!(placement.rect.fits_within(cw, ch), "{:?} on {}x{}", placement.rect, cw, ch);
    }

    #[test]
    fn prop_quality_search_is_bounded(
        sizes in proptest::collection::vec(0..600usize, 7),
        budget_kb in 1..400usize,
    ) {
        let policy = CompressionPolicy::with_max_bytes(budget_kb * 1024);
        let mut calls = 0usize;
        let result = quality_search(&policy, |_| {
            let size = sizes[calls.min(sizes.len() - 1)];
            calls += 1;
            Ok(vec![0u8; size * 1024])
        })
        .unwrap();

        prop_assert!(result.attempts.len() <= 7);
        prop_assert_eq!(result.attempts.len(), calls);
        let quality = result.quality().unwrap();
        prop_assert!((0.60..=0.90).contains(&quality));
        let qualities: Vec<u8> = result.attempts.iter().map(|a| a.quality).collect();
        prop_assert!(qualities.windows(2).all(|w| w[0] > w[1]));
    }
}

#[test]
fn landscape_source_on_square_cover() {
    let g = resolve(4000, 2000, 1200, 1200, FitMode::Cover).unwrap();
    assert_eq!(g.draw_width, 2400.0);
    assert_eq!(g.draw_height, 1200.0);
    assert_eq!(g.offset_x, -600.0);
    assert_eq!(g.offset_y, 0.0);
}

#[test]
fn portrait_source_on_square_contain() {
    let g = resolve(800, 1200, 1200, 1200, FitMode::Contain).unwrap();
    assert_eq!(g.draw_width, 800.0);
    assert_eq!(g.draw_height, 1200.0);
    assert_eq!(g.offset_x, 200.0);
    assert_eq!(g.offset_y, 0.0);
}
