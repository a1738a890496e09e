//! Image normalization for text recognition.
//!
//! Converts an arbitrary photograph into a grayscale, contrast-enhanced,
//! size-bounded image. Meter photos are usually taken handheld under uneven
//! lighting, so localized (CLAHE-style) equalization separates the digits
//! from the dial background far better than a global stretch.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::filter::gaussian_blur_f32;
use thiserror::Error;

use crate::config::NormalizeConfig;

/// Normalization failure. Recognizer and store errors are collaborator
/// concerns and propagate separately as anyhow errors.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Normalizes a raw photo for OCR.
///
/// Steps, in order: grayscale conversion, bounded downscale (longest side
/// kept within `max_dimension`, aspect ratio preserved), CLAHE contrast
/// enhancement, optional light Gaussian blur. Output is deterministic for
/// identical input and configuration. Images already within bounds are
/// never resized.
pub fn normalize(raw: &DynamicImage, config: &NormalizeConfig) -> Result<GrayImage, NormalizeError> {
    let (width, height) = (raw.width(), raw.height());
    if width == 0 || height == 0 {
        return Err(NormalizeError::InvalidImage(format!(
            "zero dimensions ({}x{})",
            width, height
        )));
    }

    let mut gray = raw.to_luma8();

    let longest = width.max(height);
    if longest > config.max_dimension {
        let scale = config.max_dimension as f32 / longest as f32;
        let new_width = ((width as f32 * scale).round() as u32).max(1);
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        // Triangle filter averages source pixels when shrinking, which keeps
        // thin digit strokes readable (unlike nearest-neighbor).
        gray = image::imageops::resize(&gray, new_width, new_height, FilterType::Triangle);
    }

    gray = clahe(&gray, config.clahe_clip_limit, config.clahe_grid);

    if config.blur_enabled && config.blur_sigma > 0.0 {
        gray = gaussian_blur_f32(&gray, config.blur_sigma);
    }

    Ok(gray)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is divided into a tile grid; each tile gets an equalization
/// lookup table built from its clipped histogram (excess counts above the
/// clip limit are redistributed uniformly). Pixels are then mapped through a
/// bilinear blend of the four nearest tile tables, which avoids visible
/// seams at tile borders.
pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = grid.0.max(1).min(width);
    let tiles_y = grid.1.max(1).min(height);

    // Proportional tile partition: tile k spans [k*len/tiles, (k+1)*len/tiles).
    // Sizes differ by at most one pixel and every tile is non-empty, so no
    // origin can land past the image edge even when the side is not a
    // multiple of the grid.
    let tile_bound_x = |tx: u32| (tx as u64 * width as u64 / tiles_x as u64) as u32;
    let tile_bound_y = |ty: u32| (ty as u64 * height as u64 / tiles_y as u64) as u32;

    // One 256-entry lookup table per tile.
    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            luts.push(tile_lut(
                gray,
                tile_bound_x(tx),
                tile_bound_y(ty),
                tile_bound_x(tx + 1),
                tile_bound_y(ty + 1),
                clip_limit,
            ));
        }
    }

    let lut_at = |tx: u32, ty: u32| -> &[u8; 256] { &luts[(ty * tiles_x + tx) as usize] };

    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel.0[0] as usize;

        // Position in tile-center coordinates (fractional tile width
        // width/tiles_x, matching the partition above), clamped at the
        // borders so edge pixels interpolate within the outermost tiles.
        let gx = ((x as f32 + 0.5) * tiles_x as f32 / width as f32 - 0.5)
            .clamp(0.0, (tiles_x - 1) as f32);
        let gy = ((y as f32 + 0.5) * tiles_y as f32 / height as f32 - 0.5)
            .clamp(0.0, (tiles_y - 1) as f32);
        let tx0 = gx as u32;
        let ty0 = gy as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fx = gx - tx0 as f32;
        let fy = gy - ty0 as f32;

        let top = lut_at(tx0, ty0)[value] as f32 * (1.0 - fx) + lut_at(tx1, ty0)[value] as f32 * fx;
        let bottom =
            lut_at(tx0, ty1)[value] as f32 * (1.0 - fx) + lut_at(tx1, ty1)[value] as f32 * fx;
        let blended = top * (1.0 - fy) + bottom * fy;

        output.put_pixel(x, y, image::Luma([blended.round().clamp(0.0, 255.0) as u8]));
    }

    output
}

/// Builds the equalization lookup table for one tile region.
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    if area == 0 {
        let mut identity = [0u8; 256];
        for (i, slot) in identity.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return identity;
    }

    // Clip the histogram and spread the excess evenly over all bins.
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess: u32 = 0;
    for count in histogram.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in histogram.iter_mut().enumerate() {
        *count += bonus;
        if i < remainder {
            *count += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf: u64 = 0;
    for (i, &count) in histogram.iter().enumerate() {
        cdf += count as u64;
        lut[i] = ((cdf * 255) / area as u64).min(255) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_zero_dimension_input_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let result = normalize(&img, &NormalizeConfig::default());
        assert!(matches!(result, Err(NormalizeError::InvalidImage(_))));
    }

    #[test]
    fn test_within_bounds_image_never_resized() {
        let img = gradient_image(640, 480);
        let normalized = normalize(&img, &NormalizeConfig::default()).unwrap();
        assert_eq!(normalized.dimensions(), (640, 480));
    }

    #[test]
    fn test_oversized_image_bounded_preserving_aspect() {
        let img = gradient_image(3200, 1600);
        let normalized = normalize(&img, &NormalizeConfig::default()).unwrap();
        assert_eq!(normalized.dimensions(), (1600, 800));
    }

    #[test]
    fn test_exactly_at_bound_not_resized() {
        let img = gradient_image(1600, 900);
        let normalized = normalize(&img, &NormalizeConfig::default()).unwrap();
        assert_eq!(normalized.dimensions(), (1600, 900));
    }

    #[test]
    fn test_normalize_deterministic() {
        let img = gradient_image(320, 240);
        let config = NormalizeConfig::default();
        let first = normalize(&img, &config).unwrap();
        let second = normalize(&img, &config).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_blur_changes_output_but_not_dimensions() {
        let img = gradient_image(320, 240);
        let plain = normalize(&img, &NormalizeConfig::default()).unwrap();
        let blurred = normalize(
            &img,
            &NormalizeConfig {
                blur_enabled: true,
                ..NormalizeConfig::default()
            },
        )
        .unwrap();
        assert_eq!(plain.dimensions(), blurred.dimensions());
        assert_ne!(plain.as_raw(), blurred.as_raw());
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        // Two-tone image: left half 100, right half 150. With a single tile
        // and an effectively unlimited clip, equalization should push the
        // two levels much further apart.
        let img =
            GrayImage::from_fn(64, 64, |x, _| if x < 32 { Luma([100u8]) } else { Luma([150u8]) });
        let enhanced = clahe(&img, 1000.0, (1, 1));

        let dark = enhanced.get_pixel(0, 0).0[0];
        let bright = enhanced.get_pixel(63, 0).0[0];
        assert!(
            bright as i32 - dark as i32 > 50,
            "expected contrast stretch, got {} and {}",
            dark,
            bright
        );
    }

    #[test]
    fn test_clahe_uniform_image_stays_uniform() {
        let img = GrayImage::from_pixel(100, 80, Luma([128u8]));
        let enhanced = clahe(&img, 3.0, (8, 8));
        let first = enhanced.get_pixel(0, 0).0[0];
        assert!(enhanced.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn test_normalize_small_image_default_grid() {
        // Sides that are not multiples of the 8x8 grid used to push tile
        // origins past the image edge. Thumbnails in that range are valid
        // input and must normalize cleanly.
        for side in [9u32, 12, 17, 20, 25, 28] {
            let img = gradient_image(side, side);
            let normalized = normalize(&img, &NormalizeConfig::default()).unwrap();
            assert_eq!(normalized.dimensions(), (side, side));
        }
    }

    #[test]
    fn test_clahe_non_multiple_side_covers_every_pixel() {
        let img = GrayImage::from_fn(12, 10, |x, y| Luma([((x * 20 + y * 7) % 256) as u8]));
        let enhanced = clahe(&img, 3.0, (8, 8));
        assert_eq!(enhanced.dimensions(), (12, 10));
    }

    #[test]
    fn test_clahe_handles_image_smaller_than_grid() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(40 * x + 60 * y) as u8]));
        let enhanced = clahe(&img, 3.0, (8, 8));
        assert_eq!(enhanced.dimensions(), (4, 3));
    }
}
