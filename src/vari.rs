//! Visible Atmospherically Resistant Index (VARI) analysis of field photos.
//!
//! `vari = (G - R) / (G + R - B + ε)` per pixel with channels scaled to
//! [0, 1]. The scalar average only counts finite values inside [-1, 1]; the
//! per-pixel map keeps everything and the renderer clips it into bands.

use crate::error::{AppError, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, Rgb, RgbImage};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Guards the denominator against division by zero; no other smoothing.
pub const VARI_EPSILON: f32 = 1e-6;

pub const EXCELLENT_THRESHOLD: f64 = 0.20;
pub const MODERATE_THRESHOLD: f64 = 0.05;

/// Band boundaries of the rendered map: [-1, -0.1), [-0.1, 0.1), [0.1, 0.2), [0.2, 1.0].
pub const BAND_EDGES: [f32; 5] = [-1.0, -0.1, 0.1, 0.2, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthClass {
    Excellent,
    Moderate,
    Poor,
}

impl HealthClass {
    pub fn from_average(average: f64) -> Self {
        if average >= EXCELLENT_THRESHOLD {
            HealthClass::Excellent
        } else if average >= MODERATE_THRESHOLD {
            HealthClass::Moderate
        } else {
            HealthClass::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthClass::Excellent => "EXCELLENT",
            HealthClass::Moderate => "MODERATE",
            HealthClass::Poor => "POOR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HealthClass::Excellent => "Healthy, dense vegetation.",
            HealthClass::Moderate => "Moderate vegetation - check for patchy growth.",
            HealthClass::Poor => "Poor vegetation cover or crop stress - inspect the field.",
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display band of a single map value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariBand {
    Stressed,
    Sparse,
    Moderate,
    Healthy,
}

impl VariBand {
    pub const ALL: [VariBand; 4] = [
        VariBand::Stressed,
        VariBand::Sparse,
        VariBand::Moderate,
        VariBand::Healthy,
    ];

    /// Half-open `[lower, upper)` bands, top band closed at 1.0. Values beyond
    /// either end clip to the nearest band; NaN falls into the lowest.
    pub fn from_value(value: f32) -> Self {
        if value.is_nan() || value < BAND_EDGES[1] {
            VariBand::Stressed
        } else if value < BAND_EDGES[2] {
            VariBand::Sparse
        } else if value < BAND_EDGES[3] {
            VariBand::Moderate
        } else {
            VariBand::Healthy
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            VariBand::Stressed => Rgb([215, 48, 39]),
            VariBand::Sparse => Rgb([254, 224, 139]),
            VariBand::Moderate => Rgb([166, 217, 106]),
            VariBand::Healthy => Rgb([26, 152, 80]),
        }
    }

    fn index(&self) -> usize {
        match self {
            VariBand::Stressed => 0,
            VariBand::Sparse => 1,
            VariBand::Moderate => 2,
            VariBand::Healthy => 3,
        }
    }
}

/// Row-major grid of per-pixel VARI values.
#[derive(Debug, Clone, PartialEq)]
pub struct VariMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl VariMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Share of pixels in each display band, in `VariBand::ALL` order.
    pub fn band_fractions(&self) -> [f64; 4] {
        let mut counts = [0usize; 4];
        for value in &self.values {
            counts[VariBand::from_value(*value).index()] += 1;
        }
        let total = self.values.len().max(1) as f64;
        counts.map(|c| c as f64 / total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariResult {
    pub average: f64,
    pub per_pixel_map: VariMap,
    pub classification: HealthClass,
    /// Pixels that contributed to `average`.
    pub valid_pixels: usize,
}

pub fn vari_index(r: f32, g: f32, b: f32) -> f32 {
    (g - r) / (g + r - b + VARI_EPSILON)
}

/// Decode a PNG/JPEG upload and analyze it.
pub fn analyze_image_bytes(bytes: &[u8]) -> Result<VariResult> {
    let image = image::load_from_memory(bytes)?;
    compute_vari(&image)
}

pub fn compute_vari(image: &DynamicImage) -> Result<VariResult> {
    let channels = image.color().channel_count();
    if channels < 3 {
        return Err(AppError::ImageDecode(format!(
            "expected a color image with 3 channels, got {}",
            channels
        )));
    }

    // Float conversion scales every bit depth into [0, 1] without first
    // truncating 16-bit samples to 8 bits.
    let rgb = image.to_rgb32f();
    let (width, height) = rgb.dimensions();

    let mut values = Vec::with_capacity(width as usize * height as usize);
    let mut sum = 0.0f64;
    let mut valid_pixels = 0usize;

    for Rgb([r, g, b]) in rgb.pixels() {
        let value = vari_index(*r, *g, *b);
        if value.is_finite() && (-1.0..=1.0).contains(&value) {
            sum += value as f64;
            valid_pixels += 1;
        }
        values.push(value);
    }

    if valid_pixels == 0 {
        return Err(AppError::InsufficientData(
            "no pixel produced a VARI value within [-1, 1]".to_string(),
        ));
    }

    let average = sum / valid_pixels as f64;
    let classification = HealthClass::from_average(average);
    debug!(
        "VARI over {}x{}: average {:.4} from {} valid pixels ({})",
        width, height, average, valid_pixels, classification
    );

    Ok(VariResult {
        average,
        per_pixel_map: VariMap {
            width,
            height,
            values,
        },
        classification,
        valid_pixels,
    })
}

/// Color-banded rendering of a VARI map.
pub fn render_map(map: &VariMap) -> RgbImage {
    RgbImage::from_fn(map.width, map.height, |x, y| {
        let value = map.get(x, y).unwrap_or(f32::NAN);
        VariBand::from_value(value).color()
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([r, g, b])))
    }

    #[test]
    fn test_pure_green_is_excellent() {
        let result = compute_vari(&solid(0, 255, 0)).unwrap();
        let expected = 1.0f32 / (1.0 + VARI_EPSILON);
        assert_eq!(result.per_pixel_map.get(0, 0), Some(expected));
        assert!((result.average - 1.0).abs() < 1e-5);
        assert_eq!(result.classification, HealthClass::Excellent);
        assert_eq!(result.valid_pixels, 12);
    }

    #[test]
    fn test_pure_red_is_poor() {
        let result = compute_vari(&solid(255, 0, 0)).unwrap();
        assert!((result.average + 1.0).abs() < 1e-5);
        assert!(result.average >= -1.0);
        assert_eq!(result.classification, HealthClass::Poor);
    }

    #[test]
    fn test_gray_is_zero() {
        for level in [0u8, 128, 255] {
            let result = compute_vari(&solid(level, level, level)).unwrap();
            assert_eq!(result.average, 0.0);
            assert_eq!(result.classification, HealthClass::Poor);
        }
    }

    #[test]
    fn test_out_of_range_pixels_excluded_from_average() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 255, 0]));
        // (51 - 25) / (51 + 25 - 64) ~= 2.17
        img.put_pixel(1, 0, Rgb([25, 51, 64]));

        let result = compute_vari(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(result.valid_pixels, 1);
        assert!(result.per_pixel_map.get(1, 0).unwrap() > 1.0);
        assert!((result.average - 1.0).abs() < 1e-5);
        assert_eq!(
            VariBand::from_value(result.per_pixel_map.get(1, 0).unwrap()),
            VariBand::Healthy
        );
    }

    #[test]
    fn test_all_pixels_out_of_range_is_insufficient() {
        let result = compute_vari(&solid(25, 51, 64));
        assert!(matches!(result, Err(AppError::InsufficientData(_))));
    }

    #[test]
    fn test_grayscale_rejected() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([100])));
        assert!(matches!(compute_vari(&gray), Err(AppError::ImageDecode(_))));
    }

    #[test]
    fn test_alpha_channel_ignored() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([0, 255, 0, 10]),
        ));
        let result = compute_vari(&rgba).unwrap();
        assert_eq!(result.classification, HealthClass::Excellent);
    }

    #[test]
    fn test_sixteen_bit_channels_keep_full_precision() {
        // 8-bit truncation would turn both channels into 0 or 1 and skew the index
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
            2,
            2,
            Rgb([100u16, 200, 0]),
        ));
        let result = compute_vari(&img).unwrap();
        assert_eq!(result.valid_pixels, 4);
        assert!(
            (result.average - 1.0 / 3.0).abs() < 1e-3,
            "average was {}",
            result.average
        );
    }

    #[test]
    fn test_sixteen_bit_classification_uses_true_value() {
        // (120 - 100) / (120 + 100) ~= 0.09
        let img = DynamicImage::ImageRgba16(image::ImageBuffer::from_pixel(
            3,
            3,
            image::Rgba([100u16, 120, 0, u16::MAX]),
        ));
        let result = compute_vari(&img).unwrap();
        assert!((result.average - 0.0909).abs() < 1e-3);
        assert_eq!(result.classification, HealthClass::Moderate);
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(HealthClass::from_average(0.20), HealthClass::Excellent);
        assert_eq!(HealthClass::from_average(0.1999), HealthClass::Moderate);
        assert_eq!(HealthClass::from_average(0.05), HealthClass::Moderate);
        assert_eq!(HealthClass::from_average(0.0499), HealthClass::Poor);
        assert_eq!(HealthClass::from_average(-1.0), HealthClass::Poor);
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(VariBand::from_value(-1.0), VariBand::Stressed);
        assert_eq!(VariBand::from_value(-0.1), VariBand::Sparse);
        assert_eq!(VariBand::from_value(0.1), VariBand::Moderate);
        assert_eq!(VariBand::from_value(0.2), VariBand::Healthy);
        assert_eq!(VariBand::from_value(1.0), VariBand::Healthy);
        assert_eq!(VariBand::from_value(-3.0), VariBand::Stressed);
        assert_eq!(VariBand::from_value(f32::INFINITY), VariBand::Healthy);
        assert_eq!(VariBand::from_value(f32::NEG_INFINITY), VariBand::Stressed);
        assert_eq!(VariBand::from_value(f32::NAN), VariBand::Stressed);
    }

    #[test]
    fn test_render_map_uses_band_colors() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 255, 0]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        let result = compute_vari(&DynamicImage::ImageRgb8(img)).unwrap();

        let rendered = render_map(&result.per_pixel_map);
        assert_eq!(rendered.dimensions(), (2, 1));
        assert_eq!(*rendered.get_pixel(0, 0), VariBand::Healthy.color());
        assert_eq!(*rendered.get_pixel(1, 0), VariBand::Stressed.color());
        assert_eq!(result.per_pixel_map.band_fractions(), [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let mut img = RgbImage::new(8, 8);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 30) as u8, (y * 30) as u8, ((x + y) * 10) as u8]);
        }
        let img = DynamicImage::ImageRgb8(img);

        let first = compute_vari(&img).unwrap();
        let second = compute_vari(&img).unwrap();
        assert_eq!(first.average.to_bits(), second.average.to_bits());
        assert_eq!(first.per_pixel_map, second.per_pixel_map);
    }

    #[test]
    fn test_png_round_trip_through_analysis() {
        let png = encode_png(&RgbImage::from_pixel(3, 3, Rgb([0, 255, 0]))).unwrap();
        let result = analyze_image_bytes(&png).unwrap();
        assert_eq!(result.classification, HealthClass::Excellent);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = analyze_image_bytes(b"definitely not an image");
        assert!(matches!(result, Err(AppError::ImageDecode(_))));
    }
}
