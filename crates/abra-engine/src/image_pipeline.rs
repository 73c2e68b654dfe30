use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

pub const CONTRAST_FACTOR: i32 = 2;
pub const UPSCALE_FACTOR: u32 = 2;
pub const THRESHOLD: u8 = 128;

/// Decodes raw image bytes in any format the `image` crate recognizes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("failed to decode image")
}

/// Prepares a document photo for OCR: grayscale, contrast boost, 2x
/// upscale, then a hard black/white threshold.
pub fn preprocess_image(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let contrasted = enhance_contrast(&gray, CONTRAST_FACTOR);
    let upscaled = image::imageops::resize(
        &contrasted,
        contrasted.width() * UPSCALE_FACTOR,
        contrasted.height() * UPSCALE_FACTOR,
        FilterType::Lanczos3,
    );
    binarize(&upscaled, THRESHOLD)
}

/// Rounded mean intensity; 0 for an empty image.
pub fn mean_intensity(image: &GrayImage) -> u8 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0;
    }
    let total: u64 = image.pixels().map(|Luma([value])| u64::from(*value)).sum();
    ((total as f64 / count as f64) + 0.5).floor().min(255.0) as u8
}

/// Pushes every pixel away from the image mean: `mean + factor * (p - mean)`,
/// clamped to the 8-bit range.
pub fn enhance_contrast(image: &GrayImage, factor: i32) -> GrayImage {
    let mean = i32::from(mean_intensity(image));
    let mut out = image.clone();
    for Luma([value]) in out.pixels_mut() {
        let stretched = mean + factor * (i32::from(*value) - mean);
        *value = stretched.clamp(0, 255) as u8;
    }
    out
}

pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = image.clone();
    for Luma([value]) in out.pixels_mut() {
        *value = if *value < threshold { 0 } else { 255 };
    }
    out
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn mean_is_rounded() {
        let image = GrayImage::from_raw(2, 1, vec![10, 11]).unwrap();
        assert_eq!(mean_intensity(&image), 11);
        assert_eq!(mean_intensity(&GrayImage::new(0, 0)), 0);
    }

    #[test]
    fn contrast_stretches_around_mean_and_clamps() {
        let image = GrayImage::from_raw(3, 1, vec![100, 150, 200]).unwrap();
        let out = enhance_contrast(&image, 2);
        assert_eq!(out.into_raw(), vec![50, 150, 250]);

        let extreme = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        assert_eq!(enhance_contrast(&extreme, 2).into_raw(), vec![0, 255]);
    }

    #[test]
    fn binarize_splits_at_threshold() {
        let image = GrayImage::from_raw(3, 1, vec![127, 128, 200]).unwrap();
        assert_eq!(binarize(&image, 128).into_raw(), vec![0, 255, 255]);
    }

    #[test]
    fn preprocess_doubles_size_and_outputs_two_levels() {
        let mut rgb = RgbImage::new(8, 4);
        for (x, _, pixel) in rgb.enumerate_pixels_mut() {
            *pixel = if x < 4 { Rgb([20, 20, 20]) } else { Rgb([230, 230, 230]) };
        }
        let out = preprocess_image(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(out.dimensions(), (16, 8));
        assert!(out.pixels().all(|Luma([value])| *value == 0 || *value == 255));
        assert_eq!(out.get_pixel(0, 0), &Luma([0]));
        assert_eq!(out.get_pixel(15, 7), &Luma([255]));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
    }
}
