use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use tracing::debug;

use crate::error::ScanError;
use crate::settings::OcrSettings;

const BILATERAL_RADIUS: u32 = 4;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

/// Decodes uploaded bytes and prepares a grayscale image for OCR:
/// bounded size, edge-preserving denoise, optional Otsu binarisation.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    max_side: u32,
    binarize: bool,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::from_settings(&OcrSettings::default())
    }
}

impl ImagePreprocessor {
    pub fn new(max_side: u32, binarize: bool) -> Self {
        Self {
            max_side: max_side.max(1),
            binarize,
        }
    }

    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(settings.max_side, settings.binarize)
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<DynamicImage, ScanError> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| ScanError::Decode(err.to_string()))?;
        Ok(self.prepare(image))
    }

    pub fn prepare(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let resized = self.bound_size(image);
        let gray = composite_luma(&resized);
        let output = if self.binarize {
            let smoothed = bilateral_filter(&gray, BILATERAL_RADIUS, BILATERAL_SIGMA_COLOR, BILATERAL_SIGMA_SPACE);
            let threshold = otsu_threshold(&smoothed);
            debug!("otsu threshold {}", threshold);
            apply_threshold(&smoothed, threshold)
        } else {
            gray
        };
        debug!(
            "preprocessed {}x{} -> {}x{}",
            width,
            height,
            output.width(),
            output.height()
        );
        DynamicImage::ImageLuma8(output)
    }

    fn bound_size(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        if longest <= self.max_side {
            return image;
        }
        let scale = self.max_side as f64 / longest as f64;
        let new_w = ((width as f64 * scale).round() as u32).max(1);
        let new_h = ((height as f64 * scale).round() as u32).max(1);
        image.resize_exact(new_w, new_h, FilterType::CatmullRom)
    }
}

/// Grayscale over a white background, so transparent screenshots do not
/// turn black.
fn composite_luma(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

fn bilateral_filter(image: &GrayImage, radius: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut output = GrayImage::new(w, h);
    let color_denom = 2.0 * sigma_color * sigma_color;
    let space_denom = 2.0 * sigma_space * sigma_space;
    let r = radius as i64;

    // Spatial weights depend only on the offset.
    let side = (2 * r + 1) as usize;
    let mut spatial = vec![0.0f32; side * side];
    for dy in -r..=r {
        for dx in -r..=r {
            let dist_sq = (dx * dx + dy * dy) as f32;
            spatial[((dy + r) as usize) * side + (dx + r) as usize] = (-dist_sq / space_denom).exp();
        }
    }

    for y in 0..h {
        for x in 0..w {
            let center = image.get_pixel(x, y)[0] as f32;
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;
            for dy in -r..=r {
                let ny = y as i64 + dy;
                if ny < 0 || ny >= h as i64 {
                    continue;
                }
                for dx in -r..=r {
                    let nx = x as i64 + dx;
                    if nx < 0 || nx >= w as i64 {
                        continue;
                    }
                    let value = image.get_pixel(nx as u32, ny as u32)[0] as f32;
                    let diff = value - center;
                    let weight = spatial[((dy + r) as usize) * side + (dx + r) as usize]
                        * (-(diff * diff) / color_denom).exp();
                    sum += value * weight;
                    weight_sum += weight;
                }
            }
            let value = if weight_sum > 0.0 {
                (sum / weight_sum).round().clamp(0.0, 255.0) as u8
            } else {
                center as u8
            };
            output.put_pixel(x, y, Luma([value]));
        }
    }
    output
}

/// Threshold maximising between-class variance of the histogram.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total = (image.width() as f64) * (image.height() as f64);
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut w_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = 0u8;
    for (t, &count) in histogram.iter().enumerate() {
        w_b += count as f64;
        if w_b == 0.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0.0 {
            break;
        }
        sum_b += t as f64 * count as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum - sum_b) / w_f;
        let variance = w_b * w_f * (m_b - m_f).powi(2);
        if variance > max_variance {
            max_variance = variance;
            threshold = t as u8;
        }
    }
    threshold
}

fn apply_threshold(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
    output
}
