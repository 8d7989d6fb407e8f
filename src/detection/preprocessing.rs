use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use imageproc::morphology::{close, grayscale_close, Mask};

/// Gaussian sigma equivalent to a 5×5 kernel with automatic sigma
pub const SIGMA_5X5: f32 = 1.1;
/// Gaussian sigma equivalent to a 3×3 kernel with automatic sigma
pub const SIGMA_3X3: f32 = 0.8;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Morphological closing with a square kernel of the given radius
pub fn close_gaps(img: &GrayImage, radius: u8) -> GrayImage {
    close(img, Norm::LInf, radius)
}

/// Morphological closing with a 2×2 square kernel anchored at its lower-right cell
pub fn close_2x2(img: &GrayImage) -> GrayImage {
    let kernel = Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255])), 1, 1);
    grayscale_close(img, &kernel)
}

/// Contrast-limited adaptive histogram equalization.
///
/// Each tile of a `grid`×`grid` layout gets its own clipped histogram LUT;
/// pixels blend the LUTs of the four nearest tile centres bilinearly.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }
    let grid_x = grid.clamp(1, width);
    let grid_y = grid.clamp(1, height);
    let tile_w = width.div_ceil(grid_x);
    let tile_h = height.div_ceil(grid_y);

    let mut luts = vec![[0u8; 256]; (grid_x * grid_y) as usize];
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            let mut hist = [0u32; 256];
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            let limit = ((clip_limit * count as f32) / 256.0).max(1.0) as u32;
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += bonus + u32::from(i < remainder);
            }

            let lut = &mut luts[(ty * grid_x + tx) as usize];
            let mut cdf = 0u32;
            for (i, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[i] = ((cdf as f32 * 255.0) / count as f32).round().min(255.0) as u8;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let v = img.get_pixel(x, y)[0] as usize;
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, (grid_x - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (grid_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(grid_x - 1);
        let ty1 = (ty0 + 1).min(grid_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let at = |tx: u32, ty: u32| luts[(ty * grid_x + tx) as usize][v] as f32;
        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Local threshold against a Gaussian-weighted neighbourhood mean minus `offset`.
/// `block_size` is the odd window width the weighting approximates.
pub fn adaptive_threshold_gaussian(img: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(img, sigma);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y)[0] as i16;
        let t = local_mean.get_pixel(x, y)[0] as i16 - offset;
        Luma([if p > t { 255 } else { 0 }])
    })
}

/// Binary threshold at the Otsu level
pub fn otsu_threshold(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    binary_threshold(img, level)
}

pub fn binary_threshold(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Binary)
}

/// Clip everything brighter than `level` down to it
pub fn truncate(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Truncate)
}

pub fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    imageops::invert(&mut out);
    out
}

pub fn bitwise_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| Luma([a.get_pixel(x, y)[0] & b.get_pixel(x, y)[0]]))
}

pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| Luma([a.get_pixel(x, y)[0] | b.get_pixel(x, y)[0]]))
}

/// Mean and standard deviation of pixel intensities
pub fn mean_std(img: &GrayImage) -> (f64, f64) {
    let n = (img.width() as u64 * img.height() as u64).max(1) as f64;
    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for p in img.pixels() {
        let v = p[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Scale by `factor` with cubic interpolation
pub fn upscale(img: &GrayImage, factor: f32) -> GrayImage {
    let w = ((img.width() as f32 * factor).round() as u32).max(1);
    let h = ((img.height() as f32 * factor).round() as u32).max(1);
    imageops::resize(img, w, h, FilterType::CatmullRom)
}

/// Binarize a name window: CLAHE, then the AND of adaptive and Otsu
/// thresholds, flipped to dark-on-light, then a small closing.
pub fn binarize_for_name(roi: &DynamicImage) -> GrayImage {
    let gray = clahe(&roi.to_luma8(), 2.5, 8);
    let blurred = apply_blur(&gray, SIGMA_5X5);
    let adaptive = adaptive_threshold_gaussian(&blurred, 31, 5);
    let otsu = otsu_threshold(&blurred);
    let mut combined = bitwise_and(&adaptive, &otsu);
    if mean_std(&combined).0 < 128.0 {
        combined = invert(&combined);
    }
    close_2x2(&combined)
}

/// Binarized variants of a collector-number window, deduplicated by
/// their (mean, std) fingerprint.
pub fn collector_variants(roi: &DynamicImage) -> Vec<GrayImage> {
    let gray = truncate(&roi.to_luma8(), 235);
    let gray = clahe(&gray, 2.0, 8);
    let denoised = bilateral_filter(&gray, 7, 50.0, 50.0);
    let blurred = apply_blur(&denoised, SIGMA_3X3);

    let adaptive = adaptive_threshold_gaussian(&blurred, 31, 5);
    let otsu = otsu_threshold(&blurred);
    let and = bitwise_and(&adaptive, &otsu);
    let or = bitwise_or(&adaptive, &otsu);

    let mut variants = Vec::new();
    for img in [adaptive, otsu, and, or] {
        let dark = mean_std(&img).0 < 128.0;
        let inverted = dark.then(|| invert(&img));
        variants.push(img);
        variants.extend(inverted);
    }

    let mut seen = std::collections::HashSet::new();
    variants
        .into_iter()
        .filter(|v| {
            let (mean, std) = mean_std(v);
            seen.insert((mean.to_bits(), std.to_bits()))
        })
        .collect()
}
