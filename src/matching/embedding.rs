//! Art-region feature vectors: HSV colour histograms plus an edge-density
//! histogram, each L2-normalized, concatenated and normalized again.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::detection::preprocessing::{apply_blur, detect_edges, SIGMA_5X5};

pub const HIST_BINS: usize = 32;
pub const EMBEDDING_SIZE: u32 = 256;
pub const EMBEDDING_LEN: usize = HIST_BINS * 4;

/// Fractional art box of an upright card, excluding border and text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtRegion {
    pub x_start: f32,
    pub x_end: f32,
    pub y_start: f32,
    pub y_end: f32,
}

pub const ART_REGION: ArtRegion = ArtRegion {
    x_start: 0.08,
    x_end: 0.92,
    y_start: 0.15,
    y_end: 0.68,
};

impl ArtRegion {
    /// Art crop, or the whole image when the window is empty
    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        let x0 = (w as f32 * self.x_start) as u32;
        let x1 = ((w as f32 * self.x_end) as u32).min(w);
        let y0 = (h as f32 * self.y_start) as u32;
        let y1 = ((h as f32 * self.y_end) as u32).min(h);
        if x1 <= x0 || y1 <= y0 {
            return image.clone();
        }
        imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image()
    }
}

/// 8-bit HSV with hue in [0, 180), saturation and value in [0, 256)
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let mut hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    let h = ((hue / 2.0).round() as u32 % 180) as u8;
    (h, s.round().min(255.0) as u8, v as u8)
}

fn histogram<I: Iterator<Item = u8>>(values: I, range: u32) -> Vec<f32> {
    let mut bins = vec![0.0f32; HIST_BINS];
    for v in values {
        let idx = (v as usize * HIST_BINS) / range as usize;
        bins[idx.min(HIST_BINS - 1)] += 1.0;
    }
    bins
}

/// Scale `v` to unit length in place; returns false for a zero vector
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
}

fn edge_histogram(gray: &GrayImage) -> Vec<f32> {
    let blurred = apply_blur(gray, SIGMA_5X5);
    let edges = detect_edges(&blurred, 50.0, 150.0);
    histogram(edges.pixels().map(|p| p[0]), 256)
}

/// Unit-length embedding of a card's art, `None` for an all-zero signal
pub fn embed(card: &RgbImage) -> Option<Vec<f32>> {
    let art = ART_REGION.crop(card);
    if art.width() == 0 || art.height() == 0 {
        return None;
    }
    let resized = imageops::resize(&art, EMBEDDING_SIZE, EMBEDDING_SIZE, FilterType::Triangle);

    let hsv: Vec<(u8, u8, u8)> = resized.pixels().map(|p| rgb_to_hsv(p[0], p[1], p[2])).collect();
    let mut features = Vec::with_capacity(EMBEDDING_LEN);
    for (values, range) in [
        (hsv.iter().map(|p| p.0).collect::<Vec<_>>(), 180),
        (hsv.iter().map(|p| p.1).collect(), 256),
        (hsv.iter().map(|p| p.2).collect(), 256),
    ] {
        let mut hist = histogram(values.into_iter(), range);
        l2_normalize(&mut hist);
        features.extend(hist);
    }

    let gray = image::DynamicImage::ImageRgb8(resized).to_luma8();
    let mut edges = edge_histogram(&gray);
    l2_normalize(&mut edges);
    features.extend(edges);

    l2_normalize(&mut features).then_some(features)
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
