//! Collector-number recognition as an ordered chain of strategies.
//!
//! Each strategy gets the oriented card and either returns a normalized
//! token or nothing. The chain runs per orientation (upright, then flipped)
//! and stops at the first strategy that produces a value.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::detection::preprocessing::{close_2x2, collector_variants, upscale};
use crate::geometry::{BoundingBox, Rotation};
use crate::models::{CollectorNumberResult, NumberSource};
use crate::recognition::ocr::{
    Charset, OcrConfig, PageMode, TextBox, TextRecognizer, COLLECTOR_CONFIGS,
};
use crate::recognition::text::normalize_collector_number;

/// Fractional rectangle of a card
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x_start: f32,
    pub x_end: f32,
    pub y_start: f32,
    pub y_end: f32,
}

impl Region {
    pub const fn new(x_start: f32, x_end: f32, y_start: f32, y_end: f32) -> Self {
        Self { x_start, x_end, y_start, y_end }
    }

    /// Pixel box of this region inside a `width`×`height` image
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x0 = (width as f32 * self.x_start) as u32;
        let x1 = ((width as f32 * self.x_end) as u32).min(width);
        let y0 = (height as f32 * self.y_start) as u32;
        let y1 = ((height as f32 * self.y_end) as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn crop(&self, image: &RgbImage) -> Option<(RgbImage, BoundingBox)> {
        let b = self.to_pixels(image.width(), image.height())?;
        Some((imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image(), b))
    }
}

/// Collector-number windows: bottom-left, bottom-center, bottom-right,
/// each in a standard and a taller variant
pub const COLLECTOR_REGIONS: [Region; 6] = [
    Region::new(0.02, 0.32, 0.84, 0.98),
    Region::new(0.01, 0.34, 0.78, 0.98),
    Region::new(0.33, 0.67, 0.84, 0.98),
    Region::new(0.30, 0.70, 0.78, 0.98),
    Region::new(0.68, 0.98, 0.84, 0.98),
    Region::new(0.60, 0.98, 0.78, 0.98),
];

/// Continuous strip along the bottom edge searched by the detector strategies
pub const BOTTOM_BAND: Region = Region::new(0.0, 1.0, 0.80, 0.99);

pub const COLLECTOR_SCALES: [f32; 3] = [2.0, 2.6, 3.0];

const LINE_DIGITS: OcrConfig = OcrConfig::new(PageMode::SingleLine, Charset::DigitsSlash);
const LINE_ALNUM: OcrConfig = OcrConfig::new(PageMode::SingleLine, Charset::Alnum);
const LINE_ALNUM_SLASH: OcrConfig = OcrConfig::new(PageMode::SingleLine, Charset::AlnumSlash);

pub trait CollectorStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// One attempt on an already-oriented card image
    fn attempt(
        &self,
        recognizer: &dyn TextRecognizer,
        image: &RgbImage,
        rotation: Rotation,
    ) -> Option<CollectorNumberResult>;
}

/// Merges detected boxes into text lines: boxes whose vertical centres lie
/// within 0.7 line-heights and whose horizontal gap is under 1.5
/// line-heights join the current line. The first box's confidence is kept.
pub fn merge_text_boxes(mut boxes: Vec<TextBox>) -> Vec<TextBox> {
    if boxes.is_empty() {
        return boxes;
    }
    boxes.sort_by_key(|b| (b.y0, b.x0));

    let mut merged = Vec::new();
    let mut current = boxes[0];
    for next in boxes.iter().skip(1) {
        let line_height = current.height().max(next.height()) as f32;
        if line_height == 0.0 {
            continue;
        }
        let y_center = current.y0 as f32 + current.height() as f32 / 2.0;
        let ny_center = next.y0 as f32 + next.height() as f32 / 2.0;
        let aligned = (y_center - ny_center).abs() < line_height * 0.7;
        let proximal = (next.x0 as f32 - current.x1 as f32) < line_height * 1.5;

        if aligned && proximal {
            current.x0 = current.x0.min(next.x0);
            current.y0 = current.y0.min(next.y0);
            current.x1 = current.x1.max(next.x1);
            current.y1 = current.y1.max(next.y1);
        } else {
            merged.push(current);
            current = *next;
        }
    }
    merged.push(current);
    merged
}

fn read_token(recognizer: &dyn TextRecognizer, image: &DynamicImage, config: &OcrConfig) -> Option<(String, String)> {
    let text = recognizer.read_text(image, config).ok()?;
    let token = normalize_collector_number(&text)?;
    Some((token, text))
}

fn passes_confidence(b: &TextBox, min_confidence: f32) -> bool {
    b.confidence.is_none_or(|c| c >= min_confidence)
}

/// Detector strategy over an upsampled bottom band, reading merged text lines
pub struct DetectorLineStrategy {
    pub band: Region,
    pub upsample: f32,
    pub min_confidence: f32,
}

impl Default for DetectorLineStrategy {
    fn default() -> Self {
        Self {
            band: BOTTOM_BAND,
            upsample: 2.5,
            min_confidence: 0.5,
        }
    }
}

impl CollectorStrategy for DetectorLineStrategy {
    fn name(&self) -> &str {
        "detector_line"
    }

    fn attempt(&self, recognizer: &dyn TextRecognizer, image: &RgbImage, rotation: Rotation) -> Option<CollectorNumberResult> {
        let (band, band_box) = self.band.crop(image)?;
        let w = ((band.width() as f32 * self.upsample).round() as u32).max(1);
        let h = ((band.height() as f32 * self.upsample).round() as u32).max(1);
        let upsampled = imageops::resize(&band, w, h, FilterType::CatmullRom);

        let boxes = match recognizer.detect_text(&DynamicImage::ImageRgb8(upsampled.clone())) {
            Ok(boxes) => boxes,
            Err(e) => {
                debug!(error = %e, "text detection failed");
                return None;
            }
        };
        let boxes: Vec<TextBox> = boxes.into_iter().filter(|b| passes_confidence(b, self.min_confidence)).collect();
        if boxes.is_empty() {
            return None;
        }

        for line in merge_text_boxes(boxes) {
            if (line.width() as f32) < line.height() as f32 * 1.5 {
                continue;
            }
            if line.width() == 0 || line.height() == 0 {
                continue;
            }
            let crop = DynamicImage::ImageRgb8(
                imageops::crop_imm(&upsampled, line.x0, line.y0, line.width(), line.height()).to_image(),
            );
            let card_box = BoundingBox::new(
                band_box.x + (line.x0 as f32 / self.upsample) as u32,
                band_box.y + (line.y0 as f32 / self.upsample) as u32,
                (line.width() as f32 / self.upsample) as u32,
                (line.height() as f32 / self.upsample) as u32,
            );

            if let Some((token, raw)) = read_token(recognizer, &crop, &LINE_DIGITS) {
                debug!(raw = %raw, token = %token, "detector line (digits)");
                if token.contains('/') {
                    return Some(CollectorNumberResult {
                        bbox: Some(card_box),
                        confidence: line.confidence,
                        ..CollectorNumberResult::found(token, NumberSource::DetectorLine, raw, rotation)
                    });
                }
            }
            if let Some((token, raw)) = read_token(recognizer, &crop, &LINE_ALNUM) {
                debug!(raw = %raw, token = %token, "detector line (alnum)");
                return Some(CollectorNumberResult {
                    bbox: Some(card_box),
                    confidence: line.confidence,
                    ..CollectorNumberResult::found(token, NumberSource::DetectorLineAlnum, raw, rotation)
                });
            }
        }
        None
    }
}

/// Detector strategy reading individual boxes in the bottom band,
/// left-most first, digits before alphanumerics
pub struct DetectorBoxStrategy {
    pub band: Region,
    pub min_confidence: f32,
}

impl Default for DetectorBoxStrategy {
    fn default() -> Self {
        Self {
            band: BOTTOM_BAND,
            min_confidence: 0.6,
        }
    }
}

impl CollectorStrategy for DetectorBoxStrategy {
    fn name(&self) -> &str {
        "detector"
    }

    fn attempt(&self, recognizer: &dyn TextRecognizer, image: &RgbImage, rotation: Rotation) -> Option<CollectorNumberResult> {
        let (band, band_box) = self.band.crop(image)?;
        let mut boxes: Vec<TextBox> = recognizer
            .detect_text(&DynamicImage::ImageRgb8(band.clone()))
            .ok()?
            .into_iter()
            .filter(|b| passes_confidence(b, self.min_confidence) && b.width() > 0 && b.height() > 0)
            .collect();
        boxes.sort_by_key(|b| (b.x0, std::cmp::Reverse(b.y1)));

        for config in [LINE_DIGITS, LINE_ALNUM_SLASH] {
            for b in &boxes {
                let crop = DynamicImage::ImageRgb8(imageops::crop_imm(&band, b.x0, b.y0, b.width(), b.height()).to_image());
                if let Some((token, raw)) = read_token(recognizer, &crop, &config) {
                    debug!(raw = %raw, token = %token, config = %config.label(), "band detector");
                    return Some(CollectorNumberResult {
                        bbox: Some(BoundingBox::new(band_box.x + b.x0, band_box.y + b.y0, b.width(), b.height())),
                        confidence: b.confidence,
                        ..CollectorNumberResult::found(token, NumberSource::Detector, raw, rotation)
                    });
                }
            }
        }
        None
    }
}

/// Detected boxes shorter than this are too small to hold a number
pub const MIN_REGION_BOX_HEIGHT: u32 = 10;
const REGION_DETECTOR_MIN_CONFIDENCE: f32 = 0.6;

/// Search over fixed windows, binarization variants, upscale factors and
/// OCR configurations. With `region_detector` set, each window first gets a
/// detector pass whose boxes are read digits-first, then alphanumeric.
pub struct LegacyStrategy {
    pub regions: Vec<Region>,
    pub scales: Vec<f32>,
    pub configs: Vec<OcrConfig>,
    pub region_detector: bool,
}

impl Default for LegacyStrategy {
    fn default() -> Self {
        Self {
            regions: COLLECTOR_REGIONS.to_vec(),
            scales: COLLECTOR_SCALES.to_vec(),
            configs: COLLECTOR_CONFIGS.to_vec(),
            region_detector: false,
        }
    }
}

/// Detector pass over one collector window
fn read_region_boxes(
    recognizer: &dyn TextRecognizer,
    roi: &RgbImage,
    roi_box: &BoundingBox,
    rotation: Rotation,
) -> Option<CollectorNumberResult> {
    let mut boxes: Vec<TextBox> = match recognizer.detect_text(&DynamicImage::ImageRgb8(roi.clone())) {
        Ok(boxes) => boxes,
        Err(e) => {
            debug!(error = %e, "region detection failed");
            return None;
        }
    };
    boxes.retain(|b| {
        passes_confidence(b, REGION_DETECTOR_MIN_CONFIDENCE) && b.width() > 0 && b.height() >= MIN_REGION_BOX_HEIGHT
    });
    boxes.sort_by_key(|b| (b.x0, std::cmp::Reverse(b.y1)));

    for b in &boxes {
        let crop = DynamicImage::ImageRgb8(imageops::crop_imm(roi, b.x0, b.y0, b.width(), b.height()).to_image());
        let read = read_token(recognizer, &crop, &LINE_DIGITS).or_else(|| read_token(recognizer, &crop, &LINE_ALNUM_SLASH));
        if let Some((token, raw)) = read {
            debug!(raw = %raw, token = %token, "region detector");
            return Some(CollectorNumberResult {
                bbox: Some(BoundingBox::new(roi_box.x + b.x0, roi_box.y + b.y0, b.width(), b.height())),
                confidence: b.confidence,
                ..CollectorNumberResult::found(token, NumberSource::Detector, raw, rotation)
            });
        }
    }
    None
}

/// Left-to-right concatenation of plausible number fragments
fn join_number_tokens(recognizer: &dyn TextRecognizer, image: &DynamicImage, config: &OcrConfig) -> Option<String> {
    let words = recognizer.read_words(image, config).ok()?;
    let mut tokens: Vec<(u32, String)> = words
        .into_iter()
        .filter(|w| w.confidence.is_none_or(|c| c >= 10.0))
        .map(|w| (w.left, w.text.trim().to_uppercase()))
        .filter(|(_, t)| !t.is_empty() && t.chars().any(|c| c.is_ascii_digit() || matches!(c, '/' | 'O' | 'I' | 'L')))
        .collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.sort_by_key(|(left, _)| *left);
    Some(tokens.into_iter().map(|(_, t)| t).collect())
}

impl CollectorStrategy for LegacyStrategy {
    fn name(&self) -> &str {
        "legacy"
    }

    fn attempt(&self, recognizer: &dyn TextRecognizer, image: &RgbImage, rotation: Rotation) -> Option<CollectorNumberResult> {
        for region in &self.regions {
            let Some((roi, roi_box)) = region.crop(image) else {
                continue;
            };
            if self.region_detector {
                if let Some(result) = read_region_boxes(recognizer, &roi, &roi_box, rotation) {
                    return Some(result);
                }
            }
            for variant in collector_variants(&DynamicImage::ImageRgb8(roi)) {
                for &scale in &self.scales {
                    let thick = DynamicImage::ImageLuma8(close_2x2(&upscale(&variant, scale)));

                    for config in &self.configs {
                        let Ok(text) = recognizer.read_text(&thick, config) else {
                            continue;
                        };
                        if let Some(token) = normalize_collector_number(&text) {
                            debug!(raw = %text, token = %token, config = %config.label(), "legacy line read");
                            return Some(CollectorNumberResult {
                                config: Some(config.label()),
                                ..CollectorNumberResult::found(token, NumberSource::OcrLine, text, rotation)
                            });
                        }

                        let Some(combined) = join_number_tokens(recognizer, &thick, config) else {
                            continue;
                        };
                        if let Some(token) = normalize_collector_number(&combined) {
                            debug!(raw = %combined, token = %token, config = %config.label(), "legacy word read");
                            return Some(CollectorNumberResult {
                                config: Some(config.label()),
                                ..CollectorNumberResult::found(token, NumberSource::OcrBoxes, combined, rotation)
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

/// Runs the strategy chain over the upright and flipped card
pub struct CollectorRecognizer {
    pub rotations: Vec<Rotation>,
    pub strategies: Vec<Box<dyn CollectorStrategy>>,
}

impl CollectorRecognizer {
    /// Standard chain; detector strategies only when a text detector is enabled
    pub fn new(use_detector: bool) -> Self {
        let mut strategies: Vec<Box<dyn CollectorStrategy>> = Vec::new();
        if use_detector {
            strategies.push(Box::new(DetectorLineStrategy::default()));
            strategies.push(Box::new(DetectorBoxStrategy::default()));
        }
        strategies.push(Box::new(LegacyStrategy {
            region_detector: use_detector,
            ..LegacyStrategy::default()
        }));
        Self::with_strategies(strategies)
    }

    pub fn with_strategies(strategies: Vec<Box<dyn CollectorStrategy>>) -> Self {
        Self {
            rotations: vec![Rotation::Deg0, Rotation::Deg180],
            strategies,
        }
    }

    /// First token found wins; an exhausted chain yields an absent result
    pub fn recognize(&self, recognizer: Option<&dyn TextRecognizer>, card: &RgbImage) -> CollectorNumberResult {
        let Some(recognizer) = recognizer else {
            return CollectorNumberResult::absent();
        };
        for &rotation in &self.rotations {
            let rotated = rotation.apply(card);
            for strategy in &self.strategies {
                if let Some(result) = strategy.attempt(recognizer, &rotated, rotation) {
                    debug!(strategy = strategy.name(), value = ?result.value, "collector number found");
                    return result;
                }
            }
        }
        debug!("no collector number recognized");
        CollectorNumberResult::absent()
    }
}

impl Default for CollectorRecognizer {
    fn default() -> Self {
        Self::new(false)
    }
}
