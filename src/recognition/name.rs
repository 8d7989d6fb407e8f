//! Card-name reading and upright-orientation discovery.

use image::{DynamicImage, RgbImage};
use std::collections::BTreeMap;
use tracing::debug;

use crate::detection::preprocessing::binarize_for_name;
use crate::geometry::Rotation;
use crate::models::{NameReading, OcrCandidate};
use crate::recognition::ocr::{OcrWord, TextRecognizer, NAME_CONFIG};
use crate::recognition::text::{line_score, score_text, vertical_bonus};

pub const UNKNOWN_NAME: &str = "Unknown";

/// Fractional placement of the title window inside an upright card
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameWindow {
    pub x_start: f32,
    pub width: f32,
    pub y_start: f32,
    pub height: f32,
}

pub const NAME_WINDOW: NameWindow = NameWindow {
    x_start: 0.05,
    width: 0.9,
    y_start: 0.03,
    height: 0.18,
};

impl NameWindow {
    /// Crop of `image` covered by this window, `None` if empty
    pub fn crop(&self, image: &RgbImage) -> Option<RgbImage> {
        let (w, h) = image.dimensions();
        let x0 = (w as f32 * self.x_start) as u32;
        let y0 = (h as f32 * self.y_start) as u32;
        let x1 = w.min(x0 + (w as f32 * self.width) as u32);
        let y1 = h.min(y0 + (h as f32 * self.height) as u32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
    }
}

/// Joins words sharing a line key, in reading order, keeping the line's
/// topmost edge and tallest word height
fn group_lines(words: &[OcrWord]) -> Vec<(String, u32, u32)> {
    let mut grouped: BTreeMap<_, (Vec<&str>, u32, u32)> = BTreeMap::new();
    for word in words {
        if word.confidence.is_some_and(|c| c < 0.0) {
            continue;
        }
        let text = word.text.trim();
        if text.is_empty() {
            continue;
        }
        let entry = grouped.entry(word.line).or_insert((Vec::new(), word.top, word.height));
        entry.0.push(text);
        entry.1 = entry.1.min(word.top);
        entry.2 = entry.2.max(word.height);
    }
    grouped
        .into_values()
        .map(|(texts, top, height)| (texts.join(" ").trim().to_string(), top, height))
        .filter(|(text, _, _)| !text.is_empty())
        .collect()
}

/// Scored name candidates for one rotation of the card
pub fn candidates_for_rotation(
    recognizer: &dyn TextRecognizer,
    card: &RgbImage,
    rotation: Rotation,
    window: &NameWindow,
) -> Vec<OcrCandidate> {
    let rotated = rotation.apply(card);
    let Some(roi) = window.crop(&rotated) else {
        return Vec::new();
    };
    let processed = DynamicImage::ImageLuma8(binarize_for_name(&DynamicImage::ImageRgb8(roi)));

    let raw = match recognizer.read_text(&processed, &NAME_CONFIG) {
        Ok(text) => text,
        Err(e) => {
            debug!(rotation = rotation.degrees(), error = %e, "name OCR failed");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    if let Ok(words) = recognizer.read_words(&processed, &NAME_CONFIG) {
        let roi_height = processed.height();
        for (text, top, height) in group_lines(&words) {
            let base = score_text(&text);
            if base <= 0 {
                continue;
            }
            candidates.push(OcrCandidate {
                score: line_score(&text) + vertical_bonus(top, height, roi_height),
                base_score: base,
                text,
                rotation,
                raw: raw.clone(),
            });
        }
    }

    if candidates.is_empty() {
        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let base = score_text(line);
            if base <= 0 {
                continue;
            }
            candidates.push(OcrCandidate {
                score: line_score(line),
                base_score: base,
                text: line.to_string(),
                rotation,
                raw: raw.clone(),
            });
        }
    }

    candidates
}

/// Best candidate by (total score, base score, shorter text); earlier wins ties
pub fn select_best(candidates: &[OcrCandidate]) -> Option<&OcrCandidate> {
    let key = |c: &OcrCandidate| (c.score, c.base_score, -(c.text.chars().count() as i64));
    let mut best: Option<&OcrCandidate> = None;
    for candidate in candidates {
        let better = match best {
            None => true,
            Some(b) => {
                let (ks, kb, kl) = key(candidate);
                let (bs, bb, bl) = key(b);
                ks.total_cmp(&bs).then(kb.cmp(&bb)).then(kl.cmp(&bl)).is_gt()
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Reads the card name across all four quarter turns and returns the
/// upright image with the rotation that produced the strongest title.
pub fn recognize_name(recognizer: Option<&dyn TextRecognizer>, card: &RgbImage) -> NameReading {
    let candidates: Vec<OcrCandidate> = match recognizer {
        Some(r) => Rotation::ALL
            .iter()
            .flat_map(|&rotation| candidates_for_rotation(r, card, rotation, &NAME_WINDOW))
            .collect(),
        None => Vec::new(),
    };

    let Some(best) = select_best(&candidates) else {
        return NameReading {
            image: card.clone(),
            name: UNKNOWN_NAME.to_string(),
            raw_text: String::new(),
            rotation: Rotation::Deg0,
        };
    };

    let name = match best.text.trim() {
        "" => UNKNOWN_NAME.to_string(),
        text => text.to_string(),
    };
    let mut rotation = best.rotation;
    let mut image = rotation.apply(card);
    // cards are portrait
    if image.height() < image.width() {
        image = Rotation::Deg270.apply(&image);
        rotation = rotation.then(Rotation::Deg270);
    }
    debug!(name = %name, score = best.score, rotation = rotation.degrees(), "name selected");

    NameReading {
        image,
        name,
        raw_text: best.raw.clone(),
        rotation,
    }
}
