//! Per-card output folders: listing crop, quadrant crops, optional warped
//! crop and a `MANIFEST.json` audit record.

use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::correspondence::MatchStrategy;
use crate::geometry::{BoundingBox, Rotation};
use crate::models::{CollectorNumberResult, Provenance, ResolvedCard, VisualCandidate};
use crate::recognition::text::number_for_path;

/// Padding around a contour's bounding box for listing crops
pub const LISTING_PADDING: u32 = 150;
/// Side fraction of each corner-anchored quadrant crop
pub const QUADRANT_FRACTION: f32 = 0.6;
pub const MANIFEST_FILE: &str = "MANIFEST.json";
const IMAGE_EXT: &str = "jpg";

/// Strips characters that are invalid in folder names, trims, and replaces spaces
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

/// Output folder for the card at zero-based `index`
pub fn folder_name(card: &ResolvedCard, index: usize) -> String {
    let base = if !card.accepted {
        sanitize_filename(&format!("Uncertain_{}", card.name))
    } else {
        match card.collector_number.as_deref().filter(|n| !n.is_empty()) {
            Some(number) => sanitize_filename(&format!("{}_{}", card.name, number_for_path(number))),
            None => sanitize_filename(&card.name),
        }
    };
    format!("{base}_{}", index + 1)
}

/// Crop around `bbox` padded by [`LISTING_PADDING`]; falls back to `fallback` when empty
pub fn listing_crop(image: &RgbImage, bbox: &BoundingBox, fallback: &RgbImage) -> RgbImage {
    match bbox.padded(LISTING_PADDING, image.width(), image.height()) {
        Some(b) => imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image(),
        None => fallback.clone(),
    }
}

/// Corner-anchored 60% crops in TL, TR, BL, BR order with their suffixes
pub fn quadrant_crops(image: &RgbImage) -> Vec<(&'static str, RgbImage)> {
    let (w, h) = image.dimensions();
    let cw = (w as f32 * QUADRANT_FRACTION) as u32;
    let ch = (h as f32 * QUADRANT_FRACTION) as u32;
    if cw == 0 || ch == 0 {
        return Vec::new();
    }
    [
        ("TOP_LEFT", 0, 0),
        ("TOP_RIGHT", w - cw, 0),
        ("BOTTOM_LEFT", 0, h - ch),
        ("BOTTOM_RIGHT", w - cw, h - ch),
    ]
    .into_iter()
    .map(|(suffix, x, y)| (suffix, imageops::crop_imm(image, x, y, cw, ch).to_image()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackRecord {
    /// Index of the back contour in detection order
    pub contour_index: usize,
    pub strategy: MatchStrategy,
    pub listing: String,
}

/// Audit record persisted as `MANIFEST.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub chosen_name: String,
    pub collector_number: Option<String>,
    pub set_hint: Option<String>,
    pub visual_top: Option<VisualCandidate>,
    pub confidence: f32,
    pub auto_accept: bool,
    pub cn_info: CollectorNumberResult,
    pub ocr_name_raw: String,
    pub rotation: Rotation,
    pub provenance: Provenance,
    pub files: Vec<String>,
    pub back: Option<BackRecord>,
}

/// Inputs for one front bundle
pub struct FrontImages<'a> {
    /// Padded crop of the original photograph
    pub listing: &'a RgbImage,
    /// Upright rectified card
    pub upright: &'a RgbImage,
    pub save_warped: bool,
}

/// A written card folder whose manifest can still receive a back
#[derive(Debug, Clone)]
pub struct CardBundle {
    pub dir: PathBuf,
    pub folder: String,
    pub manifest: Manifest,
}

impl CardBundle {
    fn save(&mut self, stem: &str, image: &RgbImage) -> Result<()> {
        let file = format!("{stem}.{IMAGE_EXT}");
        let path = self.dir.join(&file);
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.manifest.files.push(file);
        Ok(())
    }

    fn write_manifest(&mut self) -> Result<()> {
        self.manifest.files.sort();
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Create the folder and write all front images plus the manifest
    pub fn write_front(output_dir: &Path, folder: String, manifest: Manifest, images: FrontImages<'_>) -> Result<Self> {
        let dir = output_dir.join(&folder);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let mut bundle = Self { dir, folder, manifest };
        bundle.manifest.files.clear();

        bundle.save("FRONT_LISTING", images.listing)?;
        for (suffix, crop) in quadrant_crops(images.upright) {
            bundle.save(&format!("FRONT_{suffix}"), &crop)?;
        }
        if images.save_warped {
            bundle.save("FRONT_WARPED", images.upright)?;
        }
        bundle.write_manifest()?;
        info!(
            folder = %bundle.folder,
            confidence = %format!("{:.2}", bundle.manifest.confidence),
            uncertain = !bundle.manifest.auto_accept,
            "created card folder"
        );
        Ok(bundle)
    }

    /// Write the back listing and quadrants, then rewrite the manifest
    pub fn attach_back(&mut self, back_listing: &RgbImage, contour_index: usize, strategy: MatchStrategy) -> Result<()> {
        let stale: Vec<String> = self
            .manifest
            .files
            .iter()
            .filter(|f| f.starts_with("BACK_"))
            .cloned()
            .collect();
        for file in &stale {
            let _ = fs::remove_file(self.dir.join(file));
        }
        self.manifest.files.retain(|f| !f.starts_with("BACK_"));

        self.save("BACK_LISTING", back_listing)?;
        for (suffix, crop) in quadrant_crops(back_listing) {
            self.save(&format!("BACK_{suffix}"), &crop)?;
        }
        self.manifest.back = Some(BackRecord {
            contour_index,
            strategy,
            listing: format!("BACK_LISTING.{IMAGE_EXT}"),
        });
        self.write_manifest()?;
        info!(folder = %self.folder, back = contour_index + 1, "attached back");
        Ok(())
    }
}
