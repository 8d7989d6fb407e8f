use image::RgbImage;
use imageproc::point::Point;
use serde::Serialize;

use crate::geometry::{polygon_area, polygon_centroid, BoundingBox, Rotation};

/// Closed boundary of one detected card in photograph pixel space
#[derive(Debug, Clone, PartialEq)]
pub struct CardContour {
    pub points: Vec<Point<i32>>,
}

impl CardContour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points).unwrap_or(BoundingBox::new(0, 0, 0, 0))
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Area centroid; degenerate outlines fall back to the bounding-box centre
    pub fn centroid(&self) -> (f64, f64) {
        polygon_centroid(&self.points).unwrap_or_else(|| self.bounding_box().center())
    }

    /// Centroid scaled into [0,1]² by the photograph dimensions
    pub fn normalized_centroid(&self, width: u32, height: u32) -> (f64, f64) {
        let (cx, cy) = self.centroid();
        (cx / width.max(1) as f64, cy / height.max(1) as f64)
    }
}

/// Perspective-corrected, axis-aligned card image at canonical size
#[derive(Debug, Clone)]
pub struct RectifiedCard {
    pub image: RgbImage,
    /// Source corners in TL, TR, BR, BL order
    pub corners: [(f32, f32); 4],
    /// Whether the min-area rectangle fallback produced the corners
    pub used_min_area_rect: bool,
}

/// One scored name reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrCandidate {
    pub text: String,
    /// Heuristic total including word/length penalties and the vertical bonus
    pub score: f32,
    /// Plain text score of `text`
    pub base_score: i32,
    pub rotation: Rotation,
    /// Whole-text OCR output of the window this candidate came from
    pub raw: String,
}

/// Outcome of name and orientation recognition
#[derive(Debug, Clone)]
pub struct NameReading {
    /// Card image rotated upright
    pub image: RgbImage,
    pub name: String,
    pub raw_text: String,
    pub rotation: Rotation,
}

/// Which strategy produced a collector number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberSource {
    DetectorLine,
    DetectorLineAlnum,
    Detector,
    OcrLine,
    OcrBoxes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorNumberResult {
    pub value: Option<String>,
    pub source: Option<NumberSource>,
    pub raw: Option<String>,
    pub rotation: Option<Rotation>,
    #[serde(rename = "box")]
    pub bbox: Option<BoundingBox>,
    pub confidence: Option<f32>,
    /// OCR configuration label for OCR-engine strategies
    pub config: Option<String>,
}

impl CollectorNumberResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn found(value: String, source: NumberSource, raw: String, rotation: Rotation) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
            raw: Some(raw),
            rotation: Some(rotation),
            ..Self::default()
        }
    }

    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }
}

/// One entry of the visual shortlist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualCandidate {
    pub reference_id: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub set_id: Option<String>,
    pub set_name: Option<String>,
    pub image: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    Lookup,
    Ocr,
    Visual,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorSource {
    Ocr,
    Visual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetSource {
    Visual,
    Lookup,
}

/// Where each resolved field came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub name: NameSource,
    pub collector_number: Option<CollectorSource>,
    pub set_hint: Option<SetSource>,
    /// Remote lookup hit via the free-text search rather than the number
    pub text_search: bool,
}

/// Fused identity of one front card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCard {
    pub name: String,
    pub collector_number: Option<String>,
    pub set_hint: Option<String>,
    pub confidence: f32,
    pub accepted: bool,
    pub lookup_hit: bool,
    pub provenance: Provenance,
}
