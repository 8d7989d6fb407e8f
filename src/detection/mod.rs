pub mod contours;
pub mod preprocessing;
pub mod rectify;
pub mod steps;

use anyhow::Result;
use image::{DynamicImage, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::GeometryError;
use crate::models::{CardContour, RectifiedCard};
use crate::pipeline::Pipeline;
use steps::*;

/// Finds and rectifies the individual cards in a grid photograph
pub struct CardSegmenter {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub closing_radius: u8,
    pub min_area: f64,
    pub min_area_fraction: f64,
    pub merge_iou: f64,
    pub verbose: bool,
    pub debug_dir: Option<PathBuf>,
}

impl CardSegmenter {
    pub fn new() -> Self {
        Self {
            blur_sigma: preprocessing::SIGMA_5X5,
            canny_low: 50.0,
            canny_high: 150.0,
            closing_radius: 4,
            min_area: contours::MIN_CARD_AREA,
            min_area_fraction: contours::MIN_CARD_AREA_FRACTION,
            merge_iou: contours::MERGE_IOU_THRESHOLD,
            verbose: false,
            debug_dir: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Dump every step's images under `dir` on the next `segment` call
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// The step pipeline used by [`CardSegmenter::segment`]
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new()
            .with_verbose(self.verbose)
            .add_step(Arc::new(GrayscaleStep))
            .add_step(Arc::new(BlurStep { sigma: self.blur_sigma }))
            .add_step(Arc::new(EdgeDetectionStep {
                low_threshold: self.canny_low,
                high_threshold: self.canny_high,
            }))
            .add_step(Arc::new(ClosingStep { radius: self.closing_radius }))
            .add_step(Arc::new(ContourDetectionStep {
                min_area: self.min_area,
                min_area_fraction: self.min_area_fraction,
            }))
            .add_step(Arc::new(FragmentMergeStep { iou_threshold: self.merge_iou }));

        if let Some(dir) = &self.debug_dir {
            pipeline = pipeline.with_debug(dir.clone())?;
        }
        Ok(pipeline)
    }

    /// Card outlines ordered top-to-bottom, then left-to-right
    pub fn segment(&self, image: &RgbImage) -> Result<Vec<CardContour>> {
        let pipeline = self.build_pipeline()?;
        let items = pipeline.run(DynamicImage::ImageRgb8(image.clone()))?;
        let contours: Vec<CardContour> = items.into_iter().filter_map(|item| item.contour).collect();
        info!(count = contours.len(), "cards detected");
        Ok(contours)
    }

    /// Perspective-correct one outline; unusable outlines are logged and reported
    pub fn rectify(&self, image: &RgbImage, contour: &CardContour, index: usize) -> Result<RectifiedCard, GeometryError> {
        match rectify::rectify(image, contour) {
            Ok(card) => {
                if card.used_min_area_rect {
                    info!(contour = index + 1, "using min-area rectangle for noisy outline");
                }
                Ok(card)
            }
            Err(e) => {
                warn!(contour = index + 1, error = %e, "skipping contour");
                Err(e)
            }
        }
    }
}

impl Default for CardSegmenter {
    fn default() -> Self {
        Self::new()
    }
}
