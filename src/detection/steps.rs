use crate::detection::{contours, preprocessing};
use crate::geometry::{merge_overlapping_contours, sort_top_to_bottom};
use crate::models::CardContour;
use crate::pipeline::{PipelineContext, PipelineData, PipelineStep};
use anyhow::Result;
use image::DynamicImage;
use tracing::debug;

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .iter()
            .map(|item| item.with_image(DynamicImage::ImageLuma8(preprocessing::to_grayscale(&item.image))))
            .collect())
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .iter()
            .map(|item| {
                let blurred = preprocessing::apply_blur(&item.image.to_luma8(), self.sigma);
                item.with_image(DynamicImage::ImageLuma8(blurred))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .iter()
            .map(|item| {
                let edges = preprocessing::detect_edges(&item.image.to_luma8(), self.low_threshold, self.high_threshold);
                item.with_image(DynamicImage::ImageLuma8(edges))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

/// Close small gaps in the edge map so card borders form closed loops
pub struct ClosingStep {
    /// Square kernel radius; 4 matches a 5×5 kernel applied twice
    pub radius: u8,
}

impl PipelineStep for ClosingStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .iter()
            .map(|item| {
                let closed = preprocessing::close_gaps(&item.image.to_luma8(), self.radius);
                item.with_image(DynamicImage::ImageLuma8(closed))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Morphological Closing"
    }
}

/// Find external contours large enough to be cards - splits one edge map into many outlines
pub struct ContourDetectionStep {
    pub min_area: f64,
    pub min_area_fraction: f64,
}

impl PipelineStep for ContourDetectionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let edges = item.image.to_luma8();
            let min_area = contours::min_card_area(
                item.original.width(),
                item.original.height(),
                self.min_area,
                self.min_area_fraction,
            );
            let external = contours::find_external_contours(&edges);
            let total = external.len();
            let kept = contours::filter_by_area(external, min_area);
            debug!(total, kept = kept.len(), min_area, "external contours");

            for points in kept {
                result.push(PipelineData::from_contour(item.original.clone(), CardContour::new(points)));
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Contour Detection"
    }
}

/// Fuse heavily overlapping outlines (a card edge split into fragments)
/// and order the survivors top-to-bottom, left-to-right
pub struct FragmentMergeStep {
    pub iou_threshold: f64,
}

impl PipelineStep for FragmentMergeStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let Some(original) = data.first().map(|d| d.original.clone()) else {
            return Ok(data);
        };

        let before = data.len();
        let outlines: Vec<_> = data.into_iter().filter_map(|d| d.contour).map(|c| c.points).collect();
        let mut merged: Vec<CardContour> = merge_overlapping_contours(outlines, self.iou_threshold)
            .into_iter()
            .map(CardContour::new)
            .collect();
        sort_top_to_bottom(&mut merged, |c| c.bounding_box());
        debug!(before, after = merged.len(), "merged overlapping contours");

        Ok(merged
            .into_iter()
            .map(|contour| PipelineData::from_contour(original.clone(), contour))
            .collect())
    }

    fn name(&self) -> &str {
        "Fragment Merge"
    }
}
