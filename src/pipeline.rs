use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::models::CardContour;

pub use crate::geometry::BoundingBox;

/// Data that flows through the segmentation pipeline.
/// Starts as the whole photograph; contour steps split it into one item per card candidate.
#[derive(Clone)]
pub struct PipelineData {
    /// Working image (grayscale, edge map, or a crop of the original)
    pub image: DynamicImage,

    /// The untouched photograph, shared across all items
    pub original: Arc<DynamicImage>,

    /// Card outline once a contour step has produced one
    pub contour: Option<CardContour>,
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self {
            image,
            original,
            contour: None,
        }
    }

    /// Create PipelineData for one detected card outline
    pub fn from_contour(original: Arc<DynamicImage>, contour: CardContour) -> Self {
        let bbox = contour.bounding_box();
        let image = original.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
        Self {
            image,
            original,
            contour: Some(contour),
        }
    }

    /// Replace the working image, keeping everything else
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            original: self.original.clone(),
            contour: self.contour.clone(),
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    pub enabled: bool,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    fn debug_dir(&self) -> Option<&Path> {
        self.debug
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.output_dir.as_path())
    }
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data.
    /// Steps can split data (1 → many), filter or merge (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order on the input image
    pub fn run(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        if let Some(dir) = self.context.debug_dir() {
            let input_dir = dir.join("00_input");
            std::fs::create_dir_all(&input_dir)?;
            input
                .save(input_dir.join("01.png"))
                .context("Failed to save debug input")?;
        }

        let mut data = vec![PipelineData::from_image(input)];

        for (step_idx, step) in self.steps.iter().enumerate() {
            let step_name = step.name();
            if self.context.verbose {
                debug!(step = step_name, items = data.len(), "running segmentation step");
            }

            data = step.process(data, &self.context)?;

            if let Some(dir) = self.context.debug_dir() {
                let step_dir_name = format!("{:02}_{}", step_idx + 1, step_name.to_lowercase().replace(' ', "_"));
                let step_dir = dir.join(&step_dir_name);
                std::fs::create_dir_all(&step_dir)?;

                for (idx, item) in data.iter().enumerate() {
                    let output_path = step_dir.join(format!("{:02}.png", idx + 1));
                    item.image
                        .save(&output_path)
                        .with_context(|| format!("Failed to save debug image {}", output_path.display()))?;
                }
                debug!(count = data.len(), dir = %step_dir_name, "saved debug images");
            }

            if self.context.verbose {
                debug!(step = step_name, items = data.len(), "step finished");
            }
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
