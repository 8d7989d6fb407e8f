pub mod bundle;
pub mod config;
pub mod correspondence;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod recognition;
pub mod resolve;
pub mod sorter;

pub use config::Config;
pub use detection::CardSegmenter;
pub use error::{CardSortError, GeometryError, OcrError};
pub use models::{CardContour, CollectorNumberResult, NameReading, RectifiedCard, ResolvedCard, VisualCandidate};
pub use pipeline::{BoundingBox, DebugConfig, Pipeline, PipelineContext, PipelineData, PipelineStep};
pub use sorter::{CardSorter, RunSummary, Services};
