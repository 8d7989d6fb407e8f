use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that abort a run before per-card work starts.
#[derive(Error, Debug)]
pub enum CardSortError {
    /// No `fronts`/`backs` scan with a supported extension was found
    #[error("Missing '{basename}' scan in {dir} (supported extensions: {extensions})")]
    MissingScan {
        basename: String,
        dir: PathBuf,
        extensions: String,
    },

    /// The scan exists but could not be decoded
    #[error("Failed to decode image {path}: {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Reference metadata exists but is not valid JSON of the expected shape
    #[error("Invalid reference metadata {path}: {source}")]
    ReferenceMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A contour that cannot be turned into a usable quadrilateral.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Contour approximates to {0} vertices, need at least 4")]
    TooFewVertices(usize),

    #[error("Corner points do not define a valid perspective transform")]
    DegenerateQuad,
}

/// A single recognition attempt failed. Never fatal: strategies treat it as "no reading".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("OCR models not found in {0}")]
    ModelsMissing(PathBuf),

    #[error("Failed to load OCR model: {0}")]
    ModelLoad(String),

    #[error("Failed to prepare OCR input: {0}")]
    Input(String),

    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("Text detector is not available")]
    DetectorUnavailable,

    #[error("Invalid image dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),
}
