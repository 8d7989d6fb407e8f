mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from cardsort for tests
pub use cardsort::geometry::Rotation;
pub use cardsort::models::{CollectorNumberResult, ResolvedCard, VisualCandidate};
pub use cardsort::recognition::ocr::{Charset, OcrConfig, OcrWord, TextBox, TextRecognizer};
pub use cardsort::resolve::{CatalogHit, CatalogLookup};
