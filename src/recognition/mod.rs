pub mod collector;
pub mod name;
pub mod ocr;
pub mod text;

pub use collector::{CollectorRecognizer, CollectorStrategy};
pub use name::{recognize_name, UNKNOWN_NAME};
pub use ocr::{OcrConfig, OcrsRecognizer, RecognizerSlot, TextRecognizer};
