//! Text recognition seam and its `ocrs` implementation.
//!
//! Recognizers take an image plus an [`OcrConfig`] (layout mode and character
//! allow-list) and return either whole text, positioned words, or detected
//! text boxes. Failures are [`OcrError`]s that callers downgrade to "no reading".

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, OcrInput, TextItem};
use rten::Model;
use rten_imageproc::BoundingRect;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::error::OcrError;

pub const DETECTION_MODEL_FILE: &str = "text-detection.rten";
pub const RECOGNITION_MODEL_FILE: &str = "text-recognition.rten";

/// Character allow-lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Any,
    DigitsSlash,
    Alnum,
    AlnumSlash,
}

impl Charset {
    pub const ALL: [Charset; 4] = [Charset::Any, Charset::DigitsSlash, Charset::Alnum, Charset::AlnumSlash];

    pub fn allowed_chars(self) -> Option<&'static str> {
        match self {
            Charset::Any => None,
            Charset::DigitsSlash => Some("0123456789/"),
            Charset::Alnum => Some("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            Charset::AlnumSlash => Some("0123456789/ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
        }
    }
}

/// How the image is segmented before recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageMode {
    /// Detect words and group them into lines
    Block,
    /// Treat every detected word as one line of text
    SingleLine,
    /// Recognize each detected word on its own
    SparseWords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcrConfig {
    pub mode: PageMode,
    pub charset: Charset,
}

impl OcrConfig {
    pub const fn new(mode: PageMode, charset: Charset) -> Self {
        Self { mode, charset }
    }

    /// Short label recorded in manifests, e.g. `single_line/digits_slash`
    pub fn label(&self) -> String {
        let mode = match self.mode {
            PageMode::Block => "block",
            PageMode::SingleLine => "single_line",
            PageMode::SparseWords => "sparse_words",
        };
        let charset = match self.charset {
            Charset::Any => "any",
            Charset::DigitsSlash => "digits_slash",
            Charset::Alnum => "alnum",
            Charset::AlnumSlash => "alnum_slash",
        };
        format!("{mode}/{charset}")
    }
}

/// Config for reading card titles
pub const NAME_CONFIG: OcrConfig = OcrConfig::new(PageMode::Block, Charset::Any);

/// Collector-number OCR configurations in priority order
pub const COLLECTOR_CONFIGS: [OcrConfig; 5] = [
    OcrConfig::new(PageMode::SingleLine, Charset::DigitsSlash),
    OcrConfig::new(PageMode::Block, Charset::DigitsSlash),
    OcrConfig::new(PageMode::SparseWords, Charset::DigitsSlash),
    OcrConfig::new(PageMode::SingleLine, Charset::AlnumSlash),
    OcrConfig::new(PageMode::Block, Charset::AlnumSlash),
];

/// Groups words that belong to the same printed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LineKey {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// One recognized word with its position in the input image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub height: u32,
    /// Engine confidence in 0..=100 when the engine reports one
    pub confidence: Option<f32>,
    pub line: LineKey,
}

/// A detected (not yet recognized) text region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub confidence: Option<f32>,
}

impl TextBox {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

pub trait TextRecognizer: Send + Sync {
    /// Whole text of the image, lines separated by newlines
    fn read_text(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError>;

    /// Positioned words with line grouping
    fn read_words(&self, image: &DynamicImage, config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError>;

    /// Text regions without recognition
    fn detect_text(&self, _image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        Err(OcrError::DetectorUnavailable)
    }
}

/// `ocrs` engines sharing one model pair, one engine per allow-list
pub struct OcrsRecognizer {
    engines: HashMap<Charset, OcrEngine>,
}

impl OcrsRecognizer {
    /// Load detection and recognition models from `model_dir`
    pub fn load(model_dir: &Path) -> Result<Self, OcrError> {
        let detection_path = model_dir.join(DETECTION_MODEL_FILE);
        let recognition_path = model_dir.join(RECOGNITION_MODEL_FILE);
        if !detection_path.exists() || !recognition_path.exists() {
            return Err(OcrError::ModelsMissing(model_dir.to_path_buf()));
        }

        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| OcrError::ModelLoad(format!("{}: {e}", path.display())))
        };
        let detection_bytes = read(&detection_path)?;
        let recognition_bytes = read(&recognition_path)?;

        let mut engines = HashMap::new();
        for charset in Charset::ALL {
            let detection_model =
                Model::load(detection_bytes.clone()).map_err(|e| OcrError::ModelLoad(e.to_string()))?;
            let recognition_model =
                Model::load(recognition_bytes.clone()).map_err(|e| OcrError::ModelLoad(e.to_string()))?;
            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                allowed_chars: charset.allowed_chars().map(str::to_string),
                ..Default::default()
            })
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?;
            engines.insert(charset, engine);
        }

        Ok(Self { engines })
    }

    fn engine(&self, charset: Charset) -> Result<&OcrEngine, OcrError> {
        self.engines
            .get(&charset)
            .ok_or_else(|| OcrError::Engine(format!("no engine for {charset:?}")))
    }

    fn prepare(engine: &OcrEngine, image: &DynamicImage) -> Result<OcrInput, OcrError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidDimensions(width, height));
        }
        let rgb = image.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions()).map_err(|e| OcrError::Input(e.to_string()))?;
        engine.prepare_input(source).map_err(|e| OcrError::Input(e.to_string()))
    }

    fn recognize(&self, image: &DynamicImage, config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        let engine = self.engine(config.charset)?;
        let input = Self::prepare(engine, image)?;
        let words = engine.detect_words(&input).map_err(|e| OcrError::Engine(e.to_string()))?;

        let lines = match config.mode {
            PageMode::Block => engine.find_text_lines(&input, &words),
            PageMode::SingleLine => {
                let mut line = words.clone();
                line.sort_by(|a, b| (a.bounding_rect().left() as f32).total_cmp(&(b.bounding_rect().left() as f32)));
                if line.is_empty() { Vec::new() } else { vec![line] }
            }
            PageMode::SparseWords => words.iter().map(|w| vec![w.clone()]).collect(),
        };

        let recognized = engine
            .recognize_text(&input, &lines)
            .map_err(|e| OcrError::Engine(e.to_string()))?;

        let mut out = Vec::new();
        for (line_idx, line) in recognized.iter().enumerate() {
            let Some(line) = line else { continue };
            for word in line.words() {
                let rect = word.bounding_rect();
                out.push(OcrWord {
                    text: word.to_string(),
                    left: (rect.left() as f32).max(0.0) as u32,
                    top: (rect.top() as f32).max(0.0) as u32,
                    height: (rect.height() as f32).max(0.0) as u32,
                    confidence: None,
                    line: LineKey {
                        block: 0,
                        paragraph: 0,
                        line: line_idx as u32,
                    },
                });
            }
        }
        Ok(out)
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn read_text(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError> {
        if config.mode == PageMode::Block {
            let engine = self.engine(config.charset)?;
            let input = Self::prepare(engine, image)?;
            return engine.get_text(&input).map_err(|e| OcrError::Engine(e.to_string()));
        }

        let words = self.recognize(image, config)?;
        let mut lines: Vec<Vec<&str>> = Vec::new();
        let mut current = None;
        for word in &words {
            if current != Some(word.line) {
                lines.push(Vec::new());
                current = Some(word.line);
            }
            if let Some(line) = lines.last_mut() {
                line.push(word.text.as_str());
            }
        }
        Ok(lines.iter().map(|l| l.join(" ")).collect::<Vec<_>>().join("\n"))
    }

    fn read_words(&self, image: &DynamicImage, config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        self.recognize(image, config)
    }

    fn detect_text(&self, image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        let engine = self.engine(Charset::Any)?;
        let input = Self::prepare(engine, image)?;
        let words = engine.detect_words(&input).map_err(|e| OcrError::Engine(e.to_string()))?;
        let (width, height) = (image.width(), image.height());

        Ok(words
            .iter()
            .filter_map(|w| {
                let r = w.bounding_rect();
                let clamp = |v: f32, max: u32| v.max(0.0).min(max.saturating_sub(1) as f32) as u32;
                let b = TextBox {
                    x0: clamp(r.left() as f32, width),
                    y0: clamp(r.top() as f32, height),
                    x1: clamp(r.right() as f32, width),
                    y1: clamp(r.bottom() as f32, height),
                    confidence: None,
                };
                (b.x1 > b.x0 && b.y1 > b.y0).then_some(b)
            })
            .collect())
    }
}

enum SlotState {
    Uninitialized,
    Ready(Arc<dyn TextRecognizer>),
    Unavailable,
}

/// Lazily-initialized, process-wide recognizer.
/// The first `get` loads the models; a failed load is remembered and not retried.
pub struct RecognizerSlot {
    model_dir: Option<PathBuf>,
    state: Mutex<SlotState>,
}

impl RecognizerSlot {
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        Self {
            model_dir,
            state: Mutex::new(SlotState::Uninitialized),
        }
    }

    /// Slot that already holds a recognizer
    pub fn ready(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            model_dir: None,
            state: Mutex::new(SlotState::Ready(recognizer)),
        }
    }

    /// Slot with no recognizer at all
    pub fn disabled() -> Self {
        Self {
            model_dir: None,
            state: Mutex::new(SlotState::Unavailable),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            SlotState::Ready(_)
        )
    }

    pub fn get(&self) -> Option<Arc<dyn TextRecognizer>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let SlotState::Uninitialized = *state {
            *state = match &self.model_dir {
                Some(dir) => match OcrsRecognizer::load(dir) {
                    Ok(recognizer) => {
                        info!(dir = %dir.display(), "OCR engine initialized");
                        SlotState::Ready(Arc::new(recognizer))
                    }
                    Err(e) => {
                        warn!(error = %e, "OCR unavailable; names and numbers will not be read");
                        SlotState::Unavailable
                    }
                },
                None => {
                    warn!("no OCR model directory configured");
                    SlotState::Unavailable
                }
            };
        }
        match &*state {
            SlotState::Ready(recognizer) => Some(recognizer.clone()),
            _ => None,
        }
    }
}
