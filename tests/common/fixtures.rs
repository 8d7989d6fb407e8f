use cardsort::error::OcrError;
use cardsort::models::VisualCandidate;
use cardsort::recognition::ocr::{Charset, OcrConfig, OcrWord, TextBox, TextRecognizer};
use cardsort::resolve::{CatalogHit, CatalogLookup};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
pub const CARD_WHITE: Rgb<u8> = Rgb([245, 245, 245]);

/// Card outline (x, y, width, height) placed on a photograph
pub type Placement = (u32, u32, u32, u32);

/// A dark `width`×`height` photograph with a white card at each placement
pub fn card_photo(width: u32, height: u32, cards: &[Placement]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside = cards
            .iter()
            .any(|&(cx, cy, cw, ch)| x >= cx && x < cx + cw && y >= cy && y < cy + ch);
        if inside { CARD_WHITE } else { BACKGROUND }
    })
}

/// 1400×1400 photograph holding one 700×980 card in the centre
pub fn single_card_photo() -> RgbImage {
    card_photo(1400, 1400, &[(350, 210, 700, 980)])
}

/// Upright 900×1260 card with a dark title band across the top window
pub fn titled_card() -> RgbImage {
    RgbImage::from_fn(900, 1260, |_, y| if (60..150).contains(&y) { Rgb([10, 10, 10]) } else { CARD_WHITE })
}

/// Card filled with a single colour, with a darker frame around the art box
pub fn colored_card(color: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(900, 1260, |x, y| {
        if (300..500).contains(&x) && (400..600).contains(&y) {
            Rgb([color[0] / 2, color[1] / 2, color[2] / 2])
        } else {
            color
        }
    })
}

pub fn save_png(image: &RgbImage, path: &Path) -> anyhow::Result<()> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

/// Recognizer that reads a fixed collector number through digit-only
/// configurations and nothing elsewhere
#[derive(Default)]
pub struct ScriptedRecognizer {
    pub number: &'static str,
    pub calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn with_number(number: &'static str) -> Self {
        Self {
            number,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn read_text(&self, _image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match config.charset {
            Charset::DigitsSlash => self.number.to_string(),
            _ => String::new(),
        })
    }

    fn read_words(&self, _image: &DynamicImage, _config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        Ok(Vec::new())
    }
}

/// Recognizer that only "sees" a title when enough of the window is ink
pub struct InkRecognizer {
    pub title: &'static str,
    pub min_ink: f32,
}

impl Default for InkRecognizer {
    fn default() -> Self {
        Self {
            title: "Pikachu",
            min_ink: 0.3,
        }
    }
}

pub fn ink_fraction(image: &DynamicImage) -> f32 {
    let gray = image.to_luma8();
    let total = (gray.width() * gray.height()).max(1) as f32;
    gray.pixels().filter(|p| p[0] < 128).count() as f32 / total
}

impl TextRecognizer for InkRecognizer {
    fn read_text(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError> {
        if config.charset != Charset::Any {
            return Ok(String::new());
        }
        Ok(if ink_fraction(image) > self.min_ink {
            self.title.to_string()
        } else {
            String::new()
        })
    }

    fn read_words(&self, _image: &DynamicImage, _config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        Ok(Vec::new())
    }
}

/// Recognizer whose every call fails
pub struct BrokenRecognizer;

impl TextRecognizer for BrokenRecognizer {
    fn read_text(&self, _image: &DynamicImage, _config: &OcrConfig) -> Result<String, OcrError> {
        Err(OcrError::Engine("scripted failure".to_string()))
    }

    fn read_words(&self, _image: &DynamicImage, _config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        Err(OcrError::Engine("scripted failure".to_string()))
    }

    fn detect_text(&self, _image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        Err(OcrError::DetectorUnavailable)
    }
}

/// Catalog answering fixed number and text queries
#[derive(Default)]
pub struct FakeCatalog {
    pub numbers: Vec<(&'static str, &'static str, Option<&'static str>)>,
    pub text_hit: Option<(&'static str, Option<&'static str>)>,
    pub number_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_number(number: &'static str, name: &'static str, set: Option<&'static str>) -> Self {
        Self {
            numbers: vec![(number, name, set)],
            ..Self::default()
        }
    }
}

impl CatalogLookup for FakeCatalog {
    fn by_number(&self, number: &str, _set_hint: Option<&str>) -> Option<CatalogHit> {
        self.number_calls.fetch_add(1, Ordering::SeqCst);
        self.numbers
            .iter()
            .find(|(n, _, _)| *n == number)
            .map(|(_, name, set)| CatalogHit {
                name: name.to_string(),
                set_id: set.map(str::to_string),
            })
    }

    fn by_text(&self, name: Option<&str>, ability: Option<&str>, _set_hint: Option<&str>) -> Option<CatalogHit> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if name.is_none() && ability.is_none() {
            return None;
        }
        self.text_hit.map(|(name, set)| CatalogHit {
            name: name.to_string(),
            set_id: set.map(str::to_string),
        })
    }
}

/// Visual shortlist entry with the given score
pub fn visual(name: &str, number: Option<&str>, set: Option<&str>, score: f32) -> VisualCandidate {
    VisualCandidate {
        reference_id: Some(format!("{name}-ref")),
        name: Some(name.to_string()),
        number: number.map(str::to_string),
        set_id: set.map(str::to_string),
        set_name: None,
        image: format!("{name}.png"),
        score,
    }
}
