mod common;

use common::*;
use cardsort::error::OcrError;
use cardsort::models::NumberSource;
use cardsort::recognition::collector::{
    merge_text_boxes, CollectorRecognizer, CollectorStrategy, LegacyStrategy, COLLECTOR_REGIONS,
};
use cardsort::recognition::name::{recognize_name, UNKNOWN_NAME};
use cardsort::recognition::RecognizerSlot;
use image::{DynamicImage, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_name_found_upright() -> anyhow::Result<()> {
    let recognizer = InkRecognizer::default();
    let reading = recognize_name(Some(&recognizer), &titled_card());
    assert_eq!(reading.name, "Pikachu");
    assert_eq!(reading.rotation, Rotation::Deg0);
    assert_eq!(reading.image.dimensions(), (900, 1260));
    Ok(())
}

#[test]
fn test_name_found_upside_down() -> anyhow::Result<()> {
    let recognizer = InkRecognizer::default();
    let flipped = Rotation::Deg180.apply(&titled_card());
    let reading = recognize_name(Some(&recognizer), &flipped);
    assert_eq!(reading.name, "Pikachu");
    assert_eq!(reading.rotation, Rotation::Deg180);
    // the returned image is upright again
    assert_eq!(reading.image, titled_card());
    Ok(())
}

#[test]
fn test_name_unknown_without_text() -> anyhow::Result<()> {
    let blank = RgbImage::from_pixel(900, 1260, CARD_WHITE);
    let reading = recognize_name(Some(&InkRecognizer::default()), &blank);
    assert_eq!(reading.name, UNKNOWN_NAME);
    assert_eq!(reading.rotation, Rotation::Deg0);

    let reading = recognize_name(None, &titled_card());
    assert_eq!(reading.name, UNKNOWN_NAME);

    let reading = recognize_name(Some(&BrokenRecognizer), &titled_card());
    assert_eq!(reading.name, UNKNOWN_NAME);
    Ok(())
}

struct CountingStrategy {
    hits_on: Option<Rotation>,
    calls: Arc<AtomicUsize>,
}

impl CollectorStrategy for CountingStrategy {
    fn name(&self) -> &str {
        "counting"
    }

    fn attempt(
        &self,
        _recognizer: &dyn TextRecognizer,
        _image: &RgbImage,
        rotation: Rotation,
    ) -> Option<CollectorNumberResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.hits_on == Some(rotation)).then(|| {
            CollectorNumberResult::found("25/102".to_string(), NumberSource::OcrLine, "25/102".to_string(), rotation)
        })
    }
}

#[test]
fn test_collector_chain_short_circuits() -> anyhow::Result<()> {
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));
    let chain = CollectorRecognizer::with_strategies(vec![
        Box::new(CountingStrategy {
            hits_on: Some(Rotation::Deg0),
            calls: first_calls.clone(),
        }),
        Box::new(CountingStrategy {
            hits_on: Some(Rotation::Deg0),
            calls: second_calls.clone(),
        }),
    ]);

    let result = chain.recognize(Some(&ScriptedRecognizer::default()), &titled_card());
    assert_eq!(result.value.as_deref(), Some("25/102"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_collector_chain_tries_flipped_card() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = CollectorRecognizer::with_strategies(vec![Box::new(CountingStrategy {
        hits_on: Some(Rotation::Deg180),
        calls: calls.clone(),
    })]);

    let result = chain.recognize(Some(&ScriptedRecognizer::default()), &titled_card());
    assert_eq!(result.rotation, Some(Rotation::Deg180));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_collector_absent_without_recognizer() -> anyhow::Result<()> {
    let chain = CollectorRecognizer::new(false);
    let result = chain.recognize(None, &titled_card());
    assert!(!result.is_found());
    assert_eq!(result, CollectorNumberResult::absent());
    Ok(())
}

#[test]
fn test_legacy_strategy_reads_number() -> anyhow::Result<()> {
    let recognizer = ScriptedRecognizer::with_number("133/198");
    let card = RgbImage::from_pixel(900, 1260, CARD_WHITE);
    let result = LegacyStrategy::default()
        .attempt(&recognizer, &card, Rotation::Deg0)
        .ok_or_else(|| anyhow::anyhow!("no number"))?;

    assert_eq!(result.value.as_deref(), Some("133/198"));
    assert_eq!(result.source, Some(NumberSource::OcrLine));
    assert_eq!(result.config.as_deref(), Some("single_line/digits_slash"));
    // first region, first variant, first scale, first config
    assert_eq!(recognizer.call_count(), 1);
    Ok(())
}

#[test]
fn test_legacy_strategy_survives_engine_errors() -> anyhow::Result<()> {
    let card = RgbImage::from_pixel(300, 420, CARD_WHITE);
    let strategy = LegacyStrategy {
        scales: vec![2.0],
        ..LegacyStrategy::default()
    };
    assert!(strategy.attempt(&BrokenRecognizer, &card, Rotation::Deg0).is_none());
    Ok(())
}

#[test]
fn test_detector_strategies_skip_without_detector() -> anyhow::Result<()> {
    let recognizer = ScriptedRecognizer::with_number("133/198");
    let card = RgbImage::from_pixel(900, 1260, CARD_WHITE);
    let chain = CollectorRecognizer::new(true);
    assert_eq!(chain.strategies.len(), 3);

    // default detect_text is unavailable, so the legacy pass answers
    let result = chain.recognize(Some(&recognizer), &card);
    assert_eq!(result.source, Some(NumberSource::OcrLine));
    Ok(())
}

#[test]
fn test_merge_text_boxes() -> anyhow::Result<()> {
    let tb = |x0, y0, x1, y1| TextBox {
        x0,
        y0,
        x1,
        y1,
        confidence: Some(0.9),
    };
    let merged = merge_text_boxes(vec![tb(40, 10, 60, 30), tb(10, 10, 35, 30), tb(10, 100, 50, 120)]);
    assert_eq!(merged.len(), 2);
    assert_eq!((merged[0].x0, merged[0].x1), (10, 60));
    assert_eq!((merged[1].y0, merged[1].y1), (100, 120));

    // a wide horizontal gap starts a new line
    let apart = merge_text_boxes(vec![tb(0, 0, 20, 20), tb(200, 0, 220, 20)]);
    assert_eq!(apart.len(), 2);
    assert!(merge_text_boxes(Vec::new()).is_empty());
    Ok(())
}

/// Finds two boxes in any window; only a 20 px tall crop reads as a number
struct BoxDetector;

impl TextRecognizer for BoxDetector {
    fn read_text(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError> {
        Ok(match (image.height(), config.charset) {
            (8, _) => "99/99".to_string(),
            (20, Charset::DigitsSlash) => "45/102".to_string(),
            _ => String::new(),
        })
    }

    fn read_words(&self, _image: &DynamicImage, _config: &OcrConfig) -> Result<Vec<OcrWord>, OcrError> {
        Ok(Vec::new())
    }

    fn detect_text(&self, _image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        Ok(vec![
            TextBox { x0: 0, y0: 2, x1: 40, y1: 10, confidence: Some(0.9) },
            TextBox { x0: 5, y0: 10, x1: 60, y1: 30, confidence: Some(0.8) },
            TextBox { x0: 2, y0: 40, x1: 90, y1: 70, confidence: Some(0.3) },
        ])
    }
}

#[test]
fn test_legacy_region_detector_reads_boxes() -> anyhow::Result<()> {
    let card = RgbImage::from_pixel(900, 1260, CARD_WHITE);
    let strategy = LegacyStrategy {
        regions: vec![COLLECTOR_REGIONS[0]],
        scales: vec![2.0],
        region_detector: true,
        ..LegacyStrategy::default()
    };
    let result = strategy
        .attempt(&BoxDetector, &card, Rotation::Deg0)
        .ok_or_else(|| anyhow::anyhow!("no number"))?;

    // the 8 px box is skipped, the low-confidence box never considered
    assert_eq!(result.value.as_deref(), Some("45/102"));
    assert_eq!(result.source, Some(NumberSource::Detector));
    assert_eq!(result.confidence, Some(0.8));
    let bbox = result.bbox.ok_or_else(|| anyhow::anyhow!("no box"))?;
    assert_eq!((bbox.width, bbox.height), (55, 20));
    assert!(bbox.y >= 1058 && bbox.y <= 1070);

    let plain = LegacyStrategy {
        region_detector: false,
        ..strategy
    };
    assert!(plain.attempt(&BoxDetector, &card, Rotation::Deg0).is_none());
    Ok(())
}

#[test]
fn test_recognizer_slot_states() -> anyhow::Result<()> {
    let ready = RecognizerSlot::ready(Arc::new(ScriptedRecognizer::default()));
    assert!(ready.is_ready());
    assert!(ready.get().is_some());

    let disabled = RecognizerSlot::disabled();
    assert!(!disabled.is_ready());
    assert!(disabled.get().is_none());

    // missing model files: the failed load is remembered
    let empty = tempfile::TempDir::new()?;
    let slot = RecognizerSlot::new(Some(empty.path().to_path_buf()));
    assert!(!slot.is_ready());
    assert!(slot.get().is_none());
    assert!(!slot.is_ready());
    assert!(slot.get().is_none());
    Ok(())
}

#[test]
fn test_corrupt_models_fail_to_load() -> anyhow::Result<()> {
    use cardsort::recognition::ocr::{DETECTION_MODEL_FILE, RECOGNITION_MODEL_FILE};
    use cardsort::recognition::OcrsRecognizer;

    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join(DETECTION_MODEL_FILE), b"not a model")?;
    assert!(matches!(OcrsRecognizer::load(dir.path()), Err(OcrError::ModelsMissing(_))));

    std::fs::write(dir.path().join(RECOGNITION_MODEL_FILE), b"not a model either")?;
    assert!(matches!(OcrsRecognizer::load(dir.path()), Err(OcrError::ModelLoad(_))));

    let slot = RecognizerSlot::new(Some(dir.path().to_path_buf()));
    assert!(slot.get().is_none());
    assert!(!slot.is_ready());
    Ok(())
}
