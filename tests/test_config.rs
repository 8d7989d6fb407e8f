use cardsort::config::{parse_flag, Config, DEFAULT_API_URL};
use std::collections::HashMap;
use std::path::PathBuf;

fn config_from(pairs: &[(&str, &str)]) -> Config {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn test_defaults() -> anyhow::Result<()> {
    let config = config_from(&[]);
    assert_eq!(config.input_dir, PathBuf::from("."));
    assert_eq!(config.reference_dir, PathBuf::from("_Card_Reference"));
    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert!(!config.use_detector);
    assert!(!config.persist_warped());
    assert!(config.archive_scans);
    assert!(config.api_key.is_none());
    Ok(())
}

#[test]
fn test_environment_overrides() -> anyhow::Result<()> {
    let config = config_from(&[
        ("CARDSORT_INPUT_DIR", "/scans"),
        ("CARDSORT_OUTPUT_DIR", "/out"),
        ("CARDSORT_OCR_MODELS", "/models"),
        ("CARDSORT_USE_DETECTOR", "YES"),
        ("CARDSORT_SAVE_WARPED", "on"),
        ("CARDSORT_API_KEY", "  "),
        ("CARDSORT_API_URL", "http://localhost:8080/cards"),
    ]);
    assert_eq!(config.input_dir, PathBuf::from("/scans"));
    assert_eq!(config.output_dir, PathBuf::from("/out"));
    assert_eq!(config.resolved_model_dir(), Some(PathBuf::from("/models")));
    assert!(config.use_detector);
    assert!(config.persist_warped());
    assert!(config.api_key.is_none());
    assert_eq!(config.api_url, "http://localhost:8080/cards");
    Ok(())
}

#[test]
fn test_debug_implies_warped() -> anyhow::Result<()> {
    let config = config_from(&[("CARDSORT_DEBUG", "1")]);
    assert!(config.debug);
    assert!(!config.save_warped);
    assert!(config.persist_warped());
    Ok(())
}

#[test]
fn test_parse_flag() -> anyhow::Result<()> {
    for yes in ["1", "true", "TRUE", " yes ", "On"] {
        assert!(parse_flag(yes), "{yes}");
    }
    for no in ["", "0", "false", "off", "nope"] {
        assert!(!parse_flag(no), "{no}");
    }
    Ok(())
}
