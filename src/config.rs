use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.pokemontcg.io/v2/cards";
pub const DEFAULT_REFERENCE_DIR: &str = "_Card_Reference";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime configuration for a sorting run.
///
/// Built from `CARDSORT_*` environment variables; the binary then applies
/// command-line overrides on top.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the `fronts.*` and `backs.*` scans
    pub input_dir: PathBuf,
    /// Directory receiving one folder per card
    pub output_dir: PathBuf,
    /// Reference corpus root (contains `metadata.json`)
    pub reference_dir: PathBuf,
    /// Directory with `text-detection.rten` and `text-recognition.rten`
    pub ocr_model_dir: Option<PathBuf>,
    /// Enable the detector-based collector-number strategies
    pub use_detector: bool,
    /// Debug logging, also persists warped crops
    pub debug: bool,
    /// Persist the perspective-corrected crop in each bundle
    pub save_warped: bool,
    /// Remote catalog endpoint
    pub api_url: String,
    pub api_key: Option<String>,
    pub api_timeout: Duration,
    /// Skip remote lookups entirely
    pub offline: bool,
    /// Move source scans into a dated archive folder after the run
    pub archive_scans: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            reference_dir: PathBuf::from(DEFAULT_REFERENCE_DIR),
            ocr_model_dir: None,
            use_detector: false,
            debug: false,
            save_warped: false,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            api_timeout: DEFAULT_API_TIMEOUT,
            offline: false,
            archive_scans: true,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let flag = |key: &str| lookup(key).map(|v| parse_flag(&v)).unwrap_or(false);
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = non_empty("CARDSORT_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("CARDSORT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("CARDSORT_REFERENCE_DIR") {
            config.reference_dir = PathBuf::from(dir);
        }
        config.ocr_model_dir = non_empty("CARDSORT_OCR_MODELS").map(PathBuf::from);
        config.use_detector = flag("CARDSORT_USE_DETECTOR");
        config.debug = flag("CARDSORT_DEBUG");
        config.save_warped = flag("CARDSORT_SAVE_WARPED");
        if let Some(url) = non_empty("CARDSORT_API_URL") {
            config.api_url = url;
        }
        config.api_key = non_empty("CARDSORT_API_KEY");
        config
    }

    /// Whether the warped crop goes into the bundle
    pub fn persist_warped(&self) -> bool {
        self.debug || self.save_warped
    }

    /// Model directory, falling back to the ocrs cache location under `$HOME`
    pub fn resolved_model_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.ocr_model_dir {
            return Some(dir.clone());
        }
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()?;
        Some(PathBuf::from(home).join(".cache/ocrs"))
    }
}

/// Accepts `1`, `true`, `yes`, `on` in any case
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
