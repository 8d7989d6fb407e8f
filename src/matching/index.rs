use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::CardSortError;
use crate::matching::embedding::{dot, embed};
use crate::models::VisualCandidate;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataFile {
    List(Vec<RawEntry>),
    Wrapped {
        #[serde(default)]
        cards: Vec<RawEntry>,
    },
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<Value>,
    name: Option<String>,
    number: Option<Value>,
    set: Option<Value>,
    set_id: Option<String>,
    set_name: Option<String>,
    image: Option<String>,
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RawEntry {
    /// `set` may be an `{id, name}` object; otherwise the flat fields apply
    fn set_fields(&self) -> (Option<String>, Option<String>) {
        match &self.set {
            Some(Value::Object(obj)) => (value_to_string(obj.get("id")), value_to_string(obj.get("name"))),
            _ => (self.set_id.clone(), self.set_name.clone()),
        }
    }
}

/// One catalog entry with its precomputed art embedding
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub set_id: Option<String>,
    pub set_name: Option<String>,
    /// Image path relative to the corpus root
    pub image: String,
    pub embedding: Vec<f32>,
}

/// Reference corpus embedded into unit vectors
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceIndex {
    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    /// Embed every readable image listed in `<dir>/metadata.json`.
    /// Entries with a missing or undecodable image are skipped.
    pub fn load(dir: &Path) -> Result<Self, CardSortError> {
        let meta_path = dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&meta_path)?;
        let metadata: MetadataFile =
            serde_json::from_str(&raw).map_err(|source| CardSortError::ReferenceMetadata {
                path: meta_path.clone(),
                source,
            })?;
        let raw_entries = match metadata {
            MetadataFile::List(entries) => entries,
            MetadataFile::Wrapped { cards } => cards,
        };

        let mut entries = Vec::new();
        for raw in raw_entries {
            let Some(rel) = raw.image.clone().filter(|s| !s.is_empty()) else {
                continue;
            };
            let path = dir.join(&rel);
            if !path.exists() {
                debug!(path = %path.display(), "reference image missing");
                continue;
            }
            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "reference image unreadable");
                    continue;
                }
            };
            let Some(embedding) = embed(&image) else {
                continue;
            };
            let (set_id, set_name) = raw.set_fields();
            entries.push(ReferenceEntry {
                id: value_to_string(raw.id.as_ref()),
                name: raw.name,
                number: value_to_string(raw.number.as_ref()),
                set_id,
                set_name,
                image: rel,
                embedding,
            });
        }

        info!(entries = entries.len(), dir = %dir.display(), "reference index built");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `k` entries by descending cosine similarity to `query`
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<VisualCandidate> {
        let mut scored: Vec<(f32, &ReferenceEntry)> =
            self.entries.iter().map(|e| (dot(&e.embedding, query), e)).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(score, e)| VisualCandidate {
                reference_id: e.id.clone(),
                name: e.name.clone(),
                number: e.number.clone(),
                set_id: e.set_id.clone(),
                set_name: e.set_name.clone(),
                image: e.image.clone(),
                score,
            })
            .collect()
    }
}

/// Lazily-built, process-wide reference index
pub struct ReferenceSlot {
    dir: Option<PathBuf>,
    index: Mutex<Option<Option<Arc<ReferenceIndex>>>>,
}

impl ReferenceSlot {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir: Some(dir),
            index: Mutex::new(None),
        }
    }

    pub fn ready(index: ReferenceIndex) -> Self {
        Self {
            dir: None,
            index: Mutex::new(Some(Some(Arc::new(index)))),
        }
    }

    pub fn disabled() -> Self {
        Self {
            dir: None,
            index: Mutex::new(Some(None)),
        }
    }

    /// The index, built on first use; `None` when the corpus is absent or invalid
    pub fn get(&self) -> Option<Arc<ReferenceIndex>> {
        let mut slot = self.index.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            let loaded = match &self.dir {
                Some(dir) if dir.join(METADATA_FILE).exists() => match ReferenceIndex::load(dir) {
                    Ok(index) => Some(Arc::new(index)),
                    Err(e) => {
                        warn!(error = %e, "could not load reference index");
                        None
                    }
                },
                Some(dir) => {
                    debug!(dir = %dir.display(), "no reference metadata");
                    None
                }
                None => None,
            };
            *slot = Some(loaded);
        }
        slot.as_ref().and_then(|index| index.clone())
    }
}
