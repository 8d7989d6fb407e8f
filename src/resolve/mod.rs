//! Evidence fusion: one identity, a confidence score and an accept/uncertain verdict per card.

pub mod lookup;

use tracing::{debug, info};

use crate::matching::accepted_hint;
use crate::models::{
    CollectorNumberResult, CollectorSource, NameSource, Provenance, ResolvedCard, SetSource, VisualCandidate,
};
use crate::recognition::name::UNKNOWN_NAME;
use crate::recognition::text::{ability_fragment, name_fragment};
pub use lookup::{CatalogHit, CatalogLookup, OfflineCatalog, TcgApiClient};

pub const VISUAL_WEIGHT: f32 = 0.5;
pub const NUMBER_WEIGHT: f32 = 0.3;
pub const API_WEIGHT: f32 = 0.2;
/// Minimum confidence for automatic acceptance
pub const ACCEPT_THRESHOLD: f32 = 0.75;

/// Weighted evidence sum clamped to [0, 1]
pub fn compute_confidence(visual_score: Option<f32>, has_number: bool, api_hit: bool) -> f32 {
    let mut score = 0.0;
    if let Some(v) = visual_score {
        score += v.clamp(0.0, 1.0) * VISUAL_WEIGHT;
    }
    if has_number {
        score += NUMBER_WEIGHT;
    }
    if api_hit {
        score += API_WEIGHT;
    }
    score.clamp(0.0, 1.0)
}

/// Everything the recognizers produced for one card
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    /// Title read by OCR; the `Unknown` sentinel counts as no reading
    pub ocr_name: Option<String>,
    /// Whole-text OCR of the title window, mined for search fragments
    pub ocr_text: String,
    pub collector: CollectorNumberResult,
    pub visual: Vec<VisualCandidate>,
}

impl Evidence {
    fn ocr_name(&self) -> Option<&str> {
        self.ocr_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != UNKNOWN_NAME)
    }
}

pub struct Resolver<'a> {
    catalog: &'a dyn CatalogLookup,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn CatalogLookup) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, evidence: &Evidence) -> ResolvedCard {
        let visual = accepted_hint(&evidence.visual);
        let visual_name = visual.and_then(|v| v.name.as_deref()).filter(|n| !n.is_empty());

        let mut set_hint = visual.and_then(|v| v.set_id.clone()).filter(|s| !s.is_empty());
        let mut set_source = set_hint.as_ref().map(|_| SetSource::Visual);

        let mut number_source = evidence.collector.value.as_ref().map(|_| CollectorSource::Ocr);
        let mut collector_number = evidence.collector.value.clone();
        if collector_number.is_none() {
            if let Some(number) = visual.and_then(|v| v.number.clone()).filter(|n| !n.is_empty()) {
                info!(number = %number, "using visual match number");
                collector_number = Some(number);
                number_source = Some(CollectorSource::Visual);
            }
        }

        let mut remote_name = None;
        let mut text_search = false;
        if let Some(number) = &collector_number {
            if let Some(hit) = self.catalog.by_number(number, set_hint.as_deref()) {
                info!(number = %number, name = %hit.name, "matched collector number");
                if let Some(set) = hit.set_id.filter(|s| !s.is_empty()) {
                    set_hint = Some(set);
                    set_source = Some(SetSource::Lookup);
                }
                remote_name = Some(hit.name);
            }
        }

        if remote_name.is_none() && visual_name.is_none() {
            let name_frag = evidence.ocr_name().and_then(name_fragment);
            let ability_frag = ability_fragment(&evidence.ocr_text);
            if name_frag.is_some() || ability_frag.is_some() {
                debug!(name = ?name_frag, ability = ?ability_frag, "catalog text search");
                if let Some(hit) = self
                    .catalog
                    .by_text(name_frag.as_deref(), ability_frag.as_deref(), set_hint.as_deref())
                {
                    info!(name = %hit.name, "resolved by text query");
                    if let Some(set) = hit.set_id.filter(|s| !s.is_empty()) {
                        set_hint = Some(set);
                        set_source = Some(SetSource::Lookup);
                    }
                    remote_name = Some(hit.name);
                    text_search = true;
                }
            }
        }

        let (name, name_source) = if let Some(name) = remote_name.as_deref().filter(|n| !n.is_empty()) {
            (name.to_string(), NameSource::Lookup)
        } else if let Some(name) = evidence.ocr_name() {
            (name.to_string(), NameSource::Ocr)
        } else if let Some(name) = visual_name {
            (name.to_string(), NameSource::Visual)
        } else {
            (UNKNOWN_NAME.to_string(), NameSource::Default)
        };

        let lookup_hit = remote_name.is_some();
        let confidence = compute_confidence(visual.map(|v| v.score), collector_number.is_some(), lookup_hit);
        let accepted = confidence >= ACCEPT_THRESHOLD;

        ResolvedCard {
            name,
            collector_number,
            set_hint,
            confidence,
            accepted,
            lookup_hit,
            provenance: Provenance {
                name: name_source,
                collector_number: number_source,
                set_hint: set_source,
                text_search,
            },
        }
    }
}
