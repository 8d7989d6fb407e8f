//! Visual similarity against a reference corpus.

pub mod embedding;
pub mod index;

use image::RgbImage;
use tracing::info;

use crate::models::VisualCandidate;
pub use embedding::embed;
pub use index::{ReferenceEntry, ReferenceIndex, ReferenceSlot};

/// Shortlist length
pub const TOP_K: usize = 5;
/// Similarity at or above which the top candidate counts as an identity hint
pub const VISUAL_ACCEPT_SCORE: f32 = 0.72;

/// Ranked shortlist for `card`; empty without an index or usable embedding
pub fn find_candidates(index: Option<&ReferenceIndex>, card: &RgbImage, k: usize) -> Vec<VisualCandidate> {
    let Some(index) = index.filter(|i| !i.is_empty()) else {
        return Vec::new();
    };
    let Some(query) = embed(card) else {
        return Vec::new();
    };
    let candidates = index.top_k(&query, k);
    if let Some(top) = candidates.first() {
        info!(
            name = top.name.as_deref().unwrap_or("?"),
            number = top.number.as_deref().unwrap_or("?"),
            set = top.set_id.as_deref().unwrap_or("?"),
            score = %format!("{:.3}", top.score),
            "visual shortlist"
        );
    }
    candidates
}

/// Top candidate when it clears [`VISUAL_ACCEPT_SCORE`]
pub fn accepted_hint(candidates: &[VisualCandidate]) -> Option<&VisualCandidate> {
    candidates.first().filter(|c| c.score >= VISUAL_ACCEPT_SCORE)
}
