//! Assigns detected backs to already-resolved fronts by normalized centroid position.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::geometry::euclidean_distance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    InOrder,
    Reversed,
    NearestNeighbour,
}

/// `assignments[b]` is the front index for back `b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondence {
    pub assignments: Vec<usize>,
    pub strategy: MatchStrategy,
}

impl Correspondence {
    /// `(back index, front index)` pairs in back detection order
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.assignments.iter().copied().enumerate()
    }
}

fn closest<I: Iterator<Item = usize>>(candidates: I, fronts: &[(f64, f64)], back: (f64, f64)) -> Option<usize> {
    candidates.min_by(|&a, &b| {
        euclidean_distance(fronts[a], back).total_cmp(&euclidean_distance(fronts[b], back))
    })
}

/// Equal counts pick the cheaper of in-order and reversed; otherwise each
/// back greedily takes the nearest unused front, then the nearest front overall.
pub fn match_backs(fronts: &[(f64, f64)], backs: &[(f64, f64)]) -> Correspondence {
    if fronts.is_empty() {
        return Correspondence {
            assignments: Vec::new(),
            strategy: MatchStrategy::NearestNeighbour,
        };
    }

    let n = fronts.len();
    if n == backs.len() {
        let d_order: f64 = (0..n).map(|i| euclidean_distance(fronts[i], backs[i])).sum();
        let d_rev: f64 = (0..n).map(|i| euclidean_distance(fronts[i], backs[n - 1 - i])).sum();
        if d_order <= d_rev {
            return Correspondence {
                assignments: (0..n).collect(),
                strategy: MatchStrategy::InOrder,
            };
        }
        info!("reversed back order detected");
        // back n-1-i lands on front i
        return Correspondence {
            assignments: (0..n).rev().collect(),
            strategy: MatchStrategy::Reversed,
        };
    }

    warn!(fronts = n, backs = backs.len(), "mismatched counts, using nearest-neighbour matching");
    let mut unused: BTreeSet<usize> = (0..n).collect();
    let mut assignments = Vec::with_capacity(backs.len());
    for &back in backs {
        let best = match closest(unused.iter().copied(), fronts, back) {
            Some(idx) => {
                unused.remove(&idx);
                idx
            }
            None => closest(0..n, fronts, back).unwrap_or(0),
        };
        assignments.push(best);
    }
    Correspondence {
        assignments,
        strategy: MatchStrategy::NearestNeighbour,
    }
}
