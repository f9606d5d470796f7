//! File-overlap scoring for inferred dependency edges

use std::collections::BTreeSet;

/// Overlap between two issues' declared files
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictScore {
    /// Shared files over the union of both sets, in `[0, 1]`
    pub score: f64,
    pub shared_files: Vec<String>,
}

/// Score the overlap of two declared file sets.
///
/// Uses the Jaccard index: `|A ∩ B| / |A ∪ B|`. Two empty sets score 0.
pub fn conflict_score(a: &BTreeSet<String>, b: &BTreeSet<String>) -> ConflictScore {
    let shared_files: Vec<String> = a.intersection(b).cloned().collect();
    let union = a.len() + b.len() - shared_files.len();
    let score = if union == 0 {
        0.0
    } else {
        shared_files.len() as f64 / union as f64
    };
    ConflictScore {
        score,
        shared_files,
    }
}
