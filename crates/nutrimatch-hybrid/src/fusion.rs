//! Merging lexical and vector candidates.
//!
//! The default union keeps lexical hits in rank order, then appends the
//! vector-only hits in rank order. That order is deterministic but it is not a
//! relevance ranking across the two methods. Weighted fusion re-sorts the same
//! candidate set by a blend of normalized scores.

use std::collections::HashMap;

use nutrimatch_core::types::{FoodCatalog, LexicalHit, MatchSource, VectorHit};
use nutrimatch_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub position: usize,
    pub lexical_score: Option<f32>,
    pub distance: Option<f32>,
    pub matched_by: MatchSource,
}

pub fn union_candidates(catalog: &FoodCatalog, lexical: &[LexicalHit], vector: &[VectorHit]) -> Result<Vec<Candidate>> {
    let mut out: Vec<Candidate> = Vec::with_capacity(lexical.len() + vector.len());
    let mut seen: HashMap<usize, usize> = HashMap::with_capacity(out.capacity());

    for hit in lexical {
        if catalog.id_at(hit.position).is_none() {
            return Err(Error::IndexUnavailable(format!(
                "lexical hit at position {} is outside the {}-entry catalog",
                hit.position,
                catalog.len()
            )));
        }
        if seen.contains_key(&hit.position) {
            continue;
        }
        seen.insert(hit.position, out.len());
        out.push(Candidate {
            position: hit.position,
            lexical_score: Some(hit.score),
            distance: None,
            matched_by: MatchSource::Lexical,
        });
    }

    for hit in vector {
        let position = catalog.position_of(&hit.id).ok_or_else(|| {
            Error::IndexUnavailable(format!("vector hit '{}' is not in the catalog", hit.id))
        })?;
        match seen.get(&position) {
            Some(&i) => {
                let existing = &mut out[i];
                existing.matched_by = existing.matched_by.merge(MatchSource::Vector);
                existing.distance = Some(existing.distance.map_or(hit.distance, |d| d.min(hit.distance)));
            }
            None => {
                seen.insert(position, out.len());
                out.push(Candidate {
                    position,
                    lexical_score: None,
                    distance: Some(hit.distance),
                    matched_by: MatchSource::Vector,
                });
            }
        }
    }
    Ok(out)
}

/// `w * bm25 / max_bm25 + (1 - w) * (1 - distance)`, missing sides count as 0.
/// Stable: equal fused scores keep union order.
pub fn weighted_fusion(mut candidates: Vec<Candidate>, lexical_weight: f32) -> Vec<Candidate> {
    let max_lexical = candidates
        .iter()
        .filter_map(|c| c.lexical_score)
        .fold(0.0f32, f32::max);
    let fused = |c: &Candidate| {
        let lexical = match c.lexical_score {
            Some(s) if max_lexical > 0.0 => s / max_lexical,
            _ => 0.0,
        };
        let similarity = c.distance.map_or(0.0, |d| (1.0 - d).clamp(0.0, 1.0));
        lexical_weight * lexical + (1.0 - lexical_weight) * similarity
    };
    candidates.sort_by(|a, b| fused(b).total_cmp(&fused(a)));
    candidates
}
