//! Top-down constrained search across levels.
//!
//! Level 0 is searched unfiltered. Every deeper level is searched once per
//! surviving candidate with a `parent_id` filter, so only children of kept
//! candidates can survive. A candidate's score is the sum of
//! `similarity * weight` over every level on its path.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::levels::LevelCollections;
use crate::embedding::Embedder;
use crate::error::{HierarchyError, Result};
use crate::store::{EntryMetadata, QueryHit};

/// Map a store distance to a similarity in `(0, 1]` for non-negative
/// distances.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Parameters of one hierarchical search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// One query per level, shallowest first.
    pub queries: Vec<String>,
    pub top_k_per_level: Vec<usize>,
    pub weight_per_level: Vec<f32>,
    /// Number of levels to descend; `None` means every level.
    pub search_level: Option<usize>,
    pub final_count: usize,
}

impl SearchRequest {
    pub fn new<S: Into<String>>(
        queries: impl IntoIterator<Item = S>,
        top_k_per_level: Vec<usize>,
        weight_per_level: Vec<f32>,
    ) -> Self {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            top_k_per_level,
            weight_per_level,
            search_level: None,
            final_count: 1,
        }
    }

    pub fn with_search_level(mut self, search_level: usize) -> Self {
        self.search_level = Some(search_level);
        self
    }

    pub fn with_final_count(mut self, final_count: usize) -> Self {
        self.final_count = final_count;
        self
    }

    /// Check the request against `max_level` and return the number of
    /// levels to search. Nothing is touched when this fails.
    pub fn validate(&self, max_level: usize) -> Result<usize> {
        let n = self.queries.len();
        if self.top_k_per_level.len() != n || self.weight_per_level.len() != n {
            return Err(HierarchyError::config(format!(
                "queries, top_k_per_level and weight_per_level must have the same length \
                 (got {}, {}, {})",
                n,
                self.top_k_per_level.len(),
                self.weight_per_level.len()
            )));
        }

        let search_level = self.search_level.unwrap_or(max_level);
        if search_level > max_level {
            return Err(HierarchyError::Range {
                search_level,
                max_level,
            });
        }
        if n < search_level {
            return Err(HierarchyError::config(format!(
                "{search_level} levels requested but only {n} queries given"
            )));
        }
        if let Some((level, weight)) = self
            .weight_per_level
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(HierarchyError::config(format!(
                "weight for level {level} must be finite and non-negative, got {weight}"
            )));
        }
        Ok(search_level)
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub label: String,
    pub depth: usize,
    /// Weighted similarity accumulated along the path from level 0.
    pub similarity: f32,
    pub metadata: EntryMetadata,
}

impl SearchHit {
    fn from_query_hit(hit: QueryHit, depth: usize, weight: f32, parent_score: f32) -> Self {
        Self {
            similarity: distance_to_similarity(hit.distance) * weight + parent_score,
            id: hit.id,
            label: hit.label,
            depth,
            metadata: hit.metadata,
        }
    }

    /// Terminal payload, empty for internal entries.
    pub fn payload(&self) -> &str {
        &self.metadata.payload
    }
}

pub(crate) fn hierarchical_search(
    levels: &LevelCollections,
    embedder: &dyn Embedder,
    request: &SearchRequest,
) -> Result<Vec<SearchHit>> {
    let search_level = request.validate(levels.max_level())?;
    let mut candidates: Vec<SearchHit> = Vec::new();

    for level in 0..search_level {
        if level > 0 && candidates.is_empty() {
            debug!(level, "no candidates left, skipping deeper levels");
            return Ok(Vec::new());
        }

        let k = request.top_k_per_level[level];
        let weight = request.weight_per_level[level];
        let vector = embedder.embed_sync(&request.queries[level])?;
        let handle = levels.get(level)?;

        let per_parent: Vec<(f32, Vec<QueryHit>)> = if level == 0 {
            vec![(0.0, handle.query(&vector, k, None)?)]
        } else {
            candidates
                .par_iter()
                .map(|parent| {
                    handle
                        .query(&vector, k, Some(&parent.id))
                        .map(|hits| (parent.similarity, hits))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut seen = std::collections::HashSet::new();
        let mut next = Vec::new();
        for (parent_score, hits) in per_parent {
            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    next.push(SearchHit::from_query_hit(hit, level, weight, parent_score));
                }
            }
        }
        debug!(
            level,
            collection = handle.name(),
            parents = candidates.len(),
            candidates = next.len(),
            "searched level"
        );
        candidates = next;
    }

    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    candidates.truncate(request.final_count);
    Ok(candidates)
}
