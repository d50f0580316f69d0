//! Tree ingestion.
//!
//! The tree is walked breadth-first with an explicit queue of
//! `(subtree, depth, parent_id)` items. Every entry gets a fresh UUID v4 and
//! lands in its depth's write batch; batches are embedded with one call per
//! level and written top-down, so a failure part-way leaves every written
//! level complete and deeper levels untouched.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::levels::LevelCollections;
use super::tree::{Tree, TreeValue};
use crate::embedding::{Embedder, embedding_failed};
use crate::error::Result;
use crate::store::{EntryMetadata, Record};

/// Summary of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Entries written per depth, index = depth.
    pub entries_per_level: Vec<usize>,
    /// `max_level` after ingestion.
    pub max_level: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.entries_per_level.iter().sum()
    }
}

struct PendingEntry {
    id: String,
    label: String,
    metadata: EntryMetadata,
}

/// Flatten `tree` into one batch per depth, parents before children.
fn plan_batches(tree: &Tree, depth: usize) -> Vec<Vec<PendingEntry>> {
    let mut batches: Vec<Vec<PendingEntry>> = (0..depth).map(|_| Vec::new()).collect();
    let mut queue: VecDeque<(&Tree, usize, String)> = VecDeque::new();
    queue.push_back((tree, 0, String::new()));

    while let Some((subtree, level, parent_id)) = queue.pop_front() {
        for (key, value) in subtree.entries() {
            let id = Uuid::new_v4().to_string();
            let (payload, leaf) = match value {
                TreeValue::Branch(child) => {
                    queue.push_back((child, level + 1, id.clone()));
                    (String::new(), false)
                }
                TreeValue::Leaf(text) => (text.clone(), true),
            };
            batches[level].push(PendingEntry {
                id,
                label: key.clone(),
                metadata: EntryMetadata {
                    parent_id: parent_id.clone(),
                    depth: level,
                    payload,
                    leaf,
                },
            });
        }
    }
    batches
}

pub(crate) fn ingest(
    levels: &mut LevelCollections,
    embedder: &dyn Embedder,
    tree: &Tree,
) -> Result<IngestReport> {
    let depth = tree.depth();
    let mut entries_per_level = vec![0; depth];
    if depth == 0 {
        debug!("empty tree, nothing to ingest");
        return Ok(IngestReport {
            entries_per_level,
            max_level: levels.max_level(),
        });
    }

    for d in 0..depth {
        levels.ensure(d)?;
    }

    let batches = plan_batches(tree, depth);
    for (level, batch) in batches.into_iter().enumerate() {
        if batch.is_empty() {
            continue;
        }
        let labels: Vec<&str> = batch.iter().map(|e| e.label.as_str()).collect();
        let vectors = embedder.embed_batch_sync(&labels)?;
        if vectors.len() != batch.len() {
            return Err(embedding_failed(
                embedder.id(),
                format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
            )
            .into());
        }

        let records: Vec<Record> = batch
            .into_iter()
            .zip(vectors)
            .map(|(entry, embedding)| Record {
                id: entry.id,
                label: entry.label,
                embedding,
                metadata: entry.metadata,
            })
            .collect();
        let count = records.len();
        let handle = levels.get(level)?;
        handle.add(records)?;
        entries_per_level[level] = count;
        debug!(level, collection = handle.name(), entries = count, "wrote level batch");
    }

    let report = IngestReport {
        entries_per_level,
        max_level: levels.max_level(),
    };
    info!(
        entries = report.total(),
        depth,
        max_level = report.max_level,
        "ingested tree"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Tree {
        Tree::from_json_value(&json!({
            "Algebra": {"Linear": "Ax=b", "Abstract": {"Groups": "closure"}},
            "Geometry": "points"
        }))
        .unwrap()
    }

    #[test]
    fn batches_are_grouped_by_depth() {
        let tree = sample();
        let batches = plan_batches(&tree, tree.depth());
        let labels: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.iter().map(|e| e.label.as_str()).collect())
            .collect();
        assert_eq!(
            labels,
            vec![
                vec!["Algebra", "Geometry"],
                vec!["Linear", "Abstract"],
                vec!["Groups"]
            ]
        );
    }

    #[test]
    fn parent_links_and_payloads() {
        let tree = sample();
        let batches = plan_batches(&tree, tree.depth());
        let algebra = &batches[0][0];
        assert!(algebra.metadata.is_root());
        assert!(!algebra.metadata.is_leaf());
        assert_eq!(batches[0][1].metadata.payload, "points");

        for child in &batches[1] {
            assert_eq!(child.metadata.parent_id, algebra.id);
            assert_eq!(child.metadata.depth, 1);
        }
        assert_eq!(batches[2][0].metadata.parent_id, batches[1][1].id);
        assert_eq!(batches[2][0].metadata.payload, "closure");
        assert!(batches[2][0].metadata.is_leaf());
    }

    #[test]
    fn empty_string_value_is_still_a_leaf() {
        let tree = Tree::from_json_value(&json!({"A": "", "B": {"C": ""}})).unwrap();
        let batches = plan_batches(&tree, tree.depth());
        let a = &batches[0][0];
        assert_eq!(a.label, "A");
        assert!(a.metadata.payload.is_empty());
        assert!(a.metadata.is_leaf());
        assert!(!batches[0][1].metadata.is_leaf());
        assert!(batches[1][0].metadata.is_leaf());
    }

    #[test]
    fn ids_are_unique_uuids() {
        let tree = sample();
        let batches = plan_batches(&tree, tree.depth());
        let mut ids: Vec<&str> = batches.iter().flatten().map(|e| e.id.as_str()).collect();
        for id in &ids {
            assert!(Uuid::parse_str(id).is_ok());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn report_total() {
        let report = IngestReport {
            entries_per_level: vec![2, 3, 1],
            max_level: 3,
        };
        assert_eq!(report.total(), 6);
    }
}
