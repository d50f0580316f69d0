use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::ann::AnnGraph;
use super::{DistanceMetric, MetadataFilter, QueryHit, Record, StoreError, StoreResult};

/// Candidate sets up to this size are scored exhaustively; larger ones go
/// through the HNSW graph and only its candidates are re-ranked.
pub(crate) const EXACT_SCAN_LIMIT: usize = 256;

/// Candidates pulled from the graph per requested hit before re-ranking.
const ANN_OVERSAMPLE: usize = 4;

/// One named collection shared by every store implementation.
///
/// Rows are kept in insertion order. Lookup tables are rebuilt after load:
/// id -> row, parent id -> rows (ascending) and the HNSW graph keyed by row.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Collection {
    name: String,
    metric: DistanceMetric,
    dimension: Option<usize>,
    records: Vec<Record>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
    #[serde(skip)]
    by_parent: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    graph: Option<AnnGraph>,
}

/// Serialized form of a collection plus a pending batch.
#[derive(Serialize)]
struct CollectionBody<'a> {
    name: &'a str,
    metric: DistanceMetric,
    dimension: Option<usize>,
    records: Vec<&'a Record>,
}

impl Collection {
    pub(crate) fn new(name: &str, metric: DistanceMetric) -> Self {
        Self {
            name: name.to_string(),
            metric,
            ..Self::default()
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn rebuild_indexes(&mut self) {
        self.by_id.clear();
        self.by_parent.clear();
        for (row, record) in self.records.iter().enumerate() {
            self.by_id.insert(record.id.clone(), row);
            self.by_parent
                .entry(record.metadata.parent_id.clone())
                .or_default()
                .push(row);
        }
        self.graph = if self.records.is_empty() {
            None
        } else {
            Some(AnnGraph::build(
                self.metric,
                self.records.iter().map(|r| &r.embedding),
            ))
        };
    }

    /// Validate a batch without applying it. Returns the collection
    /// dimension after the batch.
    pub(crate) fn check(&self, records: &[Record]) -> StoreResult<Option<usize>> {
        let mut dimension = self.dimension;
        let mut batch_ids = HashSet::with_capacity(records.len());
        for record in records {
            let expected = *dimension.get_or_insert(record.embedding.len());
            if record.embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    actual: record.embedding.len(),
                });
            }
            if self.by_id.contains_key(&record.id) || !batch_ids.insert(record.id.as_str()) {
                return Err(StoreError::DuplicateId {
                    collection: self.name.clone(),
                    id: record.id.clone(),
                });
            }
        }
        Ok(dimension)
    }

    /// MessagePack body of this collection with `pending` appended.
    pub(crate) fn encode_with(
        &self,
        dimension: Option<usize>,
        pending: &[Record],
    ) -> StoreResult<Vec<u8>> {
        let body = CollectionBody {
            name: &self.name,
            metric: self.metric,
            dimension,
            records: self.records.iter().chain(pending).collect(),
        };
        Ok(rmp_serde::to_vec_named(&body)?)
    }

    pub(crate) fn encode(&self) -> StoreResult<Vec<u8>> {
        self.encode_with(self.dimension, &[])
    }

    /// Apply a batch that already passed [`Collection::check`].
    pub(crate) fn commit(&mut self, records: Vec<Record>, dimension: Option<usize>) {
        self.dimension = dimension;
        let first_row = self.records.len();
        for record in records {
            let row = self.records.len();
            self.by_id.insert(record.id.clone(), row);
            self.by_parent
                .entry(record.metadata.parent_id.clone())
                .or_default()
                .push(row);
            self.records.push(record);
        }

        let added = self.records.len() - first_row;
        if added == 0 {
            return;
        }
        if !self.graph.as_ref().is_some_and(|g| g.has_room_for(added)) {
            self.graph = Some(AnnGraph::build(
                self.metric,
                self.records.iter().map(|r| &r.embedding),
            ));
        } else if let Some(graph) = &mut self.graph {
            graph.extend(
                self.records[first_row..]
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (first_row + i, &r.embedding)),
            );
        }
    }

    pub(crate) fn add(&mut self, records: Vec<Record>) -> StoreResult<()> {
        let dimension = self.check(&records)?;
        self.commit(records, dimension);
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id).map(|&row| &self.records[row])
    }

    pub(crate) fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<QueryHit>> {
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension
            && vector.len() != expected
        {
            return Err(StoreError::DimensionMismatch {
                collection: self.name.clone(),
                expected,
                actual: vector.len(),
            });
        }

        let parent_rows = match filter {
            Some(MetadataFilter::ParentId(parent)) => match self.by_parent.get(parent) {
                Some(rows) => Some(rows),
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        let candidates = parent_rows.map_or(self.records.len(), Vec::len);

        let rows: Vec<usize> = match &self.graph {
            Some(graph) if candidates > EXACT_SCAN_LIMIT && graph.len() == self.records.len() => {
                let wanted = k.saturating_mul(ANN_OVERSAMPLE).min(candidates);
                graph.search(vector, wanted, parent_rows)
            }
            _ => match parent_rows {
                Some(rows) => rows.clone(),
                None => (0..self.records.len()).collect(),
            },
        };

        let mut scored: Vec<(f32, usize)> = rows
            .into_iter()
            .map(|row| (self.metric.distance(vector, &self.records[row].embedding), row))
            .collect();

        // Ties keep insertion order.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, row)| {
                let record = &self.records[row];
                QueryHit {
                    id: record.id.clone(),
                    label: record.label.clone(),
                    distance,
                    metadata: record.metadata.clone(),
                }
            })
            .collect())
    }
}
