//! HNSW graph over the rows of one collection.
//!
//! Built with `hnsw_rs` using the collection's own [`DistanceMetric`], so the
//! graph and the exact re-ranking agree on what "close" means. Row indices
//! double as HNSW data ids, which lets a parent filter be expressed as the
//! sorted row list of that parent.

use std::fmt;

use hnsw_rs::filter::FilterT;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::{Distance, Neighbour};

use super::DistanceMetric;

/// Max connections per node.
pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 100;
pub const DEFAULT_MAX_LAYER: usize = 16;

/// Initial capacity hint; the graph is rebuilt when a collection outgrows it.
const MIN_CAPACITY: usize = 1024;

/// [`DistanceMetric`] as an `hnsw_rs` distance. Clamped at zero because the
/// graph assumes non-negative distances.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricDistance(pub(crate) DistanceMetric);

impl Distance<f32> for MetricDistance {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        self.0.distance(va, vb).max(0.0)
    }
}

pub(crate) struct AnnGraph {
    hnsw: Hnsw<'static, f32, MetricDistance>,
    metric: DistanceMetric,
    len: usize,
    capacity: usize,
}

impl AnnGraph {
    pub(crate) fn new(metric: DistanceMetric, expected: usize) -> Self {
        let capacity = expected.next_power_of_two().max(MIN_CAPACITY);
        let hnsw = Hnsw::new(
            DEFAULT_M,
            capacity,
            DEFAULT_MAX_LAYER,
            DEFAULT_EF_CONSTRUCTION,
            MetricDistance(metric),
        );
        Self {
            hnsw,
            metric,
            len: 0,
            capacity,
        }
    }

    /// Build a graph holding `vectors`, row `i` under data id `i`.
    pub(crate) fn build<'a>(
        metric: DistanceMetric,
        vectors: impl ExactSizeIterator<Item = &'a Vec<f32>>,
    ) -> Self {
        let mut graph = Self::new(metric, vectors.len());
        graph.extend(vectors.enumerate());
        graph
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn has_room_for(&self, additional: usize) -> bool {
        self.len + additional <= self.capacity
    }

    /// Insert rows. Ids must continue the existing row numbering.
    pub(crate) fn extend<'a>(&mut self, rows: impl Iterator<Item = (usize, &'a Vec<f32>)>) {
        let batch: Vec<(&Vec<f32>, usize)> = rows.map(|(row, vector)| (vector, row)).collect();
        if batch.is_empty() {
            return;
        }
        self.hnsw.parallel_insert(&batch);
        self.len += batch.len();
    }

    /// Up to `k` candidate rows nearest to `query`, restricted to `rows` when
    /// given. `rows` must be sorted ascending.
    pub(crate) fn search(&self, query: &[f32], k: usize, rows: Option<&Vec<usize>>) -> Vec<usize> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }
        let ef = DEFAULT_EF_SEARCH.max(k);
        let neighbours: Vec<Neighbour> = match rows {
            Some(rows) => {
                let filter: &dyn FilterT = rows;
                self.hnsw.search_filter(query, k, ef, Some(filter))
            }
            None => self.hnsw.search(query, k, ef),
        };
        neighbours.into_iter().map(|n| n.d_id).collect()
    }
}

impl fmt::Debug for AnnGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnGraph")
            .field("metric", &self.metric)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
