//! Top-level index type and its lifecycle (spec §3, §6).
//!
//! `{initialize -> populate -> query* -> clear -> free}`. `free` has no
//! explicit Rust counterpart: dropping a [`DciIndex`] releases everything it
//! owns, and the borrowed raw point array it never took ownership of in the
//! first place.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::config::{Builder, ConstructionConfig, QueryConfig};
use crate::error::{DciError, Result};
use crate::hierarchy::Hierarchy;
use crate::projection::ProjectionBank;
use crate::query::{PointData, ScratchPool};
use crate::rng::IndexRng;

/// The result of one query: up to `k` neighbours, nearest first, plus the
/// bookkeeping spec §7 requires for a caller to detect a capacity shortfall.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    /// Global point ids, nearest first (or promotion order, in blind mode).
    pub ids: Vec<u32>,
    /// Parallel to `ids`; empty in blind mode.
    pub distances: Vec<f32>,
    /// How many `k` were requested.
    pub requested: usize,
    /// Number of distinct points visited before termination.
    pub visited: usize,
    /// Number of distinct points promoted before termination.
    pub retrieved: usize,
}

impl QueryOutcome {
    /// `true` if fewer than `k` neighbours were found (spec §7: not an
    /// error, but worth a sharp name at the call site).
    pub fn is_shortfall(&self) -> bool {
        self.ids.len() < self.requested
    }
}

struct Populated<'data> {
    data: &'data [f32],
    n: usize,
    hierarchy: Hierarchy,
}

/// A Prioritized Dynamic Continuous Index over points borrowed from the
/// caller for the lifetime `'data`.
///
/// Single-writer: [`DciIndex::add`], [`DciIndex::reset`] and
/// [`DciIndex::clear`] must not run concurrently with queries or with each
/// other (spec §3). The type system does not enforce this on its own —
/// callers sharing an index across threads for population are expected to
/// synchronize externally, exactly as the teacher crate's own `Hnsw`
/// construction does internally via `parking_lot` rather than at the API
/// boundary.
pub struct DciIndex<'data> {
    shape: Builder,
    rng: IndexRng,
    /// The bank `init` generates eagerly, per spec §6. Superseded by the
    /// hierarchy's own independently-sampled per-level banks the moment
    /// `add` succeeds with more than one level; kept around (and re-sampled
    /// on `reset`) so a caller inspecting a freshly initialized, unpopulated
    /// index still sees a real projection bank rather than a placeholder.
    flat_bank: ProjectionBank,
    populated: Option<Populated<'data>>,
    /// Reusable per-query projection buffers, shared across a batch.
    scratch: ScratchPool,
}

impl<'data> DciIndex<'data> {
    /// `init(&idx, D, L, L_s)`: allocate an empty index and generate its
    /// projection bank. No points exist yet.
    #[instrument(skip_all, fields(d, l, l_s))]
    pub fn new(d: usize, l: usize, l_s: usize) -> Result<Self> {
        let shape = Builder::new(d, l, l_s)?;
        let mut rng = IndexRng::from_seed(shape.seed);
        let flat_bank = ProjectionBank::sample(d, shape.directions_per_level(), &mut rng);
        info!(seed = rng.seed(), "initialized index");
        Ok(Self {
            shape,
            rng,
            flat_bank,
            populated: None,
            scratch: ScratchPool::new(),
        })
    }

    /// Same as [`DciIndex::new`] but with an explicit seed, mirroring the
    /// teacher's `Builder::seed`.
    pub fn with_seed(d: usize, l: usize, l_s: usize, seed: u64) -> Result<Self> {
        let shape = Builder::new(d, l, l_s)?.seed(seed);
        let mut rng = IndexRng::from_seed(shape.seed);
        let flat_bank = ProjectionBank::sample(d, shape.directions_per_level(), &mut rng);
        Ok(Self {
            shape,
            rng,
            flat_bank,
            populated: None,
            scratch: ScratchPool::new(),
        })
    }

    pub fn ambient_dim(&self) -> usize {
        self.shape.ambient_dim()
    }

    pub fn len(&self) -> usize {
        self.populated.as_ref().map(|p| p.n).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The flat projection bank `init` generated. Once `add` has built a
    /// hierarchy of more than one level, this bank is no longer what queries
    /// use internally (each level samples its own), but it remains a valid,
    /// inspectable bank of the index's declared shape.
    pub fn projection_bank(&self) -> &ProjectionBank {
        &self.flat_bank
    }

    /// `add(&idx, D, N, data_ptr, num_levels, construction_cfg)`.
    ///
    /// `data` is borrowed, row-major `N x D` (point `i`'s coordinates occupy
    /// `data[i*D..(i+1)*D]`). Allocates all per-level position files,
    /// computes all projections, and builds the hierarchy.
    #[instrument(skip_all, fields(n, d = self.shape.ambient_dim()))]
    pub fn add(
        &mut self,
        data: &'data [f32],
        n: usize,
        cfg: ConstructionConfig,
    ) -> Result<()> {
        if self.populated.is_some() {
            return Err(DciError::AlreadyPopulated);
        }
        let d = self.shape.ambient_dim();
        if n > 0 && data.is_empty() {
            return Err(DciError::EmptyData(n));
        }
        if data.len() != n * d {
            return Err(DciError::DataLengthMismatch {
                data_len: data.len(),
                expected: n * d,
                n,
                d,
            });
        }
        cfg.validate()?;

        let points = row_major_to_matrix(data, n, d);
        let hierarchy = Hierarchy::build(&self.shape, &points, n, &cfg, &mut self.rng);
        debug!(levels = hierarchy.num_levels(), "hierarchy built");

        self.populated = Some(Populated {
            data,
            n,
            hierarchy,
        });
        Ok(())
    }

    /// `query(&idx, D, Q=1, query_ptr, k, query_cfg, ...)` for a single query.
    pub fn query(&self, query_point: &[f32], k: usize, cfg: &QueryConfig) -> Result<QueryOutcome> {
        self.validate_query(query_point, k, cfg)?;
        let populated = match &self.populated {
            Some(p) => p,
            None => {
                return Ok(QueryOutcome {
                    ids: Vec::new(),
                    distances: Vec::new(),
                    requested: k,
                    visited: 0,
                    retrieved: 0,
                })
            }
        };

        let points = PointData::new(populated.data, self.shape.ambient_dim());
        let outcome = populated
            .hierarchy
            .query(query_point, k, cfg, populated.n, &points, &self.scratch);
        Ok(QueryOutcome {
            ids: outcome.ids,
            distances: outcome.distances,
            requested: k,
            visited: outcome.visited,
            retrieved: outcome.retrieved,
        })
    }

    /// `query(&idx, D, Q, query_ptr, ...)` for a batch.
    ///
    /// Each query is fully independent (disjoint mutable traversal state,
    /// spec §5), so the batch runs in parallel via `rayon` with a
    /// single-threaded fallback that is bit-identical for a fixed seed.
    pub fn query_batch(
        &self,
        queries: &[f32],
        q: usize,
        k: usize,
        cfg: &QueryConfig,
    ) -> Result<Vec<QueryOutcome>> {
        let d = self.shape.ambient_dim();
        if queries.len() != q * d {
            return Err(DciError::DataLengthMismatch {
                data_len: queries.len(),
                expected: q * d,
                n: q,
                d,
            });
        }
        cfg.validate(self.populated.as_ref().map_or(1, |p| p.hierarchy.num_levels()))?;

        (0..q)
            .into_par_iter()
            .map(|i| self.query(&queries[i * d..(i + 1) * d], k, cfg))
            .collect()
    }

    fn validate_query(&self, query_point: &[f32], k: usize, cfg: &QueryConfig) -> Result<()> {
        let d = self.shape.ambient_dim();
        if query_point.len() != d {
            return Err(DciError::DimensionMismatch {
                expected: d,
                actual: query_point.len(),
            });
        }
        if k == 0 {
            return Err(DciError::ZeroK(k));
        }
        let num_levels = self.populated.as_ref().map_or(1, |p| p.hierarchy.num_levels());
        cfg.validate(num_levels)
    }

    /// `reset(&idx)`: drop per-level position files, keep the shape,
    /// re-sample projection directions.
    pub fn reset(&mut self) {
        self.populated = None;
        self.rng = IndexRng::from_seed(self.rng.seed().wrapping_add(1));
        self.flat_bank =
            ProjectionBank::sample(self.shape.ambient_dim(), self.shape.directions_per_level(), &mut self.rng);
    }

    /// `clear(&idx)`: as `reset`, but do not re-sample.
    pub fn clear(&mut self) {
        self.populated = None;
    }
}

fn row_major_to_matrix(data: &[f32], n: usize, d: usize) -> Array2<f32> {
    let mut points = Array2::<f32>::zeros((d, n));
    for i in 0..n {
        let row = &data[i * d..(i + 1) * d];
        for (j, &value) in row.iter().enumerate() {
            points[[j, i]] = value;
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_dims() {
        let mut idx = DciIndex::with_seed(2, 2, 2, 0).unwrap();
        let data = vec![0.0f32; 3 * 2];
        assert!(idx.add(&data, 3, ConstructionConfig::default()).is_ok());
        let bad_query = [0.0f32, 0.0, 0.0];
        let cfg = QueryConfig::default();
        assert!(matches!(
            idx.query(&bad_query, 1, &cfg),
            Err(DciError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_double_add() {
        let mut idx = DciIndex::with_seed(2, 1, 1, 0).unwrap();
        let data = vec![0.0f32; 4];
        idx.add(&data, 2, ConstructionConfig::default()).unwrap();
        let err = idx.add(&data, 2, ConstructionConfig::default());
        assert!(matches!(err, Err(DciError::AlreadyPopulated)));
    }

    #[test]
    fn clear_allows_repopulation() {
        let mut idx = DciIndex::with_seed(2, 1, 1, 0).unwrap();
        let data = vec![0.0f32; 4];
        idx.add(&data, 2, ConstructionConfig::default()).unwrap();
        idx.clear();
        assert!(idx.is_empty());
        idx.add(&data, 2, ConstructionConfig::default()).unwrap();
        assert_eq!(idx.len(), 2);
    }
}
