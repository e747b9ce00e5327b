//! Construction and query configuration.
//!
//! Mirrors the shape of the teacher crate's `Builder`: a chained-setter
//! struct fixing the index's shape before any points exist, plus a
//! query-time configuration record. Cap resolution (spec §6: "a cap is
//! active if ... the effective cap is max(active forms)") lives here as a
//! pure function shared by the query engine and the hierarchy module.

#[cfg(feature = "progress")]
use indicatif::ProgressBar;

use crate::error::{DciError, Result};

/// Fixes an index's shape: ambient dimension, composite-index count, and
/// simple-indices-per-composite. Set once at `DciIndex::new` and unchanged
/// for the life of the index (a `reset()` re-samples directions but keeps
/// this shape).
#[derive(Clone, Copy, Debug)]
pub struct Builder {
    pub(crate) d: usize,
    pub(crate) l: usize,
    pub(crate) l_s: usize,
    pub(crate) seed: u64,
}

impl Builder {
    pub fn new(d: usize, l: usize, l_s: usize) -> Result<Self> {
        if d == 0 {
            return Err(DciError::ZeroDimension(d));
        }
        if l == 0 {
            return Err(DciError::ZeroCompositeCount(l));
        }
        if l_s == 0 {
            return Err(DciError::ZeroSimpleCount(l_s));
        }
        Ok(Self {
            d,
            l,
            l_s,
            seed: rand::random(),
        })
    }

    /// Set the seed for the projection-direction and hierarchy-sampling RNG.
    ///
    /// If left unset, a seed is drawn from entropy, matching the teacher's
    /// `Builder::seed` default.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn ambient_dim(&self) -> usize {
        self.d
    }

    pub fn composite_count(&self) -> usize {
        self.l
    }

    pub fn simple_count(&self) -> usize {
        self.l_s
    }

    /// Total number of projection directions a single level's bank holds.
    pub fn directions_per_level(&self) -> usize {
        self.l * self.l_s
    }
}

/// The construction-time record passed to `DciIndex::add` (spec §6).
#[derive(Clone, Debug)]
pub struct ConstructionConfig {
    /// Number of levels in the coarse-to-fine hierarchy. 1 means no
    /// layering: a single, flat composite-index set over all points.
    pub num_levels: usize,
    /// Target point count for the coarsest level.
    pub num_coarse_points: usize,
    /// Query configuration used while seeding the child-to-parent mapping
    /// (the per-parent contiguous ranges of §4.3).
    pub hierarchy_query: QueryConfig,
    /// Optional progress bar tracking per-level construction, matching the
    /// teacher's `Builder::progress`. Unset by default.
    #[cfg(feature = "progress")]
    pub progress: Option<ProgressBar>,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            num_levels: 1,
            num_coarse_points: 0,
            hierarchy_query: QueryConfig::default(),
            #[cfg(feature = "progress")]
            progress: None,
        }
    }
}

#[cfg(feature = "progress")]
impl ConstructionConfig {
    /// Attach a progress bar to be driven during `DciIndex::add`, one tick
    /// per level constructed, mirroring the teacher's `Builder::progress`.
    pub fn progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }
}

impl ConstructionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_levels == 0 {
            return Err(DciError::ZeroLevels(self.num_levels));
        }
        self.hierarchy_query.validate(self.num_levels)
    }
}

/// The authoritative query configuration record (spec §6).
#[derive(Clone, Copy, Debug)]
pub struct QueryConfig {
    /// If set, skip distance computation; return promotion-order candidates.
    pub blind: bool,
    /// Absolute visit cap; `None` defers to `prop_to_visit`.
    pub num_to_visit: Option<usize>,
    /// Absolute retrieve cap; `None` defers to `prop_to_retrieve`.
    pub num_to_retrieve: Option<usize>,
    /// Fractional visit cap in `[0, 1]`.
    pub prop_to_visit: f32,
    /// Fractional retrieve cap in `[0, 1]`.
    pub prop_to_retrieve: f32,
    /// Number of coarse-level candidates expanded per level. Ignored when
    /// only one level is present.
    pub field_of_view: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            blind: false,
            num_to_visit: None,
            num_to_retrieve: None,
            prop_to_visit: 1.0,
            prop_to_retrieve: 1.0,
            field_of_view: 1,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self, num_levels: usize) -> Result<()> {
        for prop in [self.prop_to_visit, self.prop_to_retrieve] {
            if !(0.0..=1.0).contains(&prop) {
                return Err(DciError::FractionOutOfRange(prop));
            }
        }
        if !cap_active(self.num_to_visit, self.prop_to_visit)
            && !cap_active(self.num_to_retrieve, self.prop_to_retrieve)
        {
            return Err(DciError::NoActiveCap);
        }
        if num_levels > 1 && self.field_of_view == 0 {
            return Err(DciError::ZeroFieldOfView(self.field_of_view));
        }
        Ok(())
    }

    /// Resolve both caps against a population size of `n` points, returning
    /// `(visit_cap, retrieve_cap)` in absolute point counts.
    pub fn resolve_caps(&self, n: usize) -> ResolvedCaps {
        ResolvedCaps {
            visit: resolve_cap(self.num_to_visit, self.prop_to_visit, n),
            retrieve: resolve_cap(self.num_to_retrieve, self.prop_to_retrieve, n),
        }
    }

    /// Scale this configuration's caps for an intermediate hierarchy level
    /// holding `eligible` points rather than the full `n` (spec §4.3: "caps
    /// at intermediate levels are scaled by the eligible point count at that
    /// level, not the total N").
    pub fn scaled_for_eligible(&self, eligible: usize, n: usize) -> QueryConfig {
        let mut scaled = *self;
        scaled.num_to_visit = self
            .num_to_visit
            .map(|v| scale_count(v, eligible, n));
        scaled.num_to_retrieve = self
            .num_to_retrieve
            .map(|v| scale_count(v, eligible, n));
        scaled
    }
}

fn scale_count(count: usize, eligible: usize, n: usize) -> usize {
    if n == 0 {
        return count.min(eligible);
    }
    ((count as f64) * (eligible as f64) / (n as f64)).round() as usize
}

fn cap_active(absolute: Option<usize>, fraction: f32) -> bool {
    absolute.is_some() || fraction > 0.0
}

fn resolve_cap(absolute: Option<usize>, fraction: f32, n: usize) -> usize {
    let from_absolute = absolute.unwrap_or(0);
    let from_fraction = (fraction as f64 * n as f64).ceil() as usize;
    from_absolute.max(from_fraction).min(n)
}

/// Visit and retrieve caps resolved to absolute point counts for a given `N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedCaps {
    pub visit: usize,
    pub retrieve: usize,
}
