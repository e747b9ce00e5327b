//! Coarse-to-fine hierarchical layering (spec §4.3).
//!
//! Builds a chain of levels, coarsest (index 0) to finest (index `H-1`,
//! holding the full point set), each with its own projection bank and
//! position files. Queries start unrestricted at the coarsest level and
//! narrow the eligible point set level by level using the parent→child
//! range mapping built at construction time.

use std::collections::HashMap;

use ndarray::Array2;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::config::{Builder as ShapeConfig, ConstructionConfig, QueryConfig};
use crate::position::{PositionEntry, PositionFile, RangeSet};
use crate::projection::ProjectionBank;
use crate::query::{PointData, QueryEngine, ScratchPool};
use crate::rng::IndexRng;

/// One level of the hierarchy.
pub(crate) struct Level {
    bank: ProjectionBank,
    /// `composites[c][s]` is simple index `s` of composite `c`.
    composites: Vec<Vec<PositionFile>>,
    /// This level's local id -> global id (finest level is the identity).
    global_ids: Vec<u32>,
    /// Inverse of `global_ids`, for resolving a query outcome's global ids
    /// back to this level's local id space.
    global_to_local: HashMap<u32, u32>,
    /// For each of this level's local ids (as a parent), the contiguous
    /// `(start, count)` range of the *next finer* level's local ids that
    /// descend from it. `None` at the finest level.
    child_ranges: Option<Vec<(u32, u32)>>,
}

impl Level {
    pub(crate) fn num_points(&self) -> usize {
        self.global_ids.len()
    }
}

/// The full coarse-to-fine chain for one index.
pub(crate) struct Hierarchy {
    levels: Vec<Level>,
    l_s: usize,
}

impl Hierarchy {
    /// Build every level from scratch over the full point set.
    ///
    /// `points` is the full `D x N` ambient point matrix (column-major,
    /// column `i` is point `i`'s coordinates).
    pub(crate) fn build(
        shape: &ShapeConfig,
        points: &Array2<f32>,
        n: usize,
        cfg: &ConstructionConfig,
        rng: &mut IndexRng,
    ) -> Self {
        let h = cfg.num_levels;
        let sizes = level_sizes(n, h, cfg.num_coarse_points);
        debug!(?sizes, "hierarchy level sizes (coarsest to finest)");

        // Nested point-id sets: sample each coarser level from the one
        // immediately finer, so level l's points are always a subset of
        // level l+1's (spec §3: "point set at level l is a uniform random
        // subset of the point set at level l-1" — l-1 here meaning the
        // adjacent finer level under this module's coarsest-first indexing).
        let mut global_ids: Vec<Vec<u32>> = vec![Vec::new(); h];
        global_ids[h - 1] = (0..n as u32).collect();
        for l in (0..h.saturating_sub(1)).rev() {
            let mut level_rng = rng.fork_for_level(l);
            let mut pool = global_ids[l + 1].clone();
            pool.shuffle(level_rng.inner_mut());
            pool.truncate(sizes[l]);
            global_ids[l] = pool;
        }

        // Assign parents and reorder coarsest-to-finest so each level's
        // array is finalized before it's used as a parent key by the next
        // (finer) pairing.
        let mut child_ranges: Vec<Option<Vec<(u32, u32)>>> = vec![None; h];
        for l in 0..h.saturating_sub(1) {
            let parent_count = global_ids[l].len();
            let finer_len = global_ids[l + 1].len();
            let mut level_rng = rng.fork_for_level(h + l);
            let parent_of: Vec<u32> = (0..finer_len)
                .map(|_| level_rng.gen_range_u32(parent_count.max(1) as u32))
                .collect();

            let mut order: Vec<usize> = (0..finer_len).collect();
            order.sort_by_key(|&i| parent_of[i]);

            let mut ranges = vec![(0u32, 0u32); parent_count];
            let mut idx = 0;
            while idx < finer_len {
                let parent = parent_of[order[idx]] as usize;
                let start = idx;
                while idx < finer_len && parent_of[order[idx]] as usize == parent {
                    idx += 1;
                }
                ranges[parent] = (start as u32, (idx - start) as u32);
            }

            global_ids[l + 1] = order.iter().map(|&i| global_ids[l + 1][i]).collect();
            child_ranges[l] = Some(ranges);
        }

        #[cfg(feature = "progress")]
        if let Some(bar) = &cfg.progress {
            bar.set_length(h as u64);
            bar.set_message("building hierarchy levels (coarsest to finest)");
        }

        let num_directions = shape.directions_per_level();
        let levels = (0..h)
            .map(|l| {
                let level_points = gather_columns(points, &global_ids[l]);
                let mut level_rng = rng.fork_for_level(2 * h + l);
                let bank = ProjectionBank::sample(shape.ambient_dim(), num_directions, &mut level_rng);
                let projected = bank.project(&level_points);
                let composites = build_composites(&projected, &global_ids[l], shape);
                let global_to_local = global_ids[l]
                    .iter()
                    .enumerate()
                    .map(|(local, &global)| (global, local as u32))
                    .collect();

                #[cfg(feature = "progress")]
                if let Some(bar) = &cfg.progress {
                    bar.set_position(l as u64 + 1);
                }

                Level {
                    bank,
                    composites,
                    global_ids: global_ids[l].clone(),
                    global_to_local,
                    child_ranges: child_ranges[l].take(),
                }
            })
            .collect();

        #[cfg(feature = "progress")]
        if let Some(bar) = &cfg.progress {
            bar.finish();
        }

        Self {
            levels,
            l_s: shape.simple_count(),
        }
    }

    pub(crate) fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Run the full coarse-to-fine narrowing query (spec §4.3) and return
    /// the finest level's outcome.
    pub(crate) fn query(
        &self,
        query_point: &[f32],
        k: usize,
        cfg: &QueryConfig,
        n: usize,
        points: &PointData<'_>,
        scratch: &ScratchPool,
    ) -> crate::query::LevelQueryOutcome {
        let finest = self.levels.len() - 1;
        if finest == 0 {
            let level = &self.levels[0];
            let mut projection = scratch.acquire();
            level.bank.project_one_into(query_point, &mut projection);
            let caps = cfg.resolve_caps(level.num_points());
            let level_k = k;
            let result = QueryEngine::run(
                &level.composites,
                &projection,
                self.l_s,
                points,
                query_point,
                level_k,
                caps,
                cfg.blind,
            );
            scratch.release(projection);
            return result;
        }

        // Coarsest level: unrestricted.
        let mut eligible: Option<RangeSet> = None;
        let mut outcome = None;
        let mut projection = scratch.acquire();
        for (level_idx, level) in self.levels.iter().enumerate() {
            let is_finest = level_idx == finest;
            level.bank.project_one_into(query_point, &mut projection);

            let composites = match &eligible {
                None => level.composites.clone(),
                Some(ranges) => restrict_composites(&level.composites, ranges),
            };

            let eligible_count = match &eligible {
                None => level.num_points(),
                Some(ranges) => ranges.total_len().min(level.num_points()),
            };

            // Spec §4.3: intermediate caps scale with the eligible count at
            // that level so those queries stay cheap; the caller's cap
            // configuration applies verbatim (against the full N) at the
            // finest level.
            let caps = if is_finest {
                cfg.resolve_caps(n)
            } else {
                cfg.scaled_for_eligible(eligible_count, n)
                    .resolve_caps(eligible_count.max(1))
            };
            let level_k = if is_finest {
                k
            } else {
                k.max(cfg.field_of_view)
            };

            let result = QueryEngine::run(
                &composites,
                &projection,
                self.l_s,
                points,
                query_point,
                level_k,
                caps,
                cfg.blind && is_finest,
            );

            debug!(
                level = level_idx,
                visited = result.visited,
                retrieved = result.retrieved,
                "hierarchical level query complete"
            );

            if !is_finest {
                // Resolved by this implementation (spec §9 open question):
                // expand by retrieved/distance order, not promotion order.
                let take = cfg.field_of_view.min(result.ids.len());
                let child_ranges = level
                    .child_ranges
                    .as_ref()
                    .expect("non-finest level always has child ranges");
                let ranges = result.ids[..take]
                    .iter()
                    .filter_map(|global_id| level.global_to_local.get(global_id))
                    .map(|&local_id| child_ranges[local_id as usize])
                    .collect();
                eligible = Some(RangeSet::from_ranges(ranges));
            } else {
                outcome = Some(result);
            }
        }

        scratch.release(projection);
        outcome.expect("finest level always runs")
    }
}

fn level_sizes(n: usize, h: usize, num_coarse_points: usize) -> Vec<usize> {
    if h <= 1 {
        return vec![n];
    }
    let coarse_target = num_coarse_points.clamp(1, n.max(1));
    let ratio = (coarse_target as f64 / n.max(1) as f64).powf(1.0 / (h - 1) as f64);
    let mut sizes: Vec<usize> = (0..h)
        .map(|l| {
            let exponent = (h - 1 - l) as f64;
            ((n as f64) * ratio.powf(exponent)).round() as usize
        })
        .collect();
    sizes[h - 1] = n;
    sizes[0] = coarse_target;
    // Enforce monotone non-decreasing sizes as we move toward the finest
    // level; rounding can otherwise produce tiny inversions.
    for l in 1..h {
        if sizes[l] < sizes[l - 1] {
            sizes[l] = sizes[l - 1];
        }
        sizes[l] = sizes[l].max(1).min(n);
    }
    sizes
}

fn gather_columns(points: &Array2<f32>, global_ids: &[u32]) -> Array2<f32> {
    let d = points.nrows();
    let mut out = Array2::<f32>::zeros((d, global_ids.len()));
    for (col, &global_id) in global_ids.iter().enumerate() {
        out.column_mut(col)
            .assign(&points.column(global_id as usize));
    }
    out
}

fn build_composites(
    projected: &Array2<f32>,
    global_ids: &[u32],
    shape: &ShapeConfig,
) -> Vec<Vec<PositionFile>> {
    let l = shape.composite_count();
    let l_s = shape.simple_count();
    (0..l)
        .map(|c| {
            (0..l_s)
                .map(|s| {
                    let direction = c * l_s + s;
                    let row = projected.row(direction);
                    let entries: Vec<PositionEntry> = row
                        .iter()
                        .enumerate()
                        .map(|(local_id, &key)| PositionEntry {
                            key,
                            local_id: local_id as u32,
                            global_id: global_ids[local_id],
                        })
                        .collect();
                    PositionFile::build(entries)
                })
                .collect()
        })
        .collect()
}

fn restrict_composites(
    composites: &[Vec<PositionFile>],
    ranges: &RangeSet,
) -> Vec<Vec<PositionFile>> {
    composites
        .iter()
        .map(|simple_indices| {
            simple_indices
                .iter()
                .map(|file| file.restrict(ranges))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sizes_are_monotone_and_bound_the_finest() {
        let sizes = level_sizes(10_000, 3, 500);
        assert_eq!(sizes.last().copied(), Some(10_000));
        assert_eq!(sizes[0], 500);
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn single_level_is_just_n() {
        assert_eq!(level_sizes(123, 1, 10), vec![123]);
    }
}
