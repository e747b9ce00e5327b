//! The prioritized, round-robin, multi-probe query engine (spec §4.2).
//!
//! This is the algorithmic core of the index: per composite index, a
//! priority queue of candidate iterator-steps ordered by gap to the query's
//! own projected coordinate; points are *promoted* once every simple index
//! in a composite has witnessed them, and promotions across composites are
//! interleaved round-robin so no composite is allowed to race ahead of the
//! others.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;
use parking_lot::Mutex;

use crate::config::ResolvedCaps;
use crate::position::PositionFile;

/// Which way an iterator into a position file is advancing.
///
/// Declaration order fixes the tie-break rule from spec §4.2: "toward
/// larger keys first".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Direction {
    Larger,
    Smaller,
}

/// One pending step in a composite's priority queue: "advance iterator `j`
/// one more position in direction `d`, landing on this point at this gap".
#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    gap: OrderedFloat<f32>,
    simple_index: u32,
    direction: Direction,
    pos: usize,
    local_id: u32,
    global_id: u32,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Orders by gap, then simple-index id, then direction — exactly the
    /// tie-break rule spec §4.2 requires, and nothing else, so that
    /// determinism never accidentally depends on unrelated fields.
    fn cmp(&self, other: &Self) -> Ordering {
        self.gap
            .cmp(&other.gap)
            .then_with(|| self.simple_index.cmp(&other.simple_index))
            .then_with(|| self.direction.cmp(&other.direction))
    }
}

/// Per-composite-index traversal state: one priority queue, one witness
/// counter per point, and the set of points this composite has already
/// promoted. Disjoint from every other composite's state (spec §5).
struct CompositeState<'p> {
    simple_indices: &'p [PositionFile],
    query_keys: Vec<f32>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    witnessed: HashMap<u32, u32>,
    promoted_locally: HashSet<u32>,
}

impl<'p> CompositeState<'p> {
    fn new(simple_indices: &'p [PositionFile], query_keys: &[f32]) -> Self {
        let mut queue = BinaryHeap::new();
        for (j, file) in simple_indices.iter().enumerate() {
            let query_key = query_keys[j];
            let up = file.insertion_point(query_key);
            if let Some(entry) = file.get(up) {
                queue.push(Reverse(QueueEntry {
                    gap: OrderedFloat((entry.key - query_key).abs()),
                    simple_index: j as u32,
                    direction: Direction::Larger,
                    pos: up,
                    local_id: entry.local_id,
                    global_id: entry.global_id,
                }));
            }
            if up > 0 {
                if let Some(entry) = file.get(up - 1) {
                    queue.push(Reverse(QueueEntry {
                        gap: OrderedFloat((entry.key - query_key).abs()),
                        simple_index: j as u32,
                        direction: Direction::Smaller,
                        pos: up - 1,
                        local_id: entry.local_id,
                        global_id: entry.global_id,
                    }));
                }
            }
        }

        Self {
            simple_indices,
            query_keys: query_keys.to_vec(),
            queue,
            witnessed: HashMap::new(),
            promoted_locally: HashSet::new(),
        }
    }

    fn num_simple_indices(&self) -> usize {
        self.simple_indices.len()
    }

    /// Pop one entry and advance its iterator. Returns `None` if this
    /// composite's queue is empty. Returns `Some(promoted)` where `promoted`
    /// is `Some(global_id)` when the popped point reaches a full witness
    /// count for the first time in this composite, `None` otherwise.
    fn step(&mut self) -> Option<Option<u32>> {
        let Reverse(popped) = self.queue.pop()?;

        let count = self.witnessed.entry(popped.local_id).or_insert(0);
        *count += 1;
        let promoted = if *count == self.num_simple_indices() as u32
            && self.promoted_locally.insert(popped.local_id)
        {
            Some(popped.global_id)
        } else {
            None
        };

        let file = &self.simple_indices[popped.simple_index as usize];
        let query_key = self.query_keys[popped.simple_index as usize];
        let next_pos = match popped.direction {
            Direction::Larger => Some(popped.pos + 1),
            Direction::Smaller => popped.pos.checked_sub(1),
        };
        if let Some(next_pos) = next_pos {
            if let Some(entry) = file.get(next_pos) {
                self.queue.push(Reverse(QueueEntry {
                    gap: OrderedFloat((entry.key - query_key).abs()),
                    simple_index: popped.simple_index,
                    direction: popped.direction,
                    pos: next_pos,
                    local_id: entry.local_id,
                    global_id: entry.global_id,
                }));
            }
        }

        Some(promoted)
    }
}

/// A single promoted candidate with its true ambient-space distance.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ResultCandidate {
    distance: OrderedFloat<f32>,
    global_id: u32,
}

impl Eq for ResultCandidate {}

impl PartialOrd for ResultCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResultCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.global_id.cmp(&other.global_id))
    }
}

/// Ambient-space point storage the query engine computes true distances
/// against. Always indexed by *global* id, even when a query is running
/// against a coarser level's restricted composite indices.
pub struct PointData<'a> {
    data: &'a [f32],
    dim: usize,
}

impl<'a> PointData<'a> {
    pub fn new(data: &'a [f32], dim: usize) -> Self {
        Self { data, dim }
    }

    pub fn get(&self, global_id: u32) -> &'a [f32] {
        let start = global_id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    pub fn distance(&self, a: u32, query: &[f32]) -> f32 {
        let point = self.get(a);
        squared_euclidean(point, query).sqrt()
    }
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A pool of reusable projection buffers, shared across the queries of one
/// batch (spec §5: each query's traversal state is disjoint, but the
/// transient buffer a level's projection is written into need not be
/// allocated fresh every time). Mirrors the teacher's `SearchPool`: a
/// `Mutex`-guarded free list that a query pops from at the start of each
/// level and pushes back to when it's done with it.
#[derive(Default)]
pub struct ScratchPool {
    buffers: Mutex<Vec<Vec<f32>>>,
}

impl ScratchPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Vec<f32> {
        self.buffers.lock().pop().unwrap_or_default()
    }

    pub fn release(&self, buf: Vec<f32>) {
        self.buffers.lock().push(buf);
    }
}

/// Outcome of running the query engine over one level's composite indices.
pub struct LevelQueryOutcome {
    /// Global ids, in ascending-distance order (or promotion order if the
    /// query was blind).
    pub ids: Vec<u32>,
    /// Parallel to `ids`; empty in blind mode.
    pub distances: Vec<f32>,
    /// Distinct points promoted before termination, checked against
    /// `num_to_visit`/`prop_to_visit`.
    pub visited: usize,
    /// Distinct points promoted before termination, checked against
    /// `num_to_retrieve`/`prop_to_retrieve`. Tracks the same event as
    /// `visited`; the two caps can still terminate a query independently.
    pub retrieved: usize,
}

/// Runs the prioritized multi-probe traversal over `composites` (each a
/// slice of `L_s` position files over the same point set) for one query
/// point, honoring `caps` and `k`.
pub struct QueryEngine;

impl QueryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        composites: &[Vec<PositionFile>],
        query_projection: &[f32],
        l_s: usize,
        points: &PointData<'_>,
        query_point: &[f32],
        k: usize,
        caps: ResolvedCaps,
        blind: bool,
    ) -> LevelQueryOutcome {
        let num_composites = composites.len();
        if num_composites == 0 {
            return LevelQueryOutcome {
                ids: Vec::new(),
                distances: Vec::new(),
                visited: 0,
                retrieved: 0,
            };
        }

        let mut states: Vec<CompositeState<'_>> = composites
            .iter()
            .enumerate()
            .map(|(c, simple_indices)| {
                let keys = &query_projection[c * l_s..c * l_s + l_s];
                CompositeState::new(simple_indices, keys)
            })
            .collect();

        let mut visited = 0usize;
        let mut retrieved = 0usize;
        let mut promoted_global: HashSet<u32> = HashSet::new();
        let mut heap: BinaryHeap<ResultCandidate> = BinaryHeap::new();
        let mut blind_output: Vec<u32> = Vec::new();

        let mut current = 0usize;
        let mut consecutive_empty = 0usize;
        while visited < caps.visit && retrieved < caps.retrieve {
            if consecutive_empty >= num_composites {
                break; // every composite's queue is drained
            }

            let entry = states[current].step();
            current = (current + 1) % num_composites;

            let promoted_global_id = match entry {
                None => {
                    consecutive_empty += 1;
                    continue;
                }
                Some(promoted) => {
                    consecutive_empty = 0;
                    promoted
                }
            };

            // Resolved caps are expressed against N distinct points (see
            // config.rs's `.min(n)` clamp), and promoting one point costs
            // L_s pops, so counting pops here would make `visit_cap = N`
            // exhaust after N/L_s promotions instead of visiting all N.
            // Both axes therefore count the same event: a point's first
            // global promotion. They can still terminate independently,
            // since num_to_visit and num_to_retrieve may differ.
            if let Some(global_id) = promoted_global_id {
                if promoted_global.insert(global_id) {
                    visited += 1;
                    retrieved += 1;
                    if blind {
                        blind_output.push(global_id);
                    } else {
                        let distance = points.distance(global_id, query_point);
                        heap.push(ResultCandidate {
                            distance: OrderedFloat(distance),
                            global_id,
                        });
                        while heap.len() > k {
                            heap.pop();
                        }
                    }
                }
            }
        }

        if blind {
            LevelQueryOutcome {
                ids: blind_output,
                distances: Vec::new(),
                visited,
                retrieved,
            }
        } else {
            let mut sorted: Vec<ResultCandidate> = heap.into_sorted_vec();
            sorted.truncate(k);
            let ids = sorted.iter().map(|c| c.global_id).collect();
            let distances = sorted.iter().map(|c| c.distance.into_inner()).collect();
            LevelQueryOutcome {
                ids,
                distances,
                visited,
                retrieved,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionEntry;

    fn position_file(points: &[(f32, u32)]) -> PositionFile {
        PositionFile::build(
            points
                .iter()
                .map(|&(key, id)| PositionEntry {
                    key,
                    local_id: id,
                    global_id: id,
                })
                .collect(),
        )
    }

    /// Two composites, each with a single simple index (`L_s = 1`), over
    /// four points on a line. A point is promoted the moment its own
    /// composite's one simple index visits it, so this reduces to ordinary
    /// nearest-neighbour-by-projection.
    #[test]
    fn finds_nearest_on_a_line() {
        let data: Vec<f32> = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let points = PointData::new(&data, 2);

        let composite_a = vec![position_file(&[(0.0, 0), (1.0, 1), (0.0, 2), (1.0, 3)])];
        let composites = vec![composite_a];

        let query = [0.1f32, 0.1];
        let query_projection = vec![0.1f32];
        let caps = ResolvedCaps {
            visit: 100,
            retrieve: 100,
        };

        let outcome = QueryEngine::run(
            &composites,
            &query_projection,
            1,
            &points,
            &query,
            1,
            caps,
            false,
        );

        assert_eq!(outcome.ids, vec![0]);
        assert!((outcome.distances[0] - 0.14142135).abs() < 1e-4);
    }

    #[test]
    fn blind_mode_returns_promotion_order_without_distances() {
        let data: Vec<f32> = vec![0.0, 1.0, 2.0, 3.0];
        let points = PointData::new(&data, 1);
        let composite_a = vec![position_file(&[(0.0, 0), (1.0, 1), (2.0, 2), (3.0, 3)])];
        let composites = vec![composite_a];

        let query = [0.0f32];
        let query_projection = vec![0.0f32];
        let caps = ResolvedCaps {
            visit: 2,
            retrieve: 2,
        };

        let outcome = QueryEngine::run(
            &composites,
            &query_projection,
            1,
            &points,
            &query,
            2,
            caps,
            true,
        );

        assert!(outcome.distances.is_empty());
        assert_eq!(outcome.ids.len(), 2);
    }
}
