//! Position files: per-direction sorted projected coordinates.
//!
//! See spec §3 (entity table) and §4.1. Every simple index owns one
//! position file: the points of its level, sorted by their projection onto
//! that simple index's direction. The query engine's iterators walk these
//! files outward from a query's own projected coordinate.

use ordered_float::OrderedFloat;

/// One entry in a position file: a projected coordinate paired with the two
/// ids that name the point it came from.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionEntry {
    pub key: f32,
    /// Position within this level's point subset.
    pub local_id: u32,
    /// Position within the full, finest-level point set.
    pub global_id: u32,
}

/// The sorted sequence backing one simple index.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct PositionFile {
    entries: Vec<PositionEntry>,
}

impl PositionFile {
    /// Build a position file from `(key, local_id, global_id)` triples,
    /// sorting by key. Ties in key break by `local_id` so that iteration
    /// order is a pure function of the data, never of build-time happenstance.
    pub fn build(mut entries: Vec<PositionEntry>) -> Self {
        entries.sort_unstable_by(|a, b| {
            OrderedFloat(a.key)
                .cmp(&OrderedFloat(b.key))
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        debug_assert!(entries.windows(2).all(|w| w[0].key <= w[1].key));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PositionEntry] {
        &self.entries
    }

    /// Index of the first entry whose key is >= `query_key` (a standard
    /// lower-bound binary search). Used to seed both directions of travel
    /// for a simple index's iterator.
    pub fn insertion_point(&self, query_key: f32) -> usize {
        self.entries
            .partition_point(|e| OrderedFloat(e.key) < OrderedFloat(query_key))
    }

    pub fn get(&self, idx: usize) -> Option<&PositionEntry> {
        self.entries.get(idx)
    }

    /// Build the restriction of this position file to entries whose
    /// `local_id` falls in one of `ranges` (spec §4.3: "pointing the next
    /// level's query at a restricted global-id set"). `ranges` need not be
    /// sorted or disjoint; the result stays sorted by key since filtering a
    /// sorted sequence preserves order.
    pub fn restrict(&self, ranges: &RangeSet) -> Self {
        let entries = self
            .entries
            .iter()
            .copied()
            .filter(|e| ranges.contains(e.local_id))
            .collect();
        Self { entries }
    }

    #[cfg(test)]
    pub(crate) fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].key <= w[1].key)
    }
}

/// A set of disjoint `[start, start+count)` ranges over `u32` ids, with
/// O(log n) membership testing. Used to express "the union of the child
/// ranges of the expanded coarse candidates" from spec §4.3 without
/// materializing a full bitset over the (potentially large) finer level.
#[derive(Clone, Debug, Default)]
pub struct RangeSet {
    ranges: Vec<(u32, u32)>,
}

impl RangeSet {
    /// Build from a set of `(start, count)` ranges, merging overlaps/adjacency.
    pub fn from_ranges(mut ranges: Vec<(u32, u32)>) -> Self {
        ranges.sort_unstable_by_key(|&(start, _)| start);
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (start, count) in ranges {
            if count == 0 {
                continue;
            }
            let end = start + count;
            if let Some(last) = merged.last_mut() {
                let last_end = last.0 + last.1;
                if start <= last_end {
                    last.1 = end.saturating_sub(last.0).max(last.1);
                    continue;
                }
            }
            merged.push((start, count));
        }
        Self { ranges: merged }
    }

    pub fn contains(&self, id: u32) -> bool {
        let idx = self.ranges.partition_point(|&(start, _)| start <= id);
        if idx == 0 {
            return false;
        }
        let (start, count) = self.ranges[idx - 1];
        id < start + count
    }

    pub fn total_len(&self) -> usize {
        self.ranges.iter().map(|&(_, count)| count as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: f32, id: u32) -> PositionEntry {
        PositionEntry {
            key,
            local_id: id,
            global_id: id,
        }
    }

    #[test]
    fn builds_sorted() {
        let file = PositionFile::build(vec![
            entry(3.0, 0),
            entry(1.0, 1),
            entry(2.0, 2),
            entry(-5.0, 3),
        ]);
        assert!(file.is_sorted());
        assert_eq!(
            file.entries().iter().map(|e| e.local_id).collect::<Vec<_>>(),
            vec![3, 1, 2, 0]
        );
    }

    #[test]
    fn insertion_point_binary_searches() {
        let file = PositionFile::build(vec![
            entry(0.0, 0),
            entry(1.0, 1),
            entry(2.0, 2),
            entry(3.0, 3),
        ]);
        assert_eq!(file.insertion_point(-1.0), 0);
        assert_eq!(file.insertion_point(0.5), 1);
        assert_eq!(file.insertion_point(1.0), 1);
        assert_eq!(file.insertion_point(3.5), 4);
    }
}
