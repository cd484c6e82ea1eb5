//! Merged-cell anchor lookup

/// Merged range as (start_row, start_col, end_row, end_col), 0-based inclusive
pub type MergeRange = (u32, u32, u32, u32);

/// Lookup from merged member cells to the anchor (top-left) of their range.
///
/// Ranges are kept sorted by start row next to the furthest end row reached
/// so far, so a lookup is a binary search followed by a short backward walk
/// over the ranges that can still cover the row. Memory grows with the number
/// of ranges, not with their area.
#[derive(Debug, Clone, Default)]
pub struct MergeMap {
    ranges: Vec<MergeRange>,
    /// `reach[i]` is the largest end row among `ranges[..=i]`
    reach: Vec<u32>,
}

impl MergeMap {
    pub fn new(ranges: &[MergeRange]) -> Self {
        let mut ranges = ranges.to_vec();
        ranges.sort_by_key(|r| (r.0, r.1));
        let reach = ranges
            .iter()
            .scan(0u32, |furthest, r| {
                *furthest = (*furthest).max(r.2);
                Some(*furthest)
            })
            .collect();
        Self { ranges, reach }
    }

    /// Range covering (row, col), if any
    pub fn range_of(&self, row: u32, col: u32) -> Option<&MergeRange> {
        let candidates = self.ranges.partition_point(|r| r.0 <= row);
        (0..candidates)
            .rev()
            .take_while(|&i| self.reach[i] >= row)
            .map(|i| &self.ranges[i])
            .find(|r| r.2 >= row && r.1 <= col && col <= r.3)
    }

    /// Resolve a coordinate to the cell that actually holds its value and format
    pub fn resolve(&self, row: u32, col: u32) -> (u32, u32) {
        self.range_of(row, col)
            .map(|r| (r.0, r.1))
            .unwrap_or((row, col))
    }

    /// Whether the coordinate is a non-anchor member of a merged range
    pub fn is_member(&self, row: u32, col: u32) -> bool {
        self.range_of(row, col)
            .is_some_and(|r| (r.0, r.1) != (row, col))
    }

    /// Merged ranges, ordered by start row
    pub fn ranges(&self) -> &[MergeRange] {
        &self.ranges
    }

    /// Last row covered by any merged range
    pub fn last_row(&self) -> Option<u32> {
        self.reach.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_members_to_anchor() {
        // B8:D9
        let map = MergeMap::new(&[(7, 1, 8, 3)]);
        assert_eq!(map.resolve(7, 1), (7, 1));
        assert_eq!(map.resolve(7, 3), (7, 1));
        assert_eq!(map.resolve(8, 2), (7, 1));
        assert!(map.is_member(8, 3));
        assert!(!map.is_member(7, 1));
        assert_eq!(map.resolve(9, 1), (9, 1));
        assert_eq!(map.resolve(8, 4), (8, 4));
    }

    #[test]
    fn test_unmerged_cells_resolve_to_themselves() {
        let map = MergeMap::new(&[(0, 0, 0, 1)]);
        assert_eq!(map.resolve(4, 4), (4, 4));
        assert_eq!(map.last_row(), Some(0));
        assert_eq!(MergeMap::default().last_row(), None);
    }

    #[test]
    fn test_full_height_merge_next_to_short_ones() {
        // G1:G1048576 declared after A11:A12 and E11:E12
        let map = MergeMap::new(&[(10, 0, 11, 0), (10, 4, 11, 4), (0, 6, 1_048_575, 6)]);
        assert_eq!(map.ranges()[0], (0, 6, 1_048_575, 6));
        assert_eq!(map.resolve(500_000, 6), (0, 6));
        assert_eq!(map.resolve(11, 0), (10, 0));
        assert_eq!(map.resolve(11, 4), (10, 4));
        assert_eq!(map.resolve(11, 5), (11, 5));
        assert_eq!(map.resolve(12, 0), (12, 0));
        assert_eq!(map.last_row(), Some(1_048_575));
    }
}
