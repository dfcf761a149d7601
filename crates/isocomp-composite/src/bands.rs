//! Screen-row ownership.

use std::ops::Range;

/// Ranks receiving a cell.
///
/// Bands are contiguous, so the multi-rank case is a range and needs no allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The cell lies in no band.
    None,
    /// One rank owns the cell.
    Single(usize),
    /// The cell straddles the bands of these ranks.
    Multiple(Range<usize>),
}

impl Destination {
    /// Iterates the destination ranks.
    pub fn ranks(&self) -> Range<usize> {
        match self {
            Self::None => 0..0,
            Self::Single(rank) => *rank..*rank + 1,
            Self::Multiple(ranks) => ranks.clone(),
        }
    }
}

/// Horizontal bands of display rows, one per rank.
///
/// Rank `i` owns rows `[h * i / n, h * (i + 1) / n)`; the bands tile `[0, h)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPartition {
    height: u32,
    bands: Vec<Range<u32>>,
}

impl BandPartition {
    /// Partitions `height` rows among `world_size` ranks.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(height: u32, world_size: usize) -> Self {
        let h = u64::from(height);
        let n = world_size as u64;
        let bands = (0..n)
            // Both bounds are at most `height`
            .map(|i| (h * i / n) as u32..(h * (i + 1) / n) as u32)
            .collect();
        Self { height, bands }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn world_size(&self) -> usize {
        self.bands.len()
    }

    /// Rows owned by `rank`.
    pub fn band(&self, rank: usize) -> Range<u32> {
        self.bands[rank].clone()
    }

    pub fn bands(&self) -> &[Range<u32>] {
        &self.bands
    }

    /// Ranks whose band overlaps the display rows `[y_min, y_max]`.
    ///
    /// A multi-rank range may include ranks owning no rows when there are more ranks than
    /// rows; those receive nothing visible.
    pub fn destination(&self, y_min: f32, y_max: f32) -> Destination {
        if y_min.is_nan() || y_max.is_nan() || y_min > y_max {
            return Destination::None;
        }
        // First band ending above y_min, then every band starting at or below y_max
        let first = self
            .bands
            .partition_point(|band| f64::from(band.end) <= f64::from(y_min));
        let last = self
            .bands
            .partition_point(|band| f64::from(band.start) <= f64::from(y_max));
        let mut owners = (first..last).filter(|&r| !self.bands[r].is_empty());
        match (owners.next(), owners.next_back()) {
            (None, _) => Destination::None,
            (Some(rank), None) => Destination::Single(rank),
            (Some(lo), Some(hi)) => Destination::Multiple(lo..hi + 1),
        }
    }
}
