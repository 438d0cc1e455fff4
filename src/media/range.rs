use serde::{Deserialize, Serialize};

/// Closed time interval in seconds, as requested by a view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Units covering the interval at `rate` units per second. The end bound
    /// is rounded up so the closed interval is fully covered.
    pub fn to_units(&self, rate: f64) -> UnitRange {
        let start = (self.start.max(0.0) * rate).floor() as u64;
        let end = (self.end.max(0.0) * rate).ceil() as u64;
        UnitRange::new(start, end.max(start))
    }
}

/// Half-open range of sample or column indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitRange {
    pub start: u64,
    pub end: u64,
}

impl UnitRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains_range(&self, other: &UnitRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &UnitRange) -> Option<UnitRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(UnitRange { start, end })
    }

    /// Overlapping or directly adjacent.
    pub fn touches(&self, other: &UnitRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Distance between the two ranges; zero when they touch.
    pub fn gap_to(&self, other: &UnitRange) -> u64 {
        if self.touches(other) {
            0
        } else if self.end < other.start {
            other.start - self.end
        } else {
            self.start - other.end
        }
    }
}

/// Parts of `wanted` not covered by any of `covered`, in order.
pub fn subtract(wanted: UnitRange, covered: &[UnitRange]) -> Vec<UnitRange> {
    let mut sorted: Vec<UnitRange> = covered
        .iter()
        .filter_map(|c| c.intersect(&wanted))
        .collect();
    sorted.sort();

    let mut gaps = Vec::new();
    let mut cursor = wanted.start;
    for c in sorted {
        if c.start > cursor {
            gaps.push(UnitRange::new(cursor, c.start));
        }
        cursor = cursor.max(c.end);
    }
    if cursor < wanted.end {
        gaps.push(UnitRange::new(cursor, wanted.end));
    }
    gaps
}
