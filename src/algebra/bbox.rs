//! Dimension ranges and bounding boxes.

use crate::sparsity::Pattern;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::Index as IndexOp;

/// A half-open range `[start, stop)` along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// First index inside the range
    pub start: usize,
    /// One past the last index
    pub stop: usize,
}

impl Range {
    /// Range `[start, stop)`.
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Number of indices covered; zero for inverted ranges.
    pub fn size(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    /// Widen the range so both ends fall on multiples of `alignment`.
    pub fn aligned(&self, alignment: usize) -> Range {
        if alignment <= 1 {
            return *self;
        }
        let start = (self.start / alignment) * alignment;
        let stop = self.stop.div_ceil(alignment) * alignment;
        Range { start, stop }
    }

    /// Whether `value` lies inside the range.
    pub fn contains(&self, value: usize) -> bool {
        self.start <= value && value < self.stop
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Per-dimension ranges enclosing all non-zero entries of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    ranges: Vec<Range>,
}

impl BoundingBox {
    /// Box from one range per dimension.
    pub fn new(ranges: Vec<Range>) -> Self {
        Self { ranges }
    }

    /// The full box `[0, n)` for every extent of `shape`.
    pub fn from_shape(shape: &[usize]) -> Self {
        Self::new(shape.iter().map(|&n| Range::new(0, n)).collect())
    }

    /// The tightest box around the non-zeros of `pattern`.
    ///
    /// An all-zero pattern yields empty ranges.
    pub fn from_pattern(pattern: &Pattern) -> Self {
        match pattern.nnz_bounds() {
            Some(bounds) => Self::new(
                bounds
                    .into_iter()
                    .map(|(lo, hi)| Range::new(lo, hi + 1))
                    .collect(),
            ),
            None => Self::new(vec![Range::new(0, 0); pattern.shape().len()]),
        }
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the box has no dimensions.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of entries in the box.
    pub fn size(&self) -> usize {
        self.ranges.iter().map(Range::size).product()
    }

    /// Ranges in dimension order.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Iterate over the ranges in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.ranges.iter()
    }

    /// Whether a multi-index lies inside the box.
    pub fn contains_entry(&self, entry: &[usize]) -> bool {
        entry.len() == self.len()
            && entry.iter().zip(&self.ranges).all(|(&e, r)| r.contains(e))
    }

    /// Reorder dimensions so that dimension `i` becomes `perm[i]`.
    pub fn permuted(&self, perm: &[usize]) -> BoundingBox {
        Self::new(perm.iter().map(|&p| self.ranges[p]).collect())
    }

    pub(crate) fn with_range(mut self, dim: usize, range: Range) -> Self {
        self.ranges[dim] = range;
        self
    }
}

impl IndexOp<usize> for BoundingBox {
    type Output = Range;

    fn index(&self, dim: usize) -> &Range {
        &self.ranges[dim]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(" x "))
    }
}
