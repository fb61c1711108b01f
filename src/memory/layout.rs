//! Dense column-major memory layouts.
//!
//! A layout stores only the bounding box of a tensor's non-zeros, with the
//! first dimension running fastest. When stride alignment is requested the
//! first range is widened to a multiple of the vector width so every column
//! starts on an aligned address.

use crate::algebra::BoundingBox;
use crate::sparsity::Pattern;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Dense storage for the bounding box of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenseMemoryLayout {
    shape: Vec<usize>,
    /// Box before alignment, kept so permutations can re-align
    original_bbox: BoundingBox,
    bbox: BoundingBox,
    stride: Vec<usize>,
    alignment: Option<usize>,
}

impl DenseMemoryLayout {
    /// Layout covering the full shape without alignment.
    pub fn new(shape: &[usize]) -> Self {
        Self::from_bounding_box(shape, BoundingBox::from_shape(shape), None)
    }

    /// Layout for an explicit box, aligning the first range if `alignment` is set.
    pub fn from_bounding_box(shape: &[usize], bbox: BoundingBox, alignment: Option<usize>) -> Self {
        let aligned = match alignment {
            Some(a) if !bbox.is_empty() => {
                let first = bbox[0].aligned(a);
                bbox.clone().with_range(0, first)
            }
            _ => bbox.clone(),
        };
        let mut stride = Vec::with_capacity(aligned.len());
        let mut s = 1;
        for range in aligned.iter() {
            stride.push(s);
            s *= range.size();
        }
        Self {
            shape: shape.to_vec(),
            original_bbox: bbox,
            bbox: aligned,
            stride,
            alignment,
        }
    }

    /// Tight layout around the non-zeros of `pattern`.
    pub fn from_pattern(pattern: &Pattern, align_stride: bool, alignment: usize) -> Self {
        let bbox = BoundingBox::from_pattern(pattern);
        let alignment = if align_stride { Some(alignment) } else { None };
        Self::from_bounding_box(pattern.shape(), bbox, alignment)
    }

    /// Shape of the full tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Stored region, after alignment.
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Column-major strides of the stored region.
    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    /// Whether the leading range was aligned.
    pub fn is_aligned_stride(&self) -> bool {
        self.alignment.is_some()
    }

    /// Number of reals to allocate.
    pub fn required_reals(&self) -> usize {
        match (self.stride.last(), self.bbox.iter().last()) {
            (Some(&s), Some(r)) => s * r.size(),
            _ => 1,
        }
    }

    /// Offset of an entry, if it lies inside the stored box.
    pub fn address(&self, entry: &[usize]) -> Option<usize> {
        if !self.bbox.contains_entry(entry) {
            return None;
        }
        Some(
            entry
                .iter()
                .zip(self.bbox.iter())
                .zip(&self.stride)
                .map(|((&e, r), &s)| (e - r.start) * s)
                .sum(),
        )
    }

    /// Layout of the transposed tensor, dimension `i` taken from `perm[i]`.
    pub fn permuted(&self, perm: &[usize]) -> Self {
        let shape: Vec<usize> = perm.iter().map(|&p| self.shape[p]).collect();
        Self::from_bounding_box(&shape, self.original_bbox.permuted(perm), self.alignment)
    }

    /// Whether columns along `dim` fill whole vector registers.
    pub fn may_vectorize_dim(&self, dim: usize, alignment: usize) -> bool {
        self.bbox
            .ranges()
            .get(dim)
            .map(|r| alignment > 0 && r.size() % alignment == 0)
            .unwrap_or(false)
    }

    /// Whether the dimensions at `positions` can be addressed as one.
    pub fn may_fuse(&self, positions: &[usize]) -> bool {
        positions.windows(2).all(|w| {
            let (i, j) = (w[0], w[1]);
            j == i + 1
                && j < self.stride.len()
                && self.stride[j] == self.bbox[i].size() * self.stride[i]
        })
    }
}

impl fmt::Display for DenseMemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dense(shape={:?}, bbox={}, stride={:?})", self.shape, self.bbox, self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Range;

    #[test]
    fn test_full_layout() {
        let layout = DenseMemoryLayout::new(&[3, 4, 5]);
        assert_eq!(layout.stride(), &[1, 3, 12]);
        assert_eq!(layout.required_reals(), 60);
        assert_eq!(layout.address(&[1, 2, 3]), Some(1 + 6 + 36));
        assert!(layout.may_fuse(&[0, 1]));
        assert!(layout.may_fuse(&[1, 2]));
        assert!(!layout.may_fuse(&[0, 2]));
        assert!(layout.may_fuse(&[2]));
    }

    #[test]
    fn test_scalar_layout() {
        let layout = DenseMemoryLayout::new(&[]);
        assert_eq!(layout.required_reals(), 1);
        assert_eq!(layout.address(&[]), Some(0));
    }

    #[test]
    fn test_layout_from_sparse_pattern() {
        let pattern = Pattern::from_entries(&[8, 4], &[vec![2, 1], vec![5, 2]]).unwrap();
        let layout = DenseMemoryLayout::from_pattern(&pattern, false, 4);
        assert_eq!(layout.bbox().ranges(), &[Range::new(2, 6), Range::new(1, 3)]);
        assert_eq!(layout.required_reals(), 8);
        assert_eq!(layout.address(&[2, 1]), Some(0));
        assert_eq!(layout.address(&[0, 0]), None);
    }

    #[test]
    fn test_aligned_stride() {
        let pattern = Pattern::from_entries(&[8, 4], &[vec![2, 1], vec![5, 2]]).unwrap();
        let layout = DenseMemoryLayout::from_pattern(&pattern, true, 4);
        assert_eq!(layout.bbox()[0], Range::new(0, 8));
        assert_eq!(layout.stride(), &[1, 8]);
        assert!(layout.may_vectorize_dim(0, 4));
        assert!(!layout.may_vectorize_dim(1, 4));
    }

    #[test]
    fn test_permuted_layout() {
        let layout = DenseMemoryLayout::new(&[3, 5]);
        let t = layout.permuted(&[1, 0]);
        assert_eq!(t.shape(), &[5, 3]);
        assert_eq!(t.stride(), &[1, 5]);
        assert_eq!(t.required_reals(), 15);
    }
}
