//! Cost model for loop-over-GEMM mappings.

use serde::{Serialize, Deserialize};
use std::cmp::{Ordering, Reverse};

/// Structural cost of mapping a contraction onto a GEMM primitive.
///
/// Compared lexicographically: operands without unit stride, then the
/// transpose flags of A and B, then the number of indices the GEMM absorbs
/// (more fused indices means a shallower outer loop nest, so it is better).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoGCost {
    /// Operands whose leading GEMM index is not stride one
    pub stride: usize,
    /// A is accessed transposed
    pub left_transpose: usize,
    /// B is accessed transposed
    pub right_transpose: usize,
    /// Total rank of M, N and K
    pub fused_indices: usize,
}

impl LoGCost {
    /// Build a cost from its four components.
    pub fn new(stride: usize, left_transpose: usize, right_transpose: usize, fused_indices: usize) -> Self {
        Self { stride, left_transpose, right_transpose, fused_indices }
    }

    fn key(&self) -> (usize, usize, usize, Reverse<usize>) {
        (self.stride, self.left_transpose, self.right_transpose, Reverse(self.fused_indices))
    }
}

impl Ord for LoGCost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for LoGCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
