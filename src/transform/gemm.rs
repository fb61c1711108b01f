//! Mapping contractions onto GEMM primitives.
//!
//! Candidate partitions come from a [`GemmCandidates`] source; this module
//! only checks them against the operand and result layouts and keeps the
//! cheapest by [`LoGCost`]. On equal cost the earlier candidate wins.

use crate::algebra::{Indices, LoGCost};
use crate::ast::{GemmParams, Node, NodeKind};
use crate::transform::Transform;
use crate::utils::errors::ForgeResult;
use anyhow::Result;
use log::debug;

/// One (M, N, K) partition of a contraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmMapping {
    /// Row indices
    pub m: Indices,
    /// Column indices
    pub n: Indices,
    /// Summed indices
    pub k: Indices,
}

/// Source of candidate partitions.
pub trait GemmCandidates {
    /// Candidates for `result = a * b` summed over `sum`, in preference order.
    fn candidates(&self, result: &Indices, a: &Indices, b: &Indices, sum: &Indices) -> Vec<GemmMapping>;
}

/// M = result indices of A only, N = result indices of B only, K = summed
/// indices of both, each in operand storage order. Result indices carried by
/// both operands are batch indices and stay in the outer loops.
///
/// Also offers the unfused partition that takes only the leading index of
/// each group, for operands whose layout cannot fuse the full groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalPartition;

impl GemmCandidates for NaturalPartition {
    fn candidates(&self, result: &Indices, a: &Indices, b: &Indices, sum: &Indices) -> Vec<GemmMapping> {
        let m = a.intersection(result).difference(b);
        let n = b.intersection(result).difference(a);
        let k = a.intersection(sum).intersection(b);
        if m.is_empty() || k.is_empty() {
            return Vec::new();
        }
        let full = GemmMapping { m, n, k };
        let leading = |i: &Indices| i.first().and_then(|idx| i.extract(&[idx])).unwrap_or_default();
        let single = GemmMapping {
            m: leading(&full.m),
            n: leading(&full.n),
            k: leading(&full.k),
        };
        if single == full {
            vec![full]
        } else {
            vec![full, single]
        }
    }
}

/// Cost of mapping the contraction `node` with `candidate`.
///
/// `None` if the partition does not fit the indices or a layout cannot be
/// addressed as the required matrices.
pub fn evaluate(node: &Node, candidate: &GemmMapping) -> Option<LoGCost> {
    let (a, b) = (node.left()?, node.right()?);
    let (ci, ai, bi) = (node.indices()?, a.indices()?, b.indices()?);
    let params = GemmParams::new(
        ci,
        ai,
        bi,
        candidate.m.clone(),
        candidate.n.clone(),
        candidate.k.clone(),
    )
    .ok()?;
    let compatible = params.arguments_compatible(ai, bi, a.memory_layout()?, b.memory_layout()?)
        && params.result_compatible(ci, node.memory_layout()?);
    compatible.then(|| params.cost(ai, bi))
}

fn best_candidate(node: &Node, source: &dyn GemmCandidates) -> Option<(GemmMapping, LoGCost)> {
    let (ci, ai, bi) = (node.indices()?, node.left()?.indices()?, node.right()?.indices()?);
    let sum = match node.kind() {
        NodeKind::Contraction { sum_indices } => sum_indices,
        _ => return None,
    };
    let mut best: Option<(GemmMapping, LoGCost)> = None;
    for candidate in source.candidates(ci, ai, bi, sum) {
        if let Some(cost) = evaluate(node, &candidate) {
            if best.as_ref().map_or(true, |(_, c)| cost < *c) {
                best = Some((candidate, cost));
            }
        }
    }
    best
}

/// Rewrite every contraction into its cheapest compatible GEMM mapping.
///
/// Contractions without a compatible candidate stay as they are. Returns the
/// number of rewritten nodes.
pub fn map_contractions(node: &mut Node, source: &dyn GemmCandidates) -> ForgeResult<usize> {
    let mut mapped = 0;
    for child in &mut node.children {
        mapped += map_contractions(child, source)?;
    }
    if !matches!(node.kind(), NodeKind::Contraction { .. }) {
        return Ok(mapped);
    }
    let Some((mapping, cost)) = best_candidate(node, source) else {
        debug!("no GEMM mapping for {}", node);
        return Ok(mapped);
    };
    let indices = node.try_indices()?.clone();
    let mut children = std::mem::take(&mut node.children);
    let (b, a) = match (children.pop(), children.pop()) {
        (Some(b), Some(a)) => (b, a),
        _ => return Ok(mapped),
    };
    let mut gemm = Node::loop_over_gemm(&indices, a, b, mapping.m, mapping.n, mapping.k)?;
    gemm.eqspp = node.eqspp.take();
    gemm.memory_layout = node.memory_layout.take();
    gemm.prefetch = node.prefetch.take();
    debug!("mapped {} with cost {:?}", gemm, cost);
    *node = gemm;
    Ok(mapped + 1)
}

/// Pass wrapper around [`map_contractions`].
pub struct GemmSelection<S: GemmCandidates = NaturalPartition> {
    source: S,
}

impl<S: GemmCandidates> GemmSelection<S> {
    /// Select among candidates from `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl Default for GemmSelection {
    fn default() -> Self {
        Self::new(NaturalPartition)
    }
}

impl<S: GemmCandidates> Transform for GemmSelection<S> {
    fn apply(&self, statement: &mut Node) -> Result<bool> {
        Ok(map_contractions(statement, &self.source)? > 0)
    }

    fn name(&self) -> &str {
        "gemm-selection"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{propagate_sparsity, compute_memory_layouts, resolve, Tensor, TensorRef};
    use crate::CompilerConfig;

    fn tensor(name: &str, shape: &[usize]) -> TensorRef {
        Tensor::new(name, shape).unwrap().into_ref()
    }

    fn prepared(stmt: Node) -> Node {
        let mut stmt = resolve(stmt).unwrap();
        propagate_sparsity(&mut stmt).unwrap();
        compute_memory_layouts(&mut stmt, &CompilerConfig::default()).unwrap();
        stmt
    }

    fn matmul(c: &str, a: &str, b: &str) -> Node {
        let size = |i: char| match i { 'i' => 4, 'j' => 5, 'k' => 3, _ => 2 };
        let leaf = |name: &str, idx: &str| {
            let shape: Vec<usize> = idx.chars().map(size).collect();
            Node::indexed(&tensor(name, &shape), idx).unwrap()
        };
        leaf("C", c).assign(leaf("A", a).times(leaf("B", b)).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_matmul_is_mapped() {
        let mut stmt = prepared(matmul("ij", "ik", "kj"));
        assert_eq!(map_contractions(&mut stmt, &NaturalPartition).unwrap(), 1);
        let gemm = stmt.right().unwrap().gemm().unwrap();
        assert_eq!((gemm.trans_a, gemm.trans_b), (false, false));
        assert!(stmt.right().unwrap().eqspp().is_some());
    }

    #[test]
    fn test_transposed_operand_costs_more() {
        let plain = prepared(matmul("ij", "ik", "kj"));
        let trans = prepared(matmul("ij", "ki", "kj"));
        let candidate = |n: &Node| {
            let rhs = n.right().unwrap();
            let (ci, ai, bi) = (rhs.indices().unwrap(), rhs.left().unwrap().indices().unwrap(), rhs.right().unwrap().indices().unwrap());
            let sum = match rhs.kind() {
                NodeKind::Contraction { sum_indices } => sum_indices.clone(),
                _ => unreachable!(),
            };
            let c = NaturalPartition.candidates(ci, ai, bi, &sum).remove(0);
            evaluate(rhs, &c).unwrap()
        };
        assert!(candidate(&plain) < candidate(&trans));
    }

    #[test]
    fn test_outer_product_stays() {
        let a = Node::indexed(&tensor("a", &[4]), "i").unwrap();
        let b = Node::indexed(&tensor("b", &[5]), "j").unwrap();
        let c = Node::indexed(&tensor("C", &[4, 5]), "ij").unwrap();
        let mut stmt = prepared(c.assign(a.times(b).unwrap()).unwrap());
        assert_eq!(map_contractions(&mut stmt, &NaturalPartition).unwrap(), 0);
        assert!(matches!(stmt.right().unwrap().kind(), NodeKind::Product));
    }

    #[test]
    fn test_unfused_fallback_candidate() {
        let result = Indices::new("ijl", &[4, 5, 2]).unwrap();
        let a = Indices::new("ilk", &[4, 2, 3]).unwrap();
        let b = Indices::new("kj", &[3, 5]).unwrap();
        let sum = Indices::new("k", &[3]).unwrap();
        let cands = NaturalPartition.candidates(&result, &a, &b, &sum);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].m.to_string(), "il");
        assert_eq!(cands[1].m.to_string(), "i");
    }

    #[test]
    fn test_batch_index_stays_in_loops() {
        let mut stmt = prepared(matmul("ilj", "ilk", "kjl"));
        assert_eq!(map_contractions(&mut stmt, &NaturalPartition).unwrap(), 1);
        let node = stmt.right().unwrap();
        let gemm = node.gemm().unwrap();
        assert!(!gemm.m.contains('l') && !gemm.n.contains('l'));
        assert_eq!(gemm.m.to_string(), "i");
        assert_eq!(gemm.n.to_string(), "j");
        assert_eq!(gemm.k.to_string(), "k");
        let (a, b) = (node.left().unwrap().indices().unwrap(), node.right().unwrap().indices().unwrap());
        assert_eq!(gemm.loop_indices(node.indices().unwrap(), a, b).to_string(), "l");
    }
}
