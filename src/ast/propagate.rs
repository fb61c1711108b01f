//! Bottom-up sparsity propagation, FLOP accounting and layout computation.

use crate::ast::node::{Node, NodeKind};
use crate::memory::DenseMemoryLayout;
use crate::sparsity::{self, Pattern};
use crate::utils::errors::{InvariantError, InvariantErrorKind};
use crate::CompilerConfig;
use log::trace;

fn unresolved(node: &Node) -> InvariantError {
    InvariantError::new(
        InvariantErrorKind::UnresolvedEinsum,
        format!("{} must be resolved before sparsity or FLOP queries", node),
    )
}

fn descriptor(node: &Node, left: &Node, right: &Node) -> Result<String, InvariantError> {
    Ok(format!(
        "{},{}->{}",
        left.try_indices()?,
        right.try_indices()?,
        node.try_indices()?
    ))
}

fn nnz(node: &Node) -> Result<u64, InvariantError> {
    Ok(node.try_eqspp()?.count_nonzero() as u64)
}

impl Node {
    /// Sparsity pattern of this node from the patterns of its children.
    pub fn compute_sparsity_pattern(&self) -> Result<Pattern, InvariantError> {
        match &self.kind {
            NodeKind::IndexedTensor { tensor } => Ok(tensor.spp().clone()),
            NodeKind::Einsum => Err(unresolved(self)),
            NodeKind::Add => {
                let mut children = self.children.iter();
                let first = children.next().ok_or_else(|| {
                    InvariantError::new(InvariantErrorKind::MissingSparsity, "Add without operands")
                })?;
                children.try_fold(first.try_eqspp()?.clone(), |acc, child| {
                    sparsity::add(&acc, child.try_eqspp()?)
                })
            }
            NodeKind::ScalarMultiplication { .. } => self.child(0)?.try_eqspp().cloned(),
            NodeKind::IndexSum { .. } => {
                let term = self.child(0)?;
                sparsity::reduce(term.try_indices()?.names(), self.try_indices()?.names(), term.try_eqspp()?)
            }
            NodeKind::Product | NodeKind::Contraction { .. } | NodeKind::LoopOverGemm(_) => {
                let (left, right) = self.operands()?;
                sparsity::einsum(&descriptor(self, left, right)?, left.try_eqspp()?, right.try_eqspp()?)
            }
            NodeKind::Assign => {
                let (_, rhs) = self.operands()?;
                rhs.try_eqspp().cloned()
            }
        }
    }

    fn child(&self, pos: usize) -> Result<&Node, InvariantError> {
        self.children.get(pos).ok_or_else(|| {
            InvariantError::new(
                InvariantErrorKind::MissingSparsity,
                format!("{} has no operand {}", self, pos),
            )
        })
    }

    /// Pattern of the unreduced product of both operands of a binary node.
    fn unreduced_product_pattern(&self) -> Result<Pattern, InvariantError> {
        let (left, right) = self.operands()?;
        let (li, ri) = (left.try_indices()?, right.try_indices()?);
        let desc = format!("{},{}->{}", li, ri, li.merged(ri));
        sparsity::einsum(&desc, left.try_eqspp()?, right.try_eqspp()?)
    }

    /// Arithmetic operations on non-zero entries performed by this node alone.
    pub fn non_zero_flops(&self) -> Result<u64, InvariantError> {
        match &self.kind {
            NodeKind::IndexedTensor { .. } | NodeKind::Assign => Ok(0),
            NodeKind::Einsum => Err(unresolved(self)),
            NodeKind::Add => {
                let operands = self.children.iter().map(nnz).sum::<Result<u64, _>>()?;
                Ok(operands.saturating_sub(nnz(self)?))
            }
            NodeKind::ScalarMultiplication { scalar } => {
                if scalar.is_unit() {
                    Ok(0)
                } else {
                    nnz(self)
                }
            }
            NodeKind::IndexSum { .. } => Ok(nnz(self.child(0)?)?.saturating_sub(nnz(self)?)),
            NodeKind::Product | NodeKind::Contraction { .. } => nnz(self),
            NodeKind::LoopOverGemm(_) => {
                // one fused multiply-add per product entry, minus the first add
                let product = self.unreduced_product_pattern()?.count_nonzero() as u64;
                Ok((2 * product).saturating_sub(nnz(self)?))
            }
        }
    }

    /// Sum of [`Node::non_zero_flops`] over the whole tree.
    pub fn total_non_zero_flops(&self) -> Result<u64, InvariantError> {
        let mut total = self.non_zero_flops()?;
        for child in &self.children {
            total += child.total_non_zero_flops()?;
        }
        Ok(total)
    }
}

/// Compute the sparsity pattern of every node, children first.
///
/// Patterns only depend on already-fixed child patterns, so running this
/// again on a propagated tree reproduces the same patterns.
pub fn propagate_sparsity(node: &mut Node) -> Result<(), InvariantError> {
    for child in &mut node.children {
        propagate_sparsity(child)?;
    }
    let spp = node.compute_sparsity_pattern()?;
    trace!("{}: {} non-zeros", node, spp.count_nonzero());
    node.eqspp = Some(spp);
    Ok(())
}

/// Compute layouts for every intermediate result, children first.
///
/// Leaves use their tensor's layout. An operation result gets its stride
/// aligned when some operand can already be vectorized along the
/// operation's leading index.
pub fn compute_memory_layouts(node: &mut Node, config: &CompilerConfig) -> Result<(), InvariantError> {
    for child in &mut node.children {
        compute_memory_layouts(child, config)?;
    }
    let layout = match &node.kind {
        NodeKind::IndexedTensor { .. } => return Ok(()),
        NodeKind::Assign => node.operands()?.0.try_memory_layout()?.clone(),
        _ if config.simple_memory_layout => DenseMemoryLayout::new(node.shape()?),
        _ => {
            let align = config.align_stride && may_vectorize_leading_index(node, config.alignment);
            DenseMemoryLayout::from_pattern(node.try_eqspp()?, align, config.alignment)
        }
    };
    node.memory_layout = Some(layout);
    Ok(())
}

fn may_vectorize_leading_index(node: &Node, alignment: usize) -> bool {
    let Some(leading) = node.indices().and_then(|i| i.first()) else {
        return false;
    };
    node.children.iter().any(|child| {
        match (child.indices().and_then(|i| i.find(leading)), child.memory_layout()) {
            (Some(dim), Some(layout)) => layout.may_vectorize_dim(dim, alignment),
            _ => false,
        }
    })
}
