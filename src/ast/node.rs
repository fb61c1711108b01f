//! Expression-tree nodes.
//!
//! A [`Node`] owns its children exclusively, so a tree can never share an
//! intermediate value between two parents. The variant set is closed
//! ([`NodeKind`]); every pass matches on it exhaustively.

use crate::algebra::{Index, Indices};
use crate::ast::gemm::GemmParams;
use crate::ast::tensor::{ScalarValue, TensorRef};
use crate::memory::DenseMemoryLayout;
use crate::sparsity::Pattern;
use crate::utils::errors::{
    CompositionError, CompositionErrorKind, InvariantError, InvariantErrorKind,
};
use std::fmt;

/// The kind of a node, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Leaf: a tensor with an explicit index assignment
    IndexedTensor {
        /// Tensor being indexed
        tensor: TensorRef,
    },
    /// Unresolved product-sum; removed by index resolution
    Einsum,
    /// N-ary sum over children with identical free indices
    Add,
    /// Unary scaling by a constant or a runtime scalar
    ScalarMultiplication {
        /// Factor
        scalar: ScalarValue,
    },
    /// Unary reduction over one index
    IndexSum {
        /// The reduced index
        sum_index: Indices,
    },
    /// Binary product without reduction
    Product,
    /// Binary product reduced over `sum_indices`
    Contraction {
        /// Reduced indices, in operand order
        sum_indices: Indices,
    },
    /// Contraction mapped onto a GEMM primitive
    LoopOverGemm(GemmParams),
    /// Binary assignment into an indexed tensor
    Assign,
}

impl NodeKind {
    /// Kind name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::IndexedTensor { .. } => "IndexedTensor",
            NodeKind::Einsum => "Einsum",
            NodeKind::Add => "Add",
            NodeKind::ScalarMultiplication { .. } => "ScalarMultiplication",
            NodeKind::IndexSum { .. } => "IndexSum",
            NodeKind::Product => "Product",
            NodeKind::Contraction { .. } => "Contraction",
            NodeKind::LoopOverGemm(_) => "LoopOverGEMM",
            NodeKind::Assign => "Assign",
        }
    }
}

/// A node of a tensor expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) indices: Option<Indices>,
    pub(crate) children: Vec<Node>,
    pub(crate) eqspp: Option<Pattern>,
    pub(crate) memory_layout: Option<DenseMemoryLayout>,
    pub(crate) prefetch: Option<TensorRef>,
}

fn composition(kind: CompositionErrorKind, message: impl Into<String>) -> CompositionError {
    CompositionError::new(kind, message)
}

fn require_indices(node: &Node) -> Result<&Indices, CompositionError> {
    node.indices.as_ref().ok_or_else(|| {
        composition(
            CompositionErrorKind::IndexMismatch,
            format!("Operand {} has no deduced indices", node),
        )
    })
}

impl Node {
    fn with_kind(kind: NodeKind, children: Vec<Node>, indices: Option<Indices>) -> Self {
        Self {
            kind,
            indices,
            children,
            eqspp: None,
            memory_layout: None,
            prefetch: None,
        }
    }

    /// Index a tensor, e.g. `Node::indexed(&a, "ik")`.
    pub fn indexed(tensor: &TensorRef, names: &str) -> Result<Node, CompositionError> {
        let indices = Indices::new(names, tensor.shape()).map_err(|e| {
            composition(e.kind, format!("{} (tensor {})", e.message, tensor.name()))
        })?;
        Ok(Self::with_kind(
            NodeKind::IndexedTensor { tensor: tensor.clone() },
            Vec::new(),
            Some(indices),
        ))
    }

    /// Product-sum placeholder over `children`.
    pub fn einsum(children: Vec<Node>) -> Node {
        Self::with_kind(NodeKind::Einsum, children, None)
    }

    /// N-ary sum; indices are deduced during resolution.
    pub fn addition(children: Vec<Node>) -> Node {
        Self::with_kind(NodeKind::Add, children, None)
    }

    /// Scale `term` by `scalar`.
    ///
    /// Scaling a scalar multiplication again is rejected: merge the factors
    /// into a single one instead.
    pub fn scalar_multiplication(
        scalar: impl Into<ScalarValue>,
        term: Node,
    ) -> Result<Node, CompositionError> {
        if term.is_scalar_multiplication() {
            return Err(composition(
                CompositionErrorKind::NestedScalarMultiplication,
                "Multiple multiplications with scalars are not allowed. Merge them into a single one.",
            ));
        }
        let indices = term.indices.clone();
        Ok(Self::with_kind(
            NodeKind::ScalarMultiplication { scalar: scalar.into() },
            vec![term],
            indices,
        ))
    }

    /// Sum `term` over `index`.
    pub fn index_sum(term: Node, index: Index) -> Result<Node, CompositionError> {
        let term_indices = require_indices(&term)?;
        let sum_index = term_indices.extract(&[index]).ok_or_else(|| {
            composition(
                CompositionErrorKind::IndexMismatch,
                format!("Cannot sum over {}: not an index of {}", index, term),
            )
        })?;
        let indices = term_indices.without(index);
        Ok(Self::with_kind(
            NodeKind::IndexSum { sum_index },
            vec![term],
            Some(indices),
        ))
    }

    /// Binary product; free indices are the union, left first.
    pub fn product(left: Node, right: Node) -> Result<Node, CompositionError> {
        let (li, ri) = (require_indices(&left)?, require_indices(&right)?);
        li.check_compatible(ri)?;
        let shared = li.intersection(ri);
        let indices = li.merged(&ri.difference(&shared));
        Ok(Self::with_kind(NodeKind::Product, vec![left, right], Some(indices)))
    }

    /// Product of `left` and `right` reduced over `sum_indices`, stored in
    /// the order given by `indices`.
    pub fn contraction(
        indices: &Indices,
        left: Node,
        right: Node,
        sum_indices: &Indices,
    ) -> Result<Node, CompositionError> {
        let (li, ri) = (require_indices(&left)?, require_indices(&right)?);
        li.check_compatible(ri)?;
        let free_left = li.difference(sum_indices);
        let free_right = ri.difference(sum_indices).difference(&free_left);
        let natural = free_left.merged(&free_right);
        if !sum_indices.iter().all(|idx| li.contains(idx) || ri.contains(idx)) {
            return Err(composition(
                CompositionErrorKind::IndexMismatch,
                format!("Summation indices {} do not occur in {} or {}", sum_indices, li, ri),
            ));
        }
        let sum_indices = li.merged(ri).extract(sum_indices.names()).ok_or_else(|| {
            composition(CompositionErrorKind::IndexMismatch, "Unknown summation index")
        })?;
        let mut node = Self::with_kind(
            NodeKind::Contraction { sum_indices },
            vec![left, right],
            Some(natural),
        );
        node.set_index_permutation(indices, true)?;
        Ok(node)
    }

    /// Contraction refined with an explicit (M, N, K) partition.
    pub fn loop_over_gemm(
        indices: &Indices,
        a: Node,
        b: Node,
        m: Indices,
        n: Indices,
        k: Indices,
    ) -> Result<Node, CompositionError> {
        let params = GemmParams::new(indices, require_indices(&a)?, require_indices(&b)?, m, n, k)?;
        Ok(Self::with_kind(
            NodeKind::LoopOverGemm(params),
            vec![a, b],
            Some(indices.clone()),
        ))
    }

    /// Assign `rhs` into the indexed tensor `lhs`.
    pub fn assignment(lhs: Node, rhs: Node) -> Result<Node, CompositionError> {
        if !lhs.is_indexed_tensor() {
            return Err(composition(
                CompositionErrorKind::InvalidAssignTarget,
                format!("First child of Assign node must be an IndexedTensor: {}", lhs),
            ));
        }
        let indices = lhs.indices.clone();
        Ok(Self::with_kind(NodeKind::Assign, vec![lhs, rhs], indices))
    }

    /// Kind and kind-specific payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Short name of the kind.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Free indices, `None` until deduced.
    pub fn indices(&self) -> Option<&Indices> {
        self.indices.as_ref()
    }

    /// Free indices, failing if not yet deduced.
    pub fn try_indices(&self) -> Result<&Indices, InvariantError> {
        self.indices.as_ref().ok_or_else(|| {
            InvariantError::new(
                InvariantErrorKind::MissingIndices,
                format!("Indices of {} have not been deduced", self),
            )
        })
    }

    /// Extents of the free indices.
    pub fn shape(&self) -> Result<&[usize], InvariantError> {
        Ok(self.try_indices()?.shape())
    }

    /// Operands in order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Number of operands.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the node has no operands.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// First child of a unary or binary node.
    pub fn term(&self) -> Option<&Node> {
        self.children.first()
    }

    /// First operand of a binary node.
    pub fn left(&self) -> Option<&Node> {
        self.children.first()
    }

    /// Second operand of a binary node; the right side of an `Assign`.
    pub fn right(&self) -> Option<&Node> {
        self.children.get(1)
    }

    /// Binary operands, checked.
    pub(crate) fn operands(&self) -> Result<(&Node, &Node), InvariantError> {
        match self.children.as_slice() {
            [l, r] => Ok((l, r)),
            _ => Err(InvariantError::new(
                InvariantErrorKind::MissingIndices,
                format!("{} must have exactly 2 children, has {}", self, self.children.len()),
            )),
        }
    }

    /// Replace the children of a binary node.
    pub fn set_children(&mut self, children: Vec<Node>) -> Result<(), CompositionError> {
        if self.is_binary() && children.len() != 2 {
            return Err(composition(
                CompositionErrorKind::BinaryArity,
                format!("{} node must have exactly 2 children", self.kind_name()),
            ));
        }
        if matches!(self.kind, NodeKind::Assign)
            && !children.first().is_some_and(Node::is_indexed_tensor)
        {
            return Err(composition(
                CompositionErrorKind::InvalidAssignTarget,
                "First child of Assign node must be an IndexedTensor",
            ));
        }
        self.children = children;
        Ok(())
    }

    /// Tensor of an `IndexedTensor` leaf.
    pub fn tensor(&self) -> Option<&TensorRef> {
        match &self.kind {
            NodeKind::IndexedTensor { tensor } => Some(tensor),
            _ => None,
        }
    }

    /// Tensor name of a leaf.
    pub fn name(&self) -> Option<String> {
        self.tensor().map(|t| t.name())
    }

    /// Factor of a scalar multiplication.
    pub fn scalar(&self) -> Option<&ScalarValue> {
        match &self.kind {
            NodeKind::ScalarMultiplication { scalar } => Some(scalar),
            _ => None,
        }
    }

    /// Partition of a loop-over-GEMM node.
    pub fn gemm(&self) -> Option<&GemmParams> {
        match &self.kind {
            NodeKind::LoopOverGemm(params) => Some(params),
            _ => None,
        }
    }

    /// Whether this is a tensor leaf.
    pub fn is_indexed_tensor(&self) -> bool {
        matches!(self.kind, NodeKind::IndexedTensor { .. })
    }

    /// Whether this node scales its term.
    pub fn is_scalar_multiplication(&self) -> bool {
        matches!(self.kind, NodeKind::ScalarMultiplication { .. })
    }

    /// Whether the kind takes exactly two operands.
    pub fn is_binary(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Product | NodeKind::Contraction { .. } | NodeKind::LoopOverGemm(_) | NodeKind::Assign
        )
    }

    /// Computed sparsity pattern, `None` before propagation.
    pub fn eqspp(&self) -> Option<&Pattern> {
        self.eqspp.as_ref()
    }

    /// Sparsity pattern, failing if not yet propagated.
    pub fn try_eqspp(&self) -> Result<&Pattern, InvariantError> {
        self.eqspp.as_ref().ok_or_else(|| {
            InvariantError::new(
                InvariantErrorKind::MissingSparsity,
                format!("Sparsity pattern of {} has not been computed", self),
            )
        })
    }

    /// Overwrite the sparsity pattern.
    pub fn set_eqspp(&mut self, spp: Pattern) {
        self.eqspp = Some(spp);
    }

    /// Layout of the node's result; leaves report their tensor's layout.
    pub fn memory_layout(&self) -> Option<&DenseMemoryLayout> {
        match &self.kind {
            NodeKind::IndexedTensor { tensor } => Some(tensor.memory_layout()),
            _ => self.memory_layout.as_ref(),
        }
    }

    /// Memory layout, failing if not yet computed.
    pub fn try_memory_layout(&self) -> Result<&DenseMemoryLayout, InvariantError> {
        self.memory_layout().ok_or_else(|| {
            InvariantError::new(
                InvariantErrorKind::MissingLayout,
                format!("Memory layout of {} has not been computed", self),
            )
        })
    }

    /// Overwrite the memory layout.
    pub fn set_memory_layout(&mut self, layout: DenseMemoryLayout) {
        self.memory_layout = Some(layout);
    }

    /// Tensor to prefetch while this operation executes.
    pub fn prefetch(&self) -> Option<&TensorRef> {
        self.prefetch.as_ref()
    }

    /// Prefetch `tensor` while this node is computed.
    pub fn set_prefetch(&mut self, tensor: TensorRef) {
        self.prefetch = Some(tensor);
    }

    /// Whether the storage order of the result is dictated by a leaf.
    pub fn fixed_index_permutation(&self) -> bool {
        match &self.kind {
            NodeKind::IndexedTensor { .. } | NodeKind::Assign => true,
            NodeKind::ScalarMultiplication { .. } => {
                self.term().is_some_and(Node::fixed_index_permutation)
            }
            NodeKind::Add => self.children.iter().any(Node::fixed_index_permutation),
            NodeKind::Einsum
            | NodeKind::IndexSum { .. }
            | NodeKind::Product
            | NodeKind::Contraction { .. }
            | NodeKind::LoopOverGemm(_) => false,
        }
    }

    /// Reorder the free indices of this node to `order`.
    ///
    /// A computed pattern is transposed along (or dropped when
    /// `permute_eqspp` is false) and a computed layout is permuted.
    pub fn set_index_permutation(
        &mut self,
        order: &Indices,
        permute_eqspp: bool,
    ) -> Result<(), CompositionError> {
        let current = require_indices(self)?.clone();
        if current == *order {
            return Ok(());
        }
        let perm = current.permutation_to(order).ok_or_else(|| {
            composition(
                CompositionErrorKind::IndexMismatch,
                format!("Cannot permute indices {} of {} to {}", current, self, order),
            )
        })?;
        match &self.kind {
            NodeKind::IndexedTensor { .. } | NodeKind::Assign => {
                return Err(composition(
                    CompositionErrorKind::IndexMismatch,
                    format!("Index order of {} is fixed, cannot permute to {}", self, order),
                ));
            }
            NodeKind::ScalarMultiplication { .. } | NodeKind::Add => {
                for child in &mut self.children {
                    child.set_index_permutation(order, permute_eqspp)?;
                }
            }
            _ => {}
        }
        self.eqspp = match self.eqspp.take() {
            Some(spp) if permute_eqspp => Some(spp.transposed(&perm)),
            _ => None,
        };
        if let Some(layout) = self.memory_layout.take() {
            self.memory_layout = Some(layout.permuted(&perm));
        }
        self.indices = current.permuted(order);
        Ok(())
    }

    /// Visit the tree children-first.
    pub fn postorder<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        for child in &self.children {
            child.postorder(visit);
        }
        visit(self);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = match &self.indices {
            Some(i) => i.to_string(),
            None => "<not deduced>".to_string(),
        };
        match &self.kind {
            NodeKind::IndexedTensor { tensor } => write!(f, "{}[{}]", tensor.name(), indices),
            NodeKind::ScalarMultiplication { scalar } => {
                write!(f, "{}[{}]: {}", self.kind_name(), indices, scalar)
            }
            NodeKind::LoopOverGemm(params) => match self.operands() {
                Ok((a, b)) => write!(
                    f,
                    "{} [{}]: {}",
                    self.kind_name(),
                    indices,
                    params.describe(&self.indices, &a.indices, &b.indices)
                ),
                Err(_) => write!(f, "{}[{}]", self.kind_name(), indices),
            },
            _ => write!(f, "{}[{}]", self.kind_name(), indices),
        }
    }
}
