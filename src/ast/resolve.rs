//! Index resolution.
//!
//! Replaces every `Einsum` placeholder with a tree of `IndexSum`, `Product`
//! and `Contraction` nodes and fixes the free indices of every node. Target
//! indices flow top-down from `Assign` through `Add` and
//! `ScalarMultiplication`; without a target the Einstein convention applies
//! and indices that occur exactly once stay free.

use crate::algebra::{Index, Indices};
use crate::ast::node::{Node, NodeKind};
use crate::utils::errors::{CompositionError, CompositionErrorKind};
use log::{debug, trace};

fn mismatch(message: String) -> CompositionError {
    CompositionError::new(CompositionErrorKind::IndexMismatch, message)
}

fn indices_of(node: &Node) -> Result<&Indices, CompositionError> {
    node.indices()
        .ok_or_else(|| mismatch(format!("Indices of {} could not be deduced", node)))
}

/// Resolve a statement or expression.
pub fn resolve(statement: Node) -> Result<Node, CompositionError> {
    let resolved = resolve_node(statement, None)?;
    debug!("resolved {}", resolved);
    Ok(resolved)
}

fn resolve_node(mut node: Node, target: Option<&Indices>) -> Result<Node, CompositionError> {
    let mut node = match node.kind {
        NodeKind::Assign => resolve_assign(node)?,
        NodeKind::Einsum => resolve_einsum(std::mem::take(&mut node.children), target)?,
        NodeKind::Add => resolve_add(node, target)?,
        NodeKind::ScalarMultiplication { .. } => {
            let term = node.children.pop().ok_or_else(|| {
                mismatch("Scalar multiplication without term".to_string())
            })?;
            let term = resolve_node(term, target)?;
            node.indices = term.indices.clone();
            node.children = vec![term];
            node
        }
        NodeKind::IndexedTensor { .. } => node,
        NodeKind::IndexSum { .. }
        | NodeKind::Product
        | NodeKind::Contraction { .. }
        | NodeKind::LoopOverGemm(_) => {
            node.children = std::mem::take(&mut node.children)
                .into_iter()
                .map(|child| {
                    let own = child.indices.clone();
                    resolve_node(child, own.as_ref())
                })
                .collect::<Result<_, _>>()?;
            node
        }
    };
    if let Some(target) = target {
        permute_to(&mut node, target)?;
    }
    Ok(node)
}

fn permute_to(node: &mut Node, target: &Indices) -> Result<(), CompositionError> {
    let current = indices_of(node)?;
    if !current.same_names(target) {
        return Err(mismatch(format!(
            "{} has free indices {}, but {} are required",
            node, current, target
        )));
    }
    current.check_compatible(target)?;
    node.set_index_permutation(target, true)
}

fn resolve_assign(mut node: Node) -> Result<Node, CompositionError> {
    let mut children = std::mem::take(&mut node.children);
    let (lhs, rhs) = match (children.pop(), children.pop(), children.is_empty()) {
        (Some(rhs), Some(lhs), true) => (lhs, rhs),
        _ => {
            return Err(CompositionError::new(
                CompositionErrorKind::BinaryArity,
                "Assign node must have exactly 2 children",
            ))
        }
    };
    let target = lhs.indices.clone();
    let rhs = resolve_node(rhs, target.as_ref()).map_err(|e| {
        CompositionError::new(e.kind, format!("{} (assigning to {})", e.message, lhs))
    })?;
    node.children = vec![lhs, rhs];
    Ok(node)
}

fn resolve_add(mut node: Node, target: Option<&Indices>) -> Result<Node, CompositionError> {
    // without a target, a child with fixed storage order dictates the order
    let mut order = target.cloned().or_else(|| {
        node.children
            .iter()
            .find(|c| c.fixed_index_permutation())
            .and_then(|c| c.indices.clone())
    });
    let mut children = Vec::with_capacity(node.children.len());
    for child in std::mem::take(&mut node.children) {
        let child = resolve_node(child, order.as_ref())?;
        if order.is_none() {
            order = child.indices.clone();
        }
        children.push(child);
    }
    node.children = children;
    node.indices = order;
    Ok(node)
}

fn occurrences(operands: &[Node], index: Index) -> usize {
    operands
        .iter()
        .filter(|op| op.indices().is_some_and(|i| i.contains(index)))
        .count()
}

fn resolve_einsum(children: Vec<Node>, target: Option<&Indices>) -> Result<Node, CompositionError> {
    let operands = children
        .into_iter()
        .map(|c| resolve_node(c, None))
        .collect::<Result<Vec<_>, _>>()?;
    if operands.is_empty() {
        return Err(mismatch("Empty product".to_string()));
    }

    let mut all = Indices::empty();
    for op in &operands {
        let idx = indices_of(op)?;
        all.check_compatible(idx)?;
        all = all.merged(idx);
    }
    let keep = match target {
        Some(t) => {
            if let Some(missing) = t.iter().find(|&idx| !all.contains(idx)) {
                return Err(mismatch(format!(
                    "Target index {} of {} does not occur in the product over {}",
                    missing, t, all
                )));
            }
            all.check_compatible(t)?;
            t.clone()
        }
        None => {
            let free: Vec<Index> = all.iter().filter(|&idx| occurrences(&operands, idx) == 1).collect();
            all.extract(&free).unwrap_or_default()
        }
    };
    trace!("einsum over {} keeps {}", all, keep);

    // indices private to one operand are summed before any product is formed
    let counts: Vec<(Index, usize)> = all.iter().map(|idx| (idx, occurrences(&operands, idx))).collect();
    let operands = operands
        .into_iter()
        .map(|mut op| {
            let private: Vec<Index> = indices_of(&op)?
                .iter()
                .filter(|&idx| !keep.contains(idx) && counts.iter().any(|&(c, n)| c == idx && n == 1))
                .collect();
            for idx in private {
                op = Node::index_sum(op, idx)?;
            }
            Ok(op)
        })
        .collect::<Result<Vec<_>, CompositionError>>()?;

    // later[i]: indices still needed by operands after the i-th right operand
    let mut later = vec![Indices::empty(); operands.len()];
    for i in (1..operands.len().saturating_sub(1)).rev() {
        later[i - 1] = later[i].merged(indices_of(&operands[i + 1])?);
    }
    let mut iter = operands.into_iter();
    let mut acc = iter.next().ok_or_else(|| mismatch("Empty product".to_string()))?;
    for (pos, right) in iter.enumerate() {
        let li = indices_of(&acc)?.clone();
        let ri = indices_of(&right)?.clone();
        let needed = keep.merged(&later[pos]);
        let sum = li.intersection(&ri).difference(&needed);
        acc = if sum.is_empty() {
            Node::product(acc, right)?
        } else {
            let natural = li.difference(&sum).merged(&ri.difference(&sum));
            Node::contraction(&natural, acc, right, &sum)?
        };
        trace!("folded into {}", acc);
    }
    permute_to(&mut acc, &keep)?;
    Ok(acc)
}
