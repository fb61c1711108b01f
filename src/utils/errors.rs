//! Error types for the tensor compiler.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the compiler.
#[derive(Error, Debug)]
pub enum TensorForgeError {
    /// Invalid expression composition (raised while building a tree)
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    /// Broken internal invariant (a defect in a pass, not bad input)
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    /// Grouped and ungrouped tensors mixed under one base name
    #[error("Grouping error: {0}")]
    Grouping(#[from] GroupingError),
}

/// Error raised while composing an expression tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct CompositionError {
    /// The error message
    pub message: String,
    /// The kind of composition error
    pub kind: CompositionErrorKind,
}

impl CompositionError {
    /// Create a new composition error.
    pub fn new(kind: CompositionErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

/// What went wrong while composing an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionErrorKind {
    /// A scalar multiplication wrapped directly in another one
    NestedScalarMultiplication,
    /// Shared index names with different extents
    ShapeMismatch,
    /// Left operand of an assignment is not an indexed tensor
    InvalidAssignTarget,
    /// Operand carries no expression (e.g. adding a bare scalar)
    NotAnExpression,
    /// Unknown, duplicated or incompatible index names
    IndexMismatch,
    /// Tensor or scalar name is not an identifier
    InvalidName,
    /// Binary operation built with the wrong number of children
    BinaryArity,
}

/// Internal invariant violation.
///
/// These never stem from user input; they signal that a pass ran out of order
/// or left a placeholder behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct InvariantError {
    /// The error message
    pub message: String,
    /// The kind of invariant violation
    pub kind: InvariantErrorKind,
}

impl InvariantError {
    /// Create a new invariant error.
    pub fn new(kind: InvariantErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

/// Which internal invariant was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantErrorKind {
    /// An `Einsum` placeholder survived index resolution
    UnresolvedEinsum,
    /// Free indices were queried before being deduced
    MissingIndices,
    /// Sparsity pattern was queried before propagation
    MissingSparsity,
    /// Memory layout was queried before layout computation
    MissingLayout,
    /// Sparsity operands disagree with an einsum descriptor or with each other
    PatternMismatch,
}

/// Grouped and single tensors appear under the same base name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct GroupingError {
    /// The conflicting base name
    pub base_name: String,
}

impl fmt::Display for GroupingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grouped tensors and single tensors named {} may not appear mixed in a kernel",
            self.base_name
        )
    }
}

/// Result type using TensorForgeError.
pub type ForgeResult<T> = Result<T, TensorForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompositionError::new(
            CompositionErrorKind::NestedScalarMultiplication,
            "Multiple multiplications with scalars are not allowed",
        );
        let s = format!("{}", err);
        assert!(s.contains("Multiple multiplications"));
        assert!(s.contains("NestedScalarMultiplication"));
    }

    #[test]
    fn test_grouping_error_names_base() {
        let err: TensorForgeError = GroupingError { base_name: "Q".to_string() }.into();
        assert!(err.to_string().contains(" Q "));
    }
}
