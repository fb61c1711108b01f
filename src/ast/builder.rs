//! Expression DSL with algebraic folding.
//!
//! ```ignore
//! let stmt = c.assign(a.times(b)?.plus(d)?)?;
//! ```
//!
//! Multiplication folds into one n-ary `Einsum` and addition into one n-ary
//! `Add`, regardless of association order. Scalars wrap the expression in a
//! single `ScalarMultiplication`.

use crate::ast::node::{Node, NodeKind};
use crate::ast::tensor::{Scalar, ScalarValue};
use crate::utils::errors::{CompositionError, CompositionErrorKind};

/// Right-hand operand of a DSL operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A tensor expression
    Expr(Node),
    /// A constant or named scalar factor
    Scalar(ScalarValue),
}

impl From<Node> for Operand {
    fn from(node: Node) -> Self {
        Operand::Expr(node)
    }
}

impl From<f64> for Operand {
    fn from(c: f64) -> Self {
        Operand::Scalar(ScalarValue::Constant(c))
    }
}

impl From<Scalar> for Operand {
    fn from(s: Scalar) -> Self {
        Operand::Scalar(ScalarValue::Named(s))
    }
}

impl From<ScalarValue> for Operand {
    fn from(s: ScalarValue) -> Self {
        Operand::Scalar(s)
    }
}

#[derive(Clone, Copy)]
enum Fold {
    Einsum,
    Add,
}

impl Fold {
    fn matches(self, node: &Node) -> bool {
        matches!(
            (self, node.kind()),
            (Fold::Einsum, NodeKind::Einsum) | (Fold::Add, NodeKind::Add)
        )
    }

    fn build(self, children: Vec<Node>) -> Node {
        match self {
            Fold::Einsum => Node::einsum(children),
            Fold::Add => Node::addition(children),
        }
    }
}

fn nested_scalar() -> CompositionError {
    CompositionError::new(
        CompositionErrorKind::NestedScalarMultiplication,
        "Multiple multiplications with scalars are not allowed. Merge them into a single one.",
    )
}

fn check_not_scaled(node: &Node) -> Result<(), CompositionError> {
    if node.is_scalar_multiplication() {
        Err(nested_scalar())
    } else {
        Ok(())
    }
}

impl Node {
    /// Combine under an associative n-ary kind, flattening same-kind operands.
    fn fold(mut self, mut other: Node, fold: Fold) -> Node {
        if fold.matches(&self) {
            if fold.matches(&other) {
                self.children.append(&mut other.children);
            } else {
                self.children.push(other);
            }
            self
        } else if fold.matches(&other) {
            other.children.insert(0, self);
            other
        } else {
            fold.build(vec![self, other])
        }
    }

    /// Replace the term of a scalar multiplication with `f(term)`.
    fn map_term(
        mut self,
        f: impl FnOnce(Node) -> Result<Node, CompositionError>,
    ) -> Result<Node, CompositionError> {
        let term = self.children.pop().ok_or_else(|| {
            CompositionError::new(CompositionErrorKind::BinaryArity, "Scalar multiplication without term")
        })?;
        let term = f(term)?;
        self.indices = term.indices.clone();
        self.children = vec![term];
        Ok(self)
    }

    /// `self * other`.
    ///
    /// A scalar operand wraps `self` in a scalar multiplication. Multiplying
    /// into an existing scalar multiplication multiplies its term instead,
    /// so a product carries at most one scalar factor.
    pub fn times(self, other: impl Into<Operand>) -> Result<Node, CompositionError> {
        match other.into() {
            Operand::Scalar(scalar) => Node::scalar_multiplication(scalar, self),
            Operand::Expr(other) => {
                if self.is_scalar_multiplication() {
                    check_not_scaled(&other)?;
                    self.map_term(|term| term.times(other))
                } else if other.is_scalar_multiplication() {
                    other.map_term(|term| self.times(term))
                } else {
                    Ok(self.fold(other, Fold::Einsum))
                }
            }
        }
    }

    /// `self + other`; only expressions can be added.
    pub fn plus(self, other: impl Into<Operand>) -> Result<Node, CompositionError> {
        match other.into() {
            Operand::Expr(other) => Ok(self.fold(other, Fold::Add)),
            Operand::Scalar(scalar) => Err(CompositionError::new(
                CompositionErrorKind::NotAnExpression,
                format!("Unsupported operation: Cannot add {} to {}.", scalar, self),
            )),
        }
    }

    /// `self - other`, i.e. `self + (-other)`.
    pub fn minus(self, other: impl Into<Operand>) -> Result<Node, CompositionError> {
        match other.into() {
            Operand::Expr(other) => self.plus(other.negate()?),
            Operand::Scalar(scalar) => Err(CompositionError::new(
                CompositionErrorKind::NotAnExpression,
                format!("Unsupported operation: Cannot subtract {} from {}.", scalar, self),
            )),
        }
    }

    /// `-self`, a scalar multiplication by -1.
    pub fn negate(self) -> Result<Node, CompositionError> {
        Node::scalar_multiplication(-1.0, self)
    }

    /// `self <= rhs`: assign `rhs` into the indexed tensor `self`.
    ///
    /// A bare indexed tensor on the right is a copy and gets wrapped in an
    /// `Einsum` so that the right side is always a computation.
    pub fn assign(self, rhs: impl Into<Operand>) -> Result<Node, CompositionError> {
        let rhs = match rhs.into() {
            Operand::Expr(rhs) => rhs,
            Operand::Scalar(scalar) => {
                return Err(CompositionError::new(
                    CompositionErrorKind::NotAnExpression,
                    format!("Cannot assign {} to {}: not an expression", scalar, self),
                ))
            }
        };
        let rhs = if rhs.is_indexed_tensor() && rhs != self {
            Node::einsum(vec![rhs])
        } else {
            rhs
        };
        Node::assignment(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::tensor::{Tensor, TensorRef};

    fn leaf(name: &str, idx: &str) -> Node {
        let shape = vec![3; idx.len()];
        let t: TensorRef = Tensor::new(name, &shape).unwrap().into_ref();
        Node::indexed(&t, idx).unwrap()
    }

    #[test]
    fn test_multiplication_flattens() {
        let abc = leaf("A", "ij").times(leaf("B", "jk")).unwrap().times(leaf("C", "kl")).unwrap();
        assert!(matches!(abc.kind(), NodeKind::Einsum));
        assert_eq!(abc.len(), 3);

        let bc = leaf("B", "jk").times(leaf("C", "kl")).unwrap();
        let abc = leaf("A", "ij").times(bc).unwrap();
        assert_eq!(abc.len(), 3);
        assert_eq!(abc.children()[0].name().as_deref(), Some("A"));
    }

    #[test]
    fn test_scalar_moves_outward() {
        let scaled = leaf("A", "ij").times(2.0).unwrap();
        let prod = scaled.times(leaf("B", "jk")).unwrap();
        assert!(prod.is_scalar_multiplication());
        assert!(matches!(prod.term().unwrap().kind(), NodeKind::Einsum));

        let prod = leaf("B", "jk").times(leaf("A", "ij").times(2.0).unwrap()).unwrap();
        assert!(prod.is_scalar_multiplication());
        assert_eq!(prod.term().unwrap().children()[0].name().as_deref(), Some("B"));
    }

    #[test]
    fn test_nested_scalars_rejected() {
        let err = leaf("X", "i").times(3.0).unwrap().times(2.0).unwrap_err();
        assert_eq!(err.kind, CompositionErrorKind::NestedScalarMultiplication);

        let a = leaf("A", "i").times(2.0).unwrap();
        let b = leaf("B", "i").times(3.0).unwrap();
        assert!(a.times(b).is_err());
        assert!(leaf("A", "i").negate().unwrap().negate().is_err());
    }

    #[test]
    fn test_subtraction_negates() {
        let diff = leaf("A", "i").minus(leaf("B", "i")).unwrap();
        assert!(matches!(diff.kind(), NodeKind::Add));
        assert_eq!(diff.children()[1].scalar(), Some(&ScalarValue::Constant(-1.0)));
        assert!(leaf("A", "i").plus(1.0).is_err());
    }

    #[test]
    fn test_assign_wraps_copy() {
        let stmt = leaf("C", "ij").assign(leaf("A", "ij")).unwrap();
        assert!(matches!(stmt.right().unwrap().kind(), NodeKind::Einsum));
        let err = leaf("C", "ij").assign(2.0).unwrap_err();
        assert_eq!(err.kind, CompositionErrorKind::NotAnExpression);
        let sum = leaf("A", "i").plus(leaf("B", "i")).unwrap();
        let err = sum.assign(leaf("C", "i")).unwrap_err();
        assert_eq!(err.kind, CompositionErrorKind::InvalidAssignTarget);
    }
}
