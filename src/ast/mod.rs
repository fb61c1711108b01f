//! Expression trees for tensor algebra.
//!
//! Statements are composed with the DSL in [`builder`], resolved into
//! binary operations by [`resolve`] and annotated bottom-up by
//! [`propagate`].

pub mod tensor;
pub mod node;
pub mod gemm;
pub mod builder;
pub mod resolve;
pub mod propagate;

pub use tensor::{Scalar, ScalarValue, Tensor, TensorRef};
pub use node::{Node, NodeKind};
pub use gemm::GemmParams;
pub use builder::Operand;
pub use resolve::resolve;
pub use propagate::{compute_memory_layouts, propagate_sparsity};
