//! Sparsity-pattern engine.
//!
//! Expression nodes only rely on this surface: element-wise `add`,
//! einsum-style combination, index reduction, transposition and the
//! non-zero count of a [`Pattern`].

pub mod pattern;

pub use pattern::{add, einsum, reduce, Pattern};
