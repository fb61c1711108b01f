//! Tree transformations applied to resolved statements.
//!
//! Each pass rewrites one statement in place. [`pipeline::Pipeline`] runs
//! them in the order the later passes depend on: indices first, then
//! sparsity, then layouts, then the GEMM mapping that needs all three.

pub mod gemm;
pub mod pipeline;

pub use gemm::{evaluate, map_contractions, GemmCandidates, GemmMapping, GemmSelection, NaturalPartition};
pub use pipeline::Pipeline;

use crate::ast::{compute_memory_layouts, propagate_sparsity, resolve, Node};
use crate::CompilerConfig;
use anyhow::Result;

/// Transformation pass over a statement.
pub trait Transform {
    /// Apply the transformation; returns whether the tree changed.
    fn apply(&self, statement: &mut Node) -> Result<bool>;

    /// Get transformation name.
    fn name(&self) -> &str;
}

/// Replace `Einsum` placeholders and fix all free indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveIndices;

impl Transform for ResolveIndices {
    fn apply(&self, statement: &mut Node) -> Result<bool> {
        let taken = std::mem::replace(statement, Node::einsum(Vec::new()));
        let before = taken.clone();
        *statement = resolve(taken)?;
        Ok(*statement != before)
    }

    fn name(&self) -> &str {
        "resolve-indices"
    }
}

/// Compute the sparsity pattern of every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagateSparsity;

impl Transform for PropagateSparsity {
    fn apply(&self, statement: &mut Node) -> Result<bool> {
        propagate_sparsity(statement)?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "propagate-sparsity"
    }
}

/// Compute memory layouts of intermediate results.
#[derive(Debug, Clone)]
pub struct ComputeLayouts {
    config: CompilerConfig,
}

impl ComputeLayouts {
    /// Layout pass using the alignment settings of `config`.
    pub fn new(config: &CompilerConfig) -> Self {
        Self { config: config.clone() }
    }
}

impl Transform for ComputeLayouts {
    fn apply(&self, statement: &mut Node) -> Result<bool> {
        compute_memory_layouts(statement, &self.config)?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "compute-layouts"
    }
}
