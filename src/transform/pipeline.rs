//! Statement preparation pipeline.
//!
//! Runs the tree passes in dependency order and records what was applied.

use crate::ast::Node;
use crate::transform::{ComputeLayouts, GemmSelection, PropagateSparsity, ResolveIndices, Transform};
use crate::CompilerConfig;
use anyhow::{Context, Result};
use log::debug;

/// Result of running the pipeline on one statement.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Transformations that were applied
    pub applied_transforms: Vec<String>,
    /// Transformations that changed the statement
    pub changed_by: Vec<String>,
}

/// Preparation pipeline.
pub struct Pipeline {
    passes: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration.
    pub fn new(config: &CompilerConfig) -> Self {
        let mut passes: Vec<Box<dyn Transform>> = vec![
            Box::new(ResolveIndices),
            Box::new(PropagateSparsity),
            Box::new(ComputeLayouts::new(config)),
        ];
        if config.enable_gemm_mapping {
            passes.push(Box::new(GemmSelection::default()));
        }
        Self { passes }
    }

    /// Create a pipeline with default configuration.
    pub fn default_pipeline() -> Self {
        Self::new(&CompilerConfig::default())
    }

    /// Names of the passes in execution order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass on `statement`.
    pub fn run(&self, statement: &mut Node) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        for pass in &self.passes {
            let changed = pass
                .apply(statement)
                .with_context(|| format!("pass {} failed", pass.name()))?;
            debug!("{}: changed={}", pass.name(), changed);
            report.applied_transforms.push(pass.name().to_string());
            if changed {
                report.changed_by.push(pass.name().to_string());
            }
        }
        Ok(report)
    }
}
