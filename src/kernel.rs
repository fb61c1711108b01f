//! Kernels: named lists of statements compiled together.

use crate::ast::tensor::check_name;
use crate::ast::{Node, NodeKind};
use crate::controlflow::{tensor_groups, AstToControlFlow, Cfg, CfgTransform, SubstituteBackward};
use crate::transform::Pipeline;
use crate::utils::errors::{CompositionError, CompositionErrorKind};
use crate::CompilerConfig;
use anyhow::{Context, Result};
use log::{debug, info};

/// Run the preparation pipeline on one `Assign` statement.
pub fn prepare(statement: Node, config: &CompilerConfig) -> Result<Node> {
    if !matches!(statement.kind(), NodeKind::Assign) {
        return Err(CompositionError::new(
            CompositionErrorKind::InvalidAssignTarget,
            format!("Kernel statements must be assignments, got {}", statement),
        )
        .into());
    }
    let description = statement.to_string();
    let mut statement = statement;
    let report = Pipeline::new(config)
        .run(&mut statement)
        .with_context(|| format!("Failed to prepare statement {}", description))?;
    debug!("prepared {} with {:?}", statement, report.applied_transforms);
    Ok(statement)
}

/// A compiled kernel.
#[derive(Debug, Clone)]
pub struct Kernel {
    name: String,
    statements: Vec<Node>,
    config: CompilerConfig,
}

impl Kernel {
    /// Prepare every statement of the kernel.
    pub fn new(name: &str, statements: Vec<Node>, config: CompilerConfig) -> Result<Self> {
        check_name(name).with_context(|| format!("Invalid kernel name {}", name))?;
        let statements = statements
            .into_iter()
            .enumerate()
            .map(|(pos, stmt)| {
                prepare(stmt, &config).with_context(|| format!("In statement {} of kernel {}", pos, name))
            })
            .collect::<Result<Vec<_>>>()?;
        info!("kernel {}: {} statements", name, statements.len());
        Ok(Self { name: name.to_string(), statements, config })
    }

    /// Kernel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prepared statements in source order.
    pub fn statements(&self) -> &[Node] {
        &self.statements
    }

    /// Configuration the kernel was prepared with.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Lower all statements into one program.
    ///
    /// Statements share one lowering pass, so a tensor assigned by an earlier
    /// statement counts as writable in later ones.
    pub fn cfg(&self) -> Result<Cfg<'_>> {
        let mut lowering = AstToControlFlow::new(self.config.simple_memory_layout);
        for (pos, stmt) in self.statements.iter().enumerate() {
            lowering
                .lower(stmt)
                .with_context(|| format!("Failed to lower statement {} of kernel {}", pos, self.name))?;
        }
        let mut cfg = lowering.into_cfg();
        if self.config.substitute_backward {
            let pass = SubstituteBackward;
            cfg = pass.transform(cfg);
            debug!("{}: {} program points", pass.name(), cfg.len());
        }
        tensor_groups(&cfg).with_context(|| format!("Invalid tensor groups in kernel {}", self.name))?;
        Ok(cfg)
    }

    /// Non-zero FLOPs of all statements.
    pub fn non_zero_flops(&self) -> Result<u64> {
        let mut total = 0;
        for stmt in &self.statements {
            total += stmt.total_non_zero_flops()?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tensor;
    use crate::controlflow::actions;

    fn leaf(name: &str, idx: &str, shape: &[usize]) -> Node {
        Node::indexed(&Tensor::new(name, shape).unwrap().into_ref(), idx).unwrap()
    }

    fn matmul() -> Node {
        leaf("C", "ij", &[4, 5])
            .assign(leaf("A", "ik", &[4, 3]).times(leaf("B", "kj", &[3, 5])).unwrap())
            .unwrap()
    }

    #[test]
    fn test_kernel_with_copy_elimination() {
        let kernel = Kernel::new("matmul", vec![matmul()], CompilerConfig::default()).unwrap();
        let cfg = kernel.cfg().unwrap();
        let lines: Vec<String> = actions(&cfg).map(|a| a.to_string()).collect();
        assert_eq!(lines, vec!["C = LoopOverGEMM(A, B)"]);
        assert_eq!(kernel.non_zero_flops().unwrap(), 2 * 60 - 20);
    }

    #[test]
    fn test_kernel_without_copy_elimination() {
        let config = CompilerConfig::default().with_substitute_backward(false);
        let kernel = Kernel::new("matmul", vec![matmul()], config).unwrap();
        assert_eq!(actions(&kernel.cfg().unwrap()).count(), 2);
    }

    #[test]
    fn test_rejects_bare_expressions_and_bad_names() {
        let expr = leaf("A", "ik", &[4, 3]).times(leaf("B", "kj", &[3, 5])).unwrap();
        assert!(Kernel::new("k", vec![expr], CompilerConfig::default()).is_err());
        assert!(Kernel::new("0k", vec![matmul()], CompilerConfig::default()).is_err());
    }

    #[test]
    fn test_mixed_groups_rejected() {
        let q = Tensor::new("Q", &[3]).unwrap().into_ref();
        let q1 = Tensor::new("Q", &[3]).unwrap().with_group(1).into_ref();
        let a = Tensor::new("A", &[3]).unwrap().into_ref();
        let stmts = vec![
            Node::indexed(&q, "i").unwrap().assign(Node::indexed(&a, "i").unwrap().times(2.0).unwrap()).unwrap(),
            Node::indexed(&q1, "i").unwrap().assign(Node::indexed(&a, "i").unwrap().times(3.0).unwrap()).unwrap(),
        ];
        let kernel = Kernel::new("grouped", stmts, CompilerConfig::default()).unwrap();
        let err = kernel.cfg().unwrap_err();
        assert!(format!("{:#}", err).contains("Q"));
    }
}
