//! Lowering of resolved statements into a CFG.
//!
//! One postorder walk per statement. Every operation node gets a fresh
//! temporary, `Add` accumulates its operands into one temporary and
//! `Assign` copies into its target. The pass keeps its temporary counter
//! and its set of writable tensors across statements, so one instance
//! lowers one kernel.

use crate::ast::{Node, NodeKind};
use crate::controlflow::graph::{Cfg, Expression, ProgramAction, ProgramPoint, Term, Variable};
use crate::memory::DenseMemoryLayout;
use crate::utils::errors::{InvariantError, InvariantErrorKind};
use log::{debug, trace};
use std::collections::HashSet;

/// Context for AST to control-flow lowering.
#[derive(Debug, Default)]
pub struct AstToControlFlow<'a> {
    /// Next temporary number
    tmp: usize,
    /// Emitted program points
    cfg: Vec<ProgramPoint<'a>>,
    /// Tensors assigned to so far
    writable: HashSet<String>,
    /// Use plain dense layouts instead of the computed ones
    simple_memory_layout: bool,
}

impl<'a> AstToControlFlow<'a> {
    /// Prefix of temporary names.
    pub const TEMPORARY_RESULT: &'static str = "_tmp";

    /// Fresh lowering context for one kernel.
    pub fn new(simple_memory_layout: bool) -> Self {
        Self { simple_memory_layout, ..Self::default() }
    }

    /// The emitted program, terminated by a sentinel.
    pub fn cfg(&self) -> Cfg<'a> {
        let mut cfg = self.cfg.clone();
        cfg.push(ProgramPoint::sentinel());
        cfg
    }

    /// Consume the context, returning the terminated program.
    pub fn into_cfg(mut self) -> Cfg<'a> {
        self.cfg.push(ProgramPoint::sentinel());
        self.cfg
    }

    /// Whether `name` has been assigned to by an earlier statement.
    pub fn is_writable(&self, name: &str) -> bool {
        self.writable.contains(name)
    }

    /// Lower `node`; returns the variable holding its value.
    pub fn lower(&mut self, node: &'a Node) -> Result<Variable, InvariantError> {
        let before = self.cfg.len();
        let result = self.visit(node)?;
        debug!("lowered {} into {} actions", node, self.cfg.len() - before);
        Ok(result)
    }

    fn visit(&mut self, node: &'a Node) -> Result<Variable, InvariantError> {
        match node.kind() {
            NodeKind::IndexedTensor { tensor } => {
                let name = tensor.name();
                Ok(Variable {
                    writable: self.writable.contains(&name),
                    name,
                    memory_layout: self.layout(node)?,
                    eqspp: node.eqspp().cloned(),
                    tensor: Some(tensor.clone()),
                })
            }
            NodeKind::Einsum => Err(InvariantError::new(
                InvariantErrorKind::UnresolvedEinsum,
                format!("Cannot lower unresolved {}", node),
            )),
            NodeKind::Add => self.visit_add(node),
            NodeKind::ScalarMultiplication { scalar } => {
                let term = node.term().ok_or_else(|| missing_operand(node))?;
                let variable = self.visit(term)?;
                let result = self.next_temporary(node)?;
                let action = ProgramAction::new(result.clone(), Term::Variable(variable), false)
                    .with_scalar(scalar.clone());
                self.add_action(action);
                Ok(result)
            }
            NodeKind::Assign => {
                let (lhs, rhs) = match node.children() {
                    [lhs, rhs] => (lhs, rhs),
                    _ => return Err(missing_operand(node)),
                };
                if let Some(name) = lhs.name() {
                    self.writable.insert(name);
                }
                let target = self.visit(lhs)?;
                let value = self.visit(rhs)?;
                self.add_action(ProgramAction::new(target.clone(), Term::Variable(value), false));
                Ok(target)
            }
            NodeKind::IndexSum { .. }
            | NodeKind::Product
            | NodeKind::Contraction { .. }
            | NodeKind::LoopOverGemm(_) => {
                let variables = node
                    .children()
                    .iter()
                    .map(|child| self.visit(child))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = self.next_temporary(node)?;
                let term = Term::Expression(Expression {
                    node,
                    memory_layout: self.layout(node)?,
                    variables,
                });
                self.add_action(ProgramAction::new(result.clone(), term, false));
                Ok(result)
            }
        }
    }

    fn visit_add(&mut self, node: &'a Node) -> Result<Variable, InvariantError> {
        let mut variables = node
            .children()
            .iter()
            .map(|child| self.visit(child))
            .collect::<Result<Vec<_>, _>>()?;
        if variables.is_empty() {
            return Err(missing_operand(node));
        }
        // stable: writable operands first, then globals
        variables.sort_by_key(|v| u8::from(!v.writable) + u8::from(!v.is_global()));

        let tmp = self.next_temporary(node)?;
        let mut add = false;
        for var in variables {
            self.add_action(ProgramAction::new(tmp.clone(), Term::Variable(var), add));
            add = true;
        }
        Ok(tmp)
    }

    fn layout(&self, node: &Node) -> Result<DenseMemoryLayout, InvariantError> {
        if self.simple_memory_layout {
            Ok(DenseMemoryLayout::new(node.shape()?))
        } else {
            node.try_memory_layout().cloned()
        }
    }

    fn add_action(&mut self, action: ProgramAction<'a>) {
        trace!("  {}", action);
        self.cfg.push(ProgramPoint::new(action));
    }

    fn next_temporary(&mut self, node: &Node) -> Result<Variable, InvariantError> {
        let name = format!("{}{}", Self::TEMPORARY_RESULT, self.tmp);
        self.tmp += 1;
        Ok(Variable::temporary(name, self.layout(node)?, node.eqspp().cloned()))
    }
}

fn missing_operand(node: &Node) -> InvariantError {
    InvariantError::new(
        InvariantErrorKind::MissingIndices,
        format!("{} is missing an operand", node),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{compute_memory_layouts, propagate_sparsity, resolve, Tensor};
    use crate::controlflow::graph::actions;
    use crate::CompilerConfig;

    fn leaf(name: &str, idx: &str) -> Node {
        let shape = vec![3; idx.len()];
        Node::indexed(&Tensor::new(name, &shape).unwrap().into_ref(), idx).unwrap()
    }

    fn prepared(stmt: Node) -> Node {
        let mut stmt = resolve(stmt).unwrap();
        propagate_sparsity(&mut stmt).unwrap();
        compute_memory_layouts(&mut stmt, &CompilerConfig::default()).unwrap();
        stmt
    }

    #[test]
    fn test_scaled_copy() {
        let stmt = prepared(leaf("B", "ij").assign(leaf("A", "ij").times(2.0).unwrap()).unwrap());
        let mut lower = AstToControlFlow::new(false);
        let target = lower.lower(&stmt).unwrap();
        assert_eq!(target.name, "B");
        assert!(target.writable);

        let cfg = lower.cfg();
        assert!(cfg.last().unwrap().action.is_none());
        let lines: Vec<String> = actions(&cfg).map(|a| a.to_string()).collect();
        assert_eq!(lines, vec!["_tmp0 = 2.0 * A", "B = _tmp0"]);
    }

    #[test]
    fn test_writable_across_statements() {
        let first = prepared(leaf("B", "ij").assign(leaf("A", "ij").times(2.0).unwrap()).unwrap());
        let second = prepared(
            leaf("C", "ij")
                .assign(leaf("D", "ij").plus(leaf("B", "ij")).unwrap())
                .unwrap(),
        );
        let mut lower = AstToControlFlow::new(false);
        lower.lower(&first).unwrap();
        lower.lower(&second).unwrap();
        let lines: Vec<String> = actions(&lower.cfg()).map(|a| a.to_string()).collect();
        // B is writable after the first statement, so it leads the sum
        assert_eq!(&lines[2..], &["_tmp1 = B", "_tmp1 += D", "C = _tmp1"]);
    }

    #[test]
    fn test_unresolved_tree_rejected() {
        let stmt = leaf("C", "ij").assign(leaf("A", "ik").times(leaf("B", "kj")).unwrap()).unwrap();
        let err = AstToControlFlow::new(true).lower(&stmt).unwrap_err();
        assert_eq!(err.kind, InvariantErrorKind::UnresolvedEinsum);
    }
}
