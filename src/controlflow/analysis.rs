//! Read-only queries over a lowered kernel.

use crate::ast::{Scalar, TensorRef};
use crate::controlflow::graph::{actions, ProgramPoint, Variable};
use crate::utils::errors::GroupingError;
use std::collections::{BTreeMap, BTreeSet};

/// Every variable referencing a user tensor, sorted by name.
pub fn sorted_globals(cfg: &[ProgramPoint<'_>]) -> Vec<Variable> {
    let mut globals: BTreeMap<String, Variable> = BTreeMap::new();
    for action in actions(cfg) {
        let vars = std::iter::once(&action.result).chain(action.variables());
        for var in vars.filter(|v| v.is_global()) {
            globals.entry(var.name.clone()).or_insert_with(|| var.clone());
        }
    }
    globals.into_values().collect()
}

/// Tensors to prefetch, sorted by name.
pub fn sorted_prefetch(cfg: &[ProgramPoint<'_>]) -> Vec<TensorRef> {
    let mut prefetch: BTreeMap<String, TensorRef> = BTreeMap::new();
    for action in actions(cfg) {
        if let Some(tensor) = action.term.as_expression().and_then(|e| e.node.prefetch()) {
            prefetch.entry(tensor.name()).or_insert_with(|| tensor.clone());
        }
    }
    prefetch.into_values().collect()
}

/// Named runtime scalars used by the kernel.
pub fn scalars(cfg: &[ProgramPoint<'_>]) -> BTreeSet<Scalar> {
    actions(cfg)
        .filter_map(|action| action.scalar.as_ref().and_then(|s| s.as_named()))
        .cloned()
        .collect()
}

/// One line per action: `  result (+)= [scalar * ]term`.
pub fn pretty_print(cfg: &[ProgramPoint<'_>]) -> String {
    actions(cfg)
        .map(|action| format!("  {}\n", action))
        .collect()
}

/// Group indices per tensor base name; `None` for ungrouped tensors.
///
/// A base name may be used either grouped or ungrouped within one kernel,
/// never both.
pub fn tensor_groups(
    cfg: &[ProgramPoint<'_>],
) -> Result<BTreeMap<String, Option<BTreeSet<usize>>>, GroupingError> {
    let mut groups: BTreeMap<String, Option<BTreeSet<usize>>> = BTreeMap::new();
    for var in sorted_globals(cfg) {
        let Some(tensor) = &var.tensor else { continue };
        let base = tensor.base_name().to_string();
        match (groups.get_mut(&base), tensor.group()) {
            (None, group) => {
                groups.insert(base, group.map(|g| BTreeSet::from([g])));
            }
            (Some(Some(set)), Some(g)) => {
                set.insert(g);
            }
            (Some(None), None) => {}
            (Some(_), _) => return Err(GroupingError { base_name: base }),
        }
    }
    Ok(groups)
}

/// Temporaries with the number of reals each one needs, in order of
/// first definition.
pub fn local_buffers(cfg: &[ProgramPoint<'_>]) -> Vec<(String, usize)> {
    let mut seen = BTreeSet::new();
    actions(cfg)
        .filter(|action| action.result.is_local())
        .filter(|action| seen.insert(action.result.name.clone()))
        .map(|action| (action.result.name.clone(), action.result.memory_layout.required_reals()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, ScalarValue, Tensor};
    use crate::controlflow::graph::{ProgramAction, Term};
    use crate::memory::DenseMemoryLayout;
    use crate::utils::errors::TensorForgeError;

    fn global(tensor: Tensor) -> Variable {
        Variable {
            name: tensor.name(),
            writable: false,
            memory_layout: tensor.memory_layout().clone(),
            eqspp: Some(tensor.spp().clone()),
            tensor: Some(tensor.into_ref()),
        }
    }

    fn temp(name: &str, n: usize) -> Variable {
        Variable::temporary(name.to_string(), DenseMemoryLayout::new(&[n]), None)
    }

    fn copy<'a>(result: Variable, from: Variable, add: bool) -> ProgramPoint<'a> {
        ProgramPoint::new(ProgramAction::new(result, Term::Variable(from), add))
    }

    #[test]
    fn test_globals_and_buffers() {
        let a = global(Tensor::new("A", &[4]).unwrap());
        let b = global(Tensor::new("B", &[4]).unwrap());
        let cfg = vec![
            copy(temp("_tmp0", 4), b.clone(), false),
            copy(temp("_tmp0", 4), a.clone(), true),
            copy(b.clone(), temp("_tmp0", 4), false),
            ProgramPoint::sentinel(),
        ];
        let names: Vec<String> = sorted_globals(&cfg).into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(local_buffers(&cfg), vec![("_tmp0".to_string(), 4)]);
        assert_eq!(pretty_print(&cfg), "  _tmp0 = B\n  _tmp0 += A\n  B = _tmp0\n");
    }

    #[test]
    fn test_scalars_collects_named_only() {
        let alpha = Scalar::new("alpha").unwrap();
        let a = global(Tensor::new("A", &[4]).unwrap());
        let cfg = vec![
            ProgramPoint::new(
                ProgramAction::new(temp("_tmp0", 4), Term::Variable(a.clone()), false)
                    .with_scalar(ScalarValue::Named(alpha.clone())),
            ),
            ProgramPoint::new(
                ProgramAction::new(temp("_tmp1", 4), Term::Variable(a), false)
                    .with_scalar(ScalarValue::Constant(3.0)),
            ),
            ProgramPoint::sentinel(),
        ];
        assert_eq!(scalars(&cfg), BTreeSet::from([alpha]));
    }

    #[test]
    fn test_tensor_groups() {
        let q0 = global(Tensor::new("Q", &[4]).unwrap().with_group(0));
        let q2 = global(Tensor::new("Q", &[4]).unwrap().with_group(2));
        let a = global(Tensor::new("A", &[4]).unwrap());
        let cfg = vec![copy(q0.clone(), a.clone(), false), copy(q2, a.clone(), true), ProgramPoint::sentinel()];
        let groups = tensor_groups(&cfg).unwrap();
        assert_eq!(groups["Q"], Some(BTreeSet::from([0, 2])));
        assert_eq!(groups["A"], None);

        let q = global(Tensor::new("Q", &[4]).unwrap());
        let cfg = vec![copy(q0, a.clone(), false), copy(q, a, false), ProgramPoint::sentinel()];
        let err = tensor_groups(&cfg).unwrap_err();
        assert_eq!(err.base_name, "Q");
        let err: TensorForgeError = err.into();
        assert!(err.to_string().contains("Q"));
    }

    #[test]
    fn test_prefetch_targets() {
        let a = Tensor::new("A", &[3]).unwrap().into_ref();
        let p = Tensor::new("P", &[3]).unwrap().into_ref();
        let mut node = Node::index_sum(Node::indexed(&a, "i").unwrap(), 'i').unwrap();
        node.set_prefetch(p);
        let cfg = vec![
            ProgramPoint::new(ProgramAction::new(
                temp("_tmp0", 1),
                Term::Expression(crate::controlflow::graph::Expression {
                    node: &node,
                    memory_layout: DenseMemoryLayout::new(&[]),
                    variables: vec![],
                }),
                false,
            )),
            ProgramPoint::sentinel(),
        ];
        let names: Vec<String> = sorted_prefetch(&cfg).iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["P"]);
    }
}
