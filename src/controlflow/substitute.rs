//! CFG transformations.

use crate::controlflow::graph::{Cfg, ProgramAction, ProgramPoint, Variable};
use log::debug;

/// Transformation over a lowered kernel.
pub trait CfgTransform {
    /// Rewrite `cfg`; the end sentinel is preserved.
    fn transform<'a>(&self, cfg: Cfg<'a>) -> Cfg<'a>;

    /// Get transformation name.
    fn name(&self) -> &str;
}

/// Removes copies `R = v` of temporaries that are read only by that copy,
/// by writing `v`'s definitions into `R` directly.
///
/// A scaled copy `R = s * v` is removed only if `v` has a single
/// non-accumulating, unscaled definition, which then takes the scalar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstituteBackward;

fn writes(action: &ProgramAction<'_>, name: &str) -> bool {
    action.result.name == name
}

fn touches(action: &ProgramAction<'_>, name: &str) -> bool {
    writes(action, name) || action.reads(name)
}

impl SubstituteBackward {
    /// Positions of `v`'s definitions if the copy at `pos` can be removed.
    fn substitutable(actions: &[ProgramAction<'_>], pos: usize) -> Option<Vec<usize>> {
        let copy = &actions[pos];
        if copy.add {
            return None;
        }
        let v = copy.term.as_variable()?;
        let target = &copy.result;
        if v.is_global() || v.memory_layout != target.memory_layout {
            return None;
        }
        if actions[pos + 1..].iter().any(|a| touches(a, &v.name)) {
            return None;
        }
        let defs: Vec<usize> = (0..pos).filter(|&j| writes(&actions[j], &v.name)).collect();
        let first = *defs.first()?;
        let span = &actions[first..pos];
        if span.iter().any(|a| a.reads(&v.name) || touches(a, &target.name)) {
            return None;
        }
        if copy.scalar.is_some() {
            let sole = defs.len() == 1 && !actions[first].add && actions[first].scalar.is_none();
            if !sole {
                return None;
            }
        }
        Some(defs)
    }
}

impl CfgTransform for SubstituteBackward {
    fn transform<'a>(&self, cfg: Cfg<'a>) -> Cfg<'a> {
        let mut actions: Vec<ProgramAction<'a>> = cfg.into_iter().filter_map(|pp| pp.action).collect();
        let mut pos = actions.len();
        while pos > 0 {
            pos -= 1;
            let Some(defs) = Self::substitutable(&actions, pos) else {
                continue;
            };
            let copy = actions.remove(pos);
            let target: Variable = copy.result;
            for &j in &defs {
                actions[j].result = target.clone();
            }
            if let Some(scalar) = copy.scalar {
                actions[defs[0]].scalar = Some(scalar);
            }
            debug!("substituted {} into {} definitions", target, defs.len());
        }
        let mut cfg: Cfg<'a> = actions.into_iter().map(ProgramPoint::new).collect();
        cfg.push(ProgramPoint::sentinel());
        cfg
    }

    fn name(&self) -> &str {
        "substitute-backward"
    }
}
