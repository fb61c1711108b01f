//! Control-flow representation of kernels.
//!
//! [`lower::AstToControlFlow`] turns prepared statements into a linear
//! sequence of program points; [`analysis`] answers the questions a code
//! generator asks about it and [`substitute`] removes redundant copies.

pub mod graph;
pub mod lower;
pub mod analysis;
pub mod substitute;

pub use graph::{actions, Cfg, Expression, ProgramAction, ProgramPoint, Term, Variable};
pub use lower::AstToControlFlow;
pub use analysis::{local_buffers, pretty_print, scalars, sorted_globals, sorted_prefetch, tensor_groups};
pub use substitute::{CfgTransform, SubstituteBackward};
