//! Linear control-flow representation of a kernel.
//!
//! A kernel lowers to a sequence of [`ProgramPoint`]s, each holding one
//! [`ProgramAction`], terminated by a point without action. Expression terms
//! borrow the node they compute, so the tree cannot change while a CFG
//! derived from it is alive.

use crate::ast::{Node, ScalarValue, TensorRef};
use crate::memory::DenseMemoryLayout;
use crate::sparsity::Pattern;
use crate::utils::pretty::format_list;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Operand of a program action: a global tensor or a compiler temporary.
///
/// Variables are identified by name.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Tensor name or temporary name
    pub name: String,
    /// Assigned earlier in the kernel, or a temporary
    pub writable: bool,
    /// Storage layout
    pub memory_layout: DenseMemoryLayout,
    /// Sparsity of the value held
    pub eqspp: Option<Pattern>,
    /// User tensor behind a global variable
    pub tensor: Option<TensorRef>,
}

impl Variable {
    /// A compiler temporary.
    pub fn temporary(name: String, memory_layout: DenseMemoryLayout, eqspp: Option<Pattern>) -> Self {
        Self { name, writable: true, memory_layout, eqspp, tensor: None }
    }

    /// Whether this variable references a user tensor.
    pub fn is_global(&self) -> bool {
        self.tensor.is_some()
    }

    /// Whether this is a compiler temporary.
    pub fn is_local(&self) -> bool {
        !self.is_global()
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A node evaluated on already computed input variables.
#[derive(Debug, Clone)]
pub struct Expression<'a> {
    /// Node computed by this expression
    pub node: &'a Node,
    /// Layout of the computed value
    pub memory_layout: DenseMemoryLayout,
    /// Inputs, one per operand of `node`
    pub variables: Vec<Variable>,
}

impl fmt::Display for Expression<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.node.kind_name(), format_list(&self.variables, ", "))
    }
}

/// Right-hand side of an action.
#[derive(Debug, Clone)]
pub enum Term<'a> {
    /// Operation on input variables
    Expression(Expression<'a>),
    /// Plain copy of a single variable
    Variable(Variable),
}

impl<'a> Term<'a> {
    /// Input variables in operand order.
    pub fn variables(&self) -> Vec<&Variable> {
        match self {
            Term::Expression(e) => e.variables.iter().collect(),
            Term::Variable(v) => vec![v],
        }
    }

    /// The copied variable, if the term is a plain copy.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Term::Variable(v) => Some(v),
            Term::Expression(_) => None,
        }
    }

    /// The expression, if the term computes one.
    pub fn as_expression(&self) -> Option<&Expression<'a>> {
        match self {
            Term::Expression(e) => Some(e),
            Term::Variable(_) => None,
        }
    }
}

impl fmt::Display for Term<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Expression(e) => write!(f, "{}", e),
            Term::Variable(v) => write!(f, "{}", v),
        }
    }
}

/// One primitive step: `result (+)= [scalar *] term`.
#[derive(Debug, Clone)]
pub struct ProgramAction<'a> {
    /// Variable written
    pub result: Variable,
    /// Value written
    pub term: Term<'a>,
    /// Accumulate into `result` instead of overwriting it
    pub add: bool,
    /// Factor applied to the term
    pub scalar: Option<ScalarValue>,
}

impl<'a> ProgramAction<'a> {
    /// Unscaled action.
    pub fn new(result: Variable, term: Term<'a>, add: bool) -> Self {
        Self { result, term, add, scalar: None }
    }

    /// Scale the term by `scalar`.
    pub fn with_scalar(mut self, scalar: ScalarValue) -> Self {
        self.scalar = Some(scalar);
        self
    }

    /// Whether the term computes an operation.
    pub fn is_rhs_expression(&self) -> bool {
        matches!(self.term, Term::Expression(_))
    }

    /// Whether the term is a plain copy.
    pub fn is_rhs_variable(&self) -> bool {
        !self.is_rhs_expression()
    }

    /// Input variables of the term.
    pub fn variables(&self) -> Vec<&Variable> {
        self.term.variables()
    }

    /// Whether `name` is read by this action.
    pub fn reads(&self, name: &str) -> bool {
        self.term.variables().iter().any(|v| v.name == name)
    }
}

impl fmt::Display for ProgramAction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.result, if self.add { "+=" } else { "=" })?;
        if let Some(scalar) = &self.scalar {
            write!(f, "{} * ", scalar)?;
        }
        write!(f, "{}", self.term)
    }
}

/// Sequencing container; `action` is `None` only for the end sentinel.
#[derive(Debug, Clone)]
pub struct ProgramPoint<'a> {
    /// Action executed at this point
    pub action: Option<ProgramAction<'a>>,
}

impl<'a> ProgramPoint<'a> {
    /// Point executing `action`.
    pub fn new(action: ProgramAction<'a>) -> Self {
        Self { action: Some(action) }
    }

    /// End of the program.
    pub fn sentinel() -> Self {
        Self { action: None }
    }
}

/// A lowered kernel.
pub type Cfg<'a> = Vec<ProgramPoint<'a>>;

/// Iterate over the actions of a CFG, skipping the sentinel.
pub fn actions<'c, 'a>(cfg: &'c [ProgramPoint<'a>]) -> impl Iterator<Item = &'c ProgramAction<'a>> + 'c {
    cfg.iter().filter_map(|pp| pp.action.as_ref())
}
