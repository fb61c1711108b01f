//! Tensors and scalars referenced by expression trees.

use crate::memory::DenseMemoryLayout;
use crate::sparsity::Pattern;
use crate::utils::errors::{CompositionError, CompositionErrorKind};
use serde::{Serialize, Deserialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a tensor; trees reference tensors, they never own them.
pub type TensorRef = Arc<Tensor>;

pub(crate) fn check_name(name: &str) -> Result<(), CompositionError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CompositionError::new(
            CompositionErrorKind::InvalidName,
            format!("Tensor name invalid (must match [A-Za-z][A-Za-z0-9_]*): {}", name),
        ))
    }
}

/// A named data source with shape, sparsity pattern and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    base_name: String,
    group: Option<usize>,
    shape: Vec<usize>,
    spp: Pattern,
    memory_layout: DenseMemoryLayout,
}

impl Tensor {
    /// A dense tensor.
    pub fn new(name: &str, shape: &[usize]) -> Result<Self, CompositionError> {
        check_name(name)?;
        Ok(Self {
            base_name: name.to_string(),
            group: None,
            shape: shape.to_vec(),
            spp: Pattern::dense(shape),
            memory_layout: DenseMemoryLayout::new(shape),
        })
    }

    /// Make this tensor member `group` of the family named by its base name.
    pub fn with_group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    /// Attach a sparsity pattern; the layout shrinks to its bounding box.
    pub fn with_pattern(mut self, spp: Pattern) -> Result<Self, CompositionError> {
        if spp.shape() != self.shape.as_slice() {
            return Err(CompositionError::new(
                CompositionErrorKind::ShapeMismatch,
                format!(
                    "Pattern of shape {:?} does not fit tensor {} of shape {:?}",
                    spp.shape(),
                    self.name(),
                    self.shape
                ),
            ));
        }
        self.memory_layout = DenseMemoryLayout::from_pattern(&spp, false, 1);
        self.spp = spp;
        Ok(self)
    }

    /// Full name, `base(group)` for grouped tensors.
    pub fn name(&self) -> String {
        match self.group {
            Some(g) => format!("{}({})", self.base_name, g),
            None => self.base_name.clone(),
        }
    }

    /// Name without the group suffix.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Group tag, if any.
    pub fn group(&self) -> Option<usize> {
        self.group
    }

    /// Extent of every dimension.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Sparsity pattern; dense unless set.
    pub fn spp(&self) -> &Pattern {
        &self.spp
    }

    /// Storage layout of the tensor.
    pub fn memory_layout(&self) -> &DenseMemoryLayout {
        &self.memory_layout
    }

    /// Wrap in a shared handle.
    pub fn into_ref(self) -> TensorRef {
        Arc::new(self)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A named runtime scalar, bound when the kernel executes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scalar {
    name: String,
}

impl Scalar {
    /// Named runtime scalar; the name must be a valid identifier.
    pub fn new(name: &str) -> Result<Self, CompositionError> {
        check_name(name)?;
        Ok(Self { name: name.to_string() })
    }

    /// Scalar name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Factor of a scalar multiplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Compile-time constant
    Constant(f64),
    /// Runtime scalar
    Named(Scalar),
}

impl ScalarValue {
    /// Whether multiplying by this value is free (a copy or a sign flip).
    pub fn is_unit(&self) -> bool {
        matches!(self, ScalarValue::Constant(c) if *c == 1.0 || *c == -1.0)
    }

    /// The runtime scalar, if not a constant.
    pub fn as_named(&self) -> Option<&Scalar> {
        match self {
            ScalarValue::Named(s) => Some(s),
            ScalarValue::Constant(_) => None,
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(c: f64) -> Self {
        ScalarValue::Constant(c)
    }
}

impl From<Scalar> for ScalarValue {
    fn from(s: Scalar) -> Self {
        ScalarValue::Named(s)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Constant(c) => write!(f, "{:?}", c),
            ScalarValue::Named(s) => write!(f, "{}", s),
        }
    }
}
