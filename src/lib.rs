//! # TensorForge - Tensor Contraction Compiler
//!
//! Compiles tensor expressions written in index notation into sequences of
//! primitive kernel actions:
//! - Index deduction and binarisation of Einstein-summation expressions
//! - Sparsity pattern propagation and non-zero FLOP accounting
//! - Aligned dense memory layouts for intermediate results
//! - Mapping of contractions onto loops over GEMM
//! - Lowering to a linear control-flow graph with copy elimination
//!
//! ## Architecture
//!
//! ```text
//! Tensor → Node tree → resolve → sparsity → layouts → GEMM → CFG → analysis
//! ```
//!
//! ## Example
//!
//! ```rust
//! use tensorforge::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let a = Tensor::new("A", &[4, 3])?.into_ref();
//! let b = Tensor::new("B", &[3, 5])?.into_ref();
//! let c = Tensor::new("C", &[4, 5])?.into_ref();
//!
//! let stmt = Node::indexed(&c, "ij")?
//!     .assign(Node::indexed(&a, "ik")?.times(Node::indexed(&b, "kj")?)?)?;
//! let kernel = Kernel::new("matmul", vec![stmt], CompilerConfig::default())?;
//! let cfg = kernel.cfg()?;
//! assert_eq!(actions(&cfg).count(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algebra;
pub mod sparsity;
pub mod memory;
pub mod ast;
pub mod transform;
pub mod controlflow;
pub mod kernel;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::algebra::{BoundingBox, Index, Indices, LoGCost, Range};
    pub use crate::sparsity::Pattern;
    pub use crate::memory::DenseMemoryLayout;
    pub use crate::ast::{Node, NodeKind, Operand, Scalar, ScalarValue, Tensor, TensorRef};
    pub use crate::transform::{Pipeline, Transform};
    pub use crate::controlflow::{actions, AstToControlFlow, Cfg, CfgTransform, ProgramAction, SubstituteBackward};
    pub use crate::kernel::{prepare, Kernel};
    pub use crate::utils::errors::*;
    pub use crate::utils::PrettyPrint;
    pub use crate::CompilerConfig;
}

pub use kernel::Kernel;

use serde::{Deserialize, Serialize};

/// Configuration for the compilation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Vector width in reals used for stride alignment
    pub alignment: usize,
    /// Align the leading stride of vectorizable intermediates
    pub align_stride: bool,
    /// Use plain dense layouts for every intermediate result
    pub simple_memory_layout: bool,
    /// Map contractions onto loops over GEMM
    pub enable_gemm_mapping: bool,
    /// Remove redundant copies after lowering
    pub substitute_backward: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            alignment: 8,
            align_stride: true,
            simple_memory_layout: false,
            enable_gemm_mapping: true,
            substitute_backward: true,
        }
    }
}

impl CompilerConfig {
    /// Set the vector width in reals.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Enable or disable stride alignment.
    pub fn with_align_stride(mut self, align_stride: bool) -> Self {
        self.align_stride = align_stride;
        self
    }

    /// Enable or disable plain dense layouts.
    pub fn with_simple_memory_layout(mut self, simple: bool) -> Self {
        self.simple_memory_layout = simple;
        self
    }

    /// Enable or disable the GEMM mapping pass.
    pub fn with_gemm_mapping(mut self, enable: bool) -> Self {
        self.enable_gemm_mapping = enable;
        self
    }

    /// Enable or disable copy elimination.
    pub fn with_substitute_backward(mut self, enable: bool) -> Self {
        self.substitute_backward = enable;
        self
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = CompilerConfig::default()
            .with_alignment(4)
            .with_align_stride(false)
            .with_gemm_mapping(false);
        assert_eq!(config.alignment, 4);
        assert!(!config.align_stride);
        assert!(!config.enable_gemm_mapping);
        assert!(config.substitute_backward);
        assert_ne!(config, CompilerConfig::default());
    }
}
