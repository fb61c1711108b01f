//! Utility modules for the tensor compiler.
//!
//! - Error types
//! - Pretty printing

pub mod errors;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use self::pretty::PrettyPrint;
