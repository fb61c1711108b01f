//! Memory-layout engine.
//!
//! Nodes never compute addresses themselves; they ask a layout for its
//! storage size, bounding box, and whether dimensions may be fused or
//! vectorized.

pub mod layout;

pub use layout::DenseMemoryLayout;
