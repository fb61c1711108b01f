//! Index algebra: value types shared by every other module.
//!
//! - Named index sets with extents
//! - Dimension ranges and bounding boxes
//! - The loop-over-GEMM cost tuple

pub mod indices;
pub mod bbox;
pub mod cost;

pub use indices::{Index, Indices};
pub use bbox::{BoundingBox, Range};
pub use cost::LoGCost;
