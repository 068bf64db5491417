//! Preview geometry.
//!
//! Pure functions that pick the sensor output resolution for a viewport
//! and compute the transform that keeps the preview upright and
//! full-bleed when the display is rotated.

mod size;
mod transform;

pub use size::{choose_output_size, OutputSize, ViewSize};
pub use transform::{compute_transform, DisplayTransform, Rect, Rotation, Transform};
