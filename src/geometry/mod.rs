//! Geometry utilities: marker corners and the per-frame size reduction.

pub mod marker;

pub use marker::{Marker, frame_corner_distance, max_corner_distance};
