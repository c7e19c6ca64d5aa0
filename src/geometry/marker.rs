//! Detected marker geometry and the corner-distance reduction.
//!
//! A marker's apparent size is measured as the longest segment between any two
//! of its four corners. That is the diagonal for a square seen head-on, but it
//! stays meaningful under perspective distortion where the corner order may
//! not be the one we expect.

use nalgebra::Point2;

/// A fiducial marker as returned by the marker extractor for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Dictionary id of the marker.
    pub id: i32,
    /// Corner positions in pixels, in the extractor's order.
    pub corners: [Point2<f64>; 4],
}

impl Marker {
    pub fn new(id: i32, corners: [Point2<f64>; 4]) -> Self {
        Self { id, corners }
    }

    /// Build a marker from raw `(x, y)` pixel pairs.
    pub fn from_pixels(id: i32, corners: [(f64, f64); 4]) -> Self {
        Self {
            id,
            corners: corners.map(|(x, y)| Point2::new(x, y)),
        }
    }
}

/// Maximum Euclidean distance over the 6 unordered corner pairs of a marker.
///
/// Degenerate markers (all corners coincident) yield 0.
pub fn max_corner_distance(marker: &Marker) -> f64 {
    let c = &marker.corners;
    let mut max_dist = 0.0_f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            max_dist = max_dist.max(nalgebra::distance(&c[i], &c[j]));
        }
    }
    max_dist
}

/// Reduce all markers seen in one frame to a single corner distance.
///
/// The largest per-marker distance wins regardless of marker id. Returns
/// `None` when the frame has no markers.
pub fn frame_corner_distance(markers: &[Marker]) -> Option<f64> {
    markers.iter().map(max_corner_distance).reduce(f64::max)
}
