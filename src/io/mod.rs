//! Configuration files and device bindings.

#[cfg(feature = "opencv")]
pub mod camera;
pub mod config;

pub use config::{ArucoDictionary, BoardConfig, CameraConfig, SessionConfig};
