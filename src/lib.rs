pub mod calibration;
pub mod geometry;
pub mod io;
pub mod system;
pub mod video;
