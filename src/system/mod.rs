//! Session orchestration and thread management.
//!
//! This module contains the `CalibrationSession` that spawns the operator
//! thread and drives the frame loop, along with the state the two share.

mod session;
pub mod shared_state;

pub use session::{CalibrationSession, SessionOutcome};
pub use shared_state::{MeasurementSlot, NO_MARKER, SharedState};
