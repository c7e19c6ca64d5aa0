//! Operator-driven calibration: running statistics, the session log and the
//! interactive input loop that feeds them.

pub mod accumulator;
pub mod operator;
pub mod session_log;

pub use accumulator::{CalibrationAccumulator, CalibrationSample, Submission};
pub use operator::{EXIT_SENTINEL, OperatorInput, OperatorLoop, OperatorReport, OperatorState, PROMPT};
pub use session_log::SessionLog;
