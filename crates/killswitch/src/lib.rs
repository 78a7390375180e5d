//! Per-engagement emergency stop.
//!
//! Once triggered, a kill switch stays triggered: there is no "reset", only
//! constructing a fresh one for a new engagement run.

pub mod error;
pub mod switch;

pub use error::{Error, Result};
pub use switch::{KillReport, KillSwitch, PathOutcome};
