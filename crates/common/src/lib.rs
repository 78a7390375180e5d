//! Shared error taxonomy and context helpers used across all cyberred crates.

pub mod error;
pub mod ids;

pub use error::{CyberRedError, Error, FromMessage, Result};
