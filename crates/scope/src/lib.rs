//! Deterministic scope/injection validation.
//!
//! Every target or command an agent wants to act on passes through
//! [`ScopeValidator::validate`] first. Validation never calls out to the
//! network, the filesystem (beyond loading the config once), or any async
//! runtime — it is a pure function of the scope configuration and the input,
//! so it runs inline on the caller's task.

pub mod config;
pub mod error;
pub mod validator;

pub use config::{PortSpec, ScopeConfig};
pub use error::{Error, Result};
pub use validator::{ScopeValidator, check_injection, normalize_input};
