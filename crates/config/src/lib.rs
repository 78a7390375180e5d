//! Daemon configuration: schema, YAML loading with `${ENV_VAR}` substitution,
//! validation, and hot-reload.
//!
//! Config file: `config.yaml`, searched for in `./` then the configured
//! `base_dir`. Falls back to built-in defaults when no file is found.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;
pub mod watcher;

pub use env_subst::substitute_env;
pub use loader::{discover_and_load, load_config};
pub use schema::{
    CheckpointSettings, DaemonConfig, IpcSettings, LlmGatewaySettings, LoggingSettings,
    SessionLimits,
};
pub use validate::{validate, Diagnostic, Severity, ValidationResult};
pub use watcher::{ConfigHandle, ConfigWatcher};
