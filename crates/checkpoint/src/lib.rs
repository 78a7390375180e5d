//! Cold-state engagement persistence: signed, scope-bound SQLite snapshots
//! written atomically so a daemon crash never corrupts a checkpoint in
//! place.

pub mod error;
pub mod model;
pub mod schema;
pub mod signature;
pub mod store;

pub use error::{Error, Result};
pub use model::{AgentState, CheckpointData, Finding};
pub use store::CheckpointStore;
