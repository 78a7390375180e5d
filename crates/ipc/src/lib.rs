//! Unix-socket IPC front end for the daemon: wire framing, command
//! dispatch against the session manager, and in-process event streaming
//! for attached clients.

pub mod dispatch;
pub mod error;
pub mod event_bus;
pub mod server;

pub use dispatch::{Command, Dispatched, Dispatcher, Effect};
pub use error::{Error, Result};
pub use event_bus::ChannelEventBus;
pub use server::{default_pid_path, default_socket_path, DaemonServer};
