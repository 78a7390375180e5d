use cyberred_common::FromMessage;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Returned by [`crate::KillSwitch::check_frozen`] once the switch has
    /// been triggered — every cooperative point in the agent loop polls this.
    #[error("kill switch triggered for {engagement_id} by {triggered_by}: {reason}")]
    Triggered {
        engagement_id: String,
        triggered_by: String,
        reason: String,
    },

    #[error("{0}")]
    Message(String),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cyberred_common::impl_context!();
