use cyberred_common::FromMessage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("audit chain broken at record {id}: expected previous signature {expected}, found {actual}")]
    ChainBroken { id: i64, expected: String, actual: String },

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
