use cyberred_common::FromMessage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("checkpoint integrity error for '{checkpoint_path}' ({verification_type} verification): {detail}")]
    Integrity {
        checkpoint_path: String,
        verification_type: &'static str,
        detail: String,
    },

    #[error(
        "checkpoint was created with schema version {checkpoint_version}, but this build only \
         supports up to {current_version}"
    )]
    IncompatibleSchema {
        checkpoint_version: String,
        current_version: String,
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
