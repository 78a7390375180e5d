use cyberred_common::FromMessage;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("engagement not found: {engagement_id}")]
    NotFound { engagement_id: String },

    #[error("invalid state transition for engagement '{engagement_id}': {from} -> {to}")]
    InvalidTransition {
        engagement_id: String,
        from: String,
        to: String,
    },

    #[error("resource limit exceeded: {limit_type} (max: {max_value})")]
    ResourceLimit {
        limit_type: String,
        current_value: usize,
        max_value: usize,
    },

    #[error("configuration error in '{config_path}': {reason}")]
    Configuration { config_path: String, reason: String },

    #[error("pre-flight checks failed: {0}")]
    PreFlightFailed(String),

    #[error("{0}")]
    Message(String),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<Error> for cyberred_protocol::ErrorShape {
    fn from(err: Error) -> Self {
        use cyberred_protocol::error_codes;
        let code = match &err {
            Error::NotFound { .. } => error_codes::ENGAGEMENT_NOT_FOUND,
            Error::InvalidTransition { .. } => error_codes::INVALID_STATE_TRANSITION,
            Error::ResourceLimit { .. } => error_codes::RESOURCE_LIMIT,
            Error::Configuration { .. } => error_codes::CONFIGURATION_ERROR,
            Error::PreFlightFailed(_) => error_codes::PRE_FLIGHT_FAILED,
            Error::Message(_) => error_codes::INTERNAL,
        };
        Self::new(code, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cyberred_common::impl_context!();
