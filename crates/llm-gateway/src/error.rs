use cyberred_common::FromMessage;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("request to '{provider}' timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: f64 },

    #[error("rate limit exceeded for '{provider}' ({limit_rpm} rpm)")]
    RateLimitExceeded {
        provider: String,
        limit_rpm: u32,
        retry_after_secs: Option<f64>,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RateLimitExceeded { .. } | Self::ProviderUnavailable { .. })
    }

    /// Short, stable token identifying the error variant, used to build the
    /// `error:{transient|permanent}:{ErrorClass}` finish reason.
    #[must_use]
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "ProviderUnavailable",
            Self::Timeout { .. } => "Timeout",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::Message(_) => "Message",
        }
    }
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
            Error::ProviderUnavailable { .. } => error_codes::LLM_PROVIDER_UNAVAILABLE,
            Error::Timeout { .. } => error_codes::LLM_TIMEOUT,
            Error::RateLimitExceeded { .. } => error_codes::LLM_RATE_LIMIT_EXCEEDED,
            Error::Message(_) => error_codes::INTERNAL,
        };
        Self::new(code, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cyberred_common::impl_context!();
