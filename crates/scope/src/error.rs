use cyberred_common::FromMessage;
use thiserror::Error;

/// Everything that can go wrong while parsing a scope configuration or
/// validating a target/command against one.
///
/// `ScopeViolation` carries enough context (`target`, `command`, `scope_rule`)
/// for the caller to build an audit record without re-deriving it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("scope violation ({scope_rule}): target={target:?} command={command:?}")]
    ScopeViolation {
        target: Option<String>,
        command: Option<String>,
        scope_rule: String,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn violation(
        scope_rule: impl Into<String>,
        target: Option<String>,
        command: Option<String>,
    ) -> Self {
        Self::ScopeViolation {
            target,
            command,
            scope_rule: scope_rule.into(),
        }
    }

    /// The `scope_rule` discriminant, for audit logging and tests.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::ScopeViolation { scope_rule, .. } => Some(scope_rule),
            Self::Message(_) => None,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cyberred_common::impl_context!();
