//! Configuration validation: checks a loaded [`DaemonConfig`] for
//! inconsistent limits, missing files, and other trouble a hot-reload
//! should refuse rather than silently apply.

use crate::schema::DaemonConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path into the config, e.g. `"llm_gateway.rate_limit_rpm"`.
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, path: path.into(), message: message.into() }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, path: path.into(), message: message.into() }
    }

    /// Used by the loader/watcher to surface a parse failure as a
    /// diagnostic rather than a bare `anyhow::Error`.
    pub(crate) fn parse_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::error(path, message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }
}

#[must_use]
pub fn validate(config: &DaemonConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    if config.sessions.max_engagements == 0 {
        diagnostics.push(Diagnostic::error("sessions.max_engagements", "must be at least 1"));
    }
    if config.sessions.max_history < config.sessions.max_engagements {
        diagnostics.push(Diagnostic::error(
            "sessions.max_history",
            "must be at least sessions.max_engagements, or active engagements would be evicted from history",
        ));
    }

    if config.llm_gateway.rate_limit_rpm == 0 {
        diagnostics.push(Diagnostic::error("llm_gateway.rate_limit_rpm", "must be at least 1"));
    }
    if config.llm_gateway.rate_limit_burst == 0 {
        diagnostics.push(Diagnostic::error("llm_gateway.rate_limit_burst", "must be at least 1"));
    }
    if config.llm_gateway.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::error("llm_gateway.request_timeout_secs", "must be at least 1"));
    }
    if config.llm_gateway.backoff_delays_ms.is_empty() {
        diagnostics.push(Diagnostic::error("llm_gateway.backoff_delays_ms", "must have at least one entry"));
    }

    if config.shutdown_timeout_secs == 0 {
        diagnostics.push(Diagnostic::warning(
            "shutdown_timeout_secs",
            "a zero-second shutdown budget leaves no time to checkpoint running engagements",
        ));
    }

    if let Some(path) = &config.scope_config_path {
        if !path.exists() {
            diagnostics.push(Diagnostic::error("scope_config_path", format!("file not found: {}", path.display())));
        }
    } else {
        diagnostics.push(Diagnostic::warning(
            "scope_config_path",
            "no scope configuration set; engagements will need one supplied per-request",
        ));
    }

    if let Some(max_connections) = config.ipc.max_connections {
        if max_connections == 0 {
            diagnostics.push(Diagnostic::error("ipc.max_connections", "must be at least 1"));
        } else if max_connections > cyberred_protocol::MAX_CONNECTIONS {
            diagnostics.push(Diagnostic::warning(
                "ipc.max_connections",
                format!("exceeds the compiled-in cap of {}", cyberred_protocol::MAX_CONNECTIONS),
            ));
        }
    }

    ValidationResult { diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let mut config = DaemonConfig::default();
        config.scope_config_path = Some(std::env::temp_dir());
        let result = validate(&config);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn zero_max_engagements_is_an_error() {
        let mut config = DaemonConfig::default();
        config.sessions.max_engagements = 0;
        let result = validate(&config);
        assert!(result.has_errors());
    }

    #[test]
    fn history_below_engagements_cap_is_an_error() {
        let mut config = DaemonConfig::default();
        config.sessions.max_engagements = 20;
        config.sessions.max_history = 5;
        let result = validate(&config);
        assert!(result.has_errors());
    }

    #[test]
    fn missing_scope_config_is_a_warning_not_an_error() {
        let config = DaemonConfig::default();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn nonexistent_scope_config_path_is_an_error() {
        let mut config = DaemonConfig::default();
        config.scope_config_path = Some("/nonexistent/scope.yaml".into());
        let result = validate(&config);
        assert!(result.has_errors());
    }
}
