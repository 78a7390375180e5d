//! Pre-flight check run before an engagement starts: the engagement's
//! declared primary target, if any, must pass scope validation. This is the
//! only place an engagement's target is checked before work begins — every
//! subsequent target an agent touches goes through the same
//! [`cyberred_audit::AuditedValidator`] at the point of use.

use std::path::Path;

use async_trait::async_trait;
use cyberred_audit::AuditedValidator;
use cyberred_collab::{CheckPriority, CheckResult, PreFlightRunner};

/// Optional fields an engagement config may declare for its primary target.
/// Engagements that don't touch a network target at all (e.g. recon against
/// local artifacts) can omit all of these.
#[derive(Debug, Default, serde::Deserialize)]
struct TargetFields {
    target: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    command: Option<String>,
}

pub struct ScopePreFlightRunner {
    validator: AuditedValidator,
}

impl ScopePreFlightRunner {
    #[must_use]
    pub fn new(validator: AuditedValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl PreFlightRunner for ScopePreFlightRunner {
    async fn run_all(&self, engagement_config_path: &Path) -> Vec<CheckResult> {
        let raw = match std::fs::read_to_string(engagement_config_path) {
            Ok(raw) => raw,
            Err(e) => {
                return vec![CheckResult::fail(
                    "config_readable",
                    CheckPriority::P0,
                    format!("could not read engagement config: {e}"),
                )];
            }
        };

        let fields: TargetFields = serde_yaml::from_str(&raw).unwrap_or_default();
        if fields.target.is_none() && fields.command.is_none() {
            return vec![CheckResult::pass(
                "scope_validation",
                CheckPriority::P0,
                "no primary target declared, nothing to validate",
            )];
        }

        let engagement_id = engagement_config_path.file_stem().and_then(|s| s.to_str());
        match self
            .validator
            .validate(engagement_id, fields.target.as_deref(), fields.port, fields.protocol.as_deref(), fields.command.as_deref())
            .await
        {
            Ok(()) => vec![CheckResult::pass("scope_validation", CheckPriority::P0, "primary target is in scope")],
            Err(e) => vec![CheckResult::fail("scope_validation", CheckPriority::P0, format!("primary target out of scope: {e}"))],
        }
    }
}

#[cfg(test)]
mod tests {
    use cyberred_audit::AuditStore;
    use cyberred_collab::CheckStatus;
    use cyberred_scope::{ScopeConfig, ScopeValidator};

    use super::*;

    async fn runner(scope_yaml: &str) -> ScopePreFlightRunner {
        let config = ScopeConfig::from_yaml_str(scope_yaml).unwrap();
        let store = AuditStore::open_in_memory().await.unwrap();
        let validator = AuditedValidator::new(ScopeValidator::new(config), store, "test-suite");
        ScopePreFlightRunner::new(validator)
    }

    fn write_engagement_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("engagement.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn passes_when_no_target_is_declared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_engagement_config(dir.path(), "name: recon-only\n");
        let runner = runner("allowed_targets:\n  - example.com\n").await;

        let results = runner.run_all(&path).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn passes_when_target_is_in_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_engagement_config(dir.path(), "name: web-eng\ntarget: example.com\n");
        let runner = runner("allowed_targets:\n  - example.com\n").await;

        let results = runner.run_all(&path).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn fails_when_target_is_out_of_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_engagement_config(dir.path(), "name: web-eng\ntarget: not-allowed.com\n");
        let runner = runner("allowed_targets:\n  - example.com\n").await;

        let results = runner.run_all(&path).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn fails_when_config_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("allowed_targets:\n  - example.com\n").await;

        let results = runner.run_all(&dir.path().join("missing.yaml")).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Fail);
        assert_eq!(results[0].name, "config_readable");
    }
}
