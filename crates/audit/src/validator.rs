//! Wraps [`cyberred_scope::ScopeValidator`] so every call to `validate`
//! emits exactly one audit record: ALLOW on success, DENY on any error
//! exit, with no path that returns without writing one.

use chrono::Utc;
use cyberred_scope::{Error as ScopeError, ScopeValidator};

use crate::model::{AuditRecord, Decision};
use crate::store::AuditStore;

pub struct AuditedValidator {
    validator: ScopeValidator,
    store: AuditStore,
    actor: String,
}

impl AuditedValidator {
    #[must_use]
    pub fn new(validator: ScopeValidator, store: AuditStore, actor: impl Into<String>) -> Self {
        Self { validator, store, actor: actor.into() }
    }

    #[must_use]
    pub fn scope(&self) -> &ScopeValidator {
        &self.validator
    }

    pub async fn validate(
        &self,
        engagement_id: Option<&str>,
        target: Option<&str>,
        port: Option<u16>,
        protocol: Option<&str>,
        command: Option<&str>,
    ) -> Result<(), ScopeError> {
        let outcome = self.validator.validate(target, port, protocol, command);

        let record = match &outcome {
            Ok(()) => AuditRecord::scope_decision(
                engagement_id.map(str::to_string),
                Decision::Allow,
                target,
                command,
                "in_scope",
                &self.actor,
                Utc::now(),
            ),
            Err(err) => AuditRecord::scope_decision(
                engagement_id.map(str::to_string),
                Decision::Deny,
                target,
                command,
                err.rule().unwrap_or("validation_error"),
                &self.actor,
                Utc::now(),
            ),
        };

        if let Err(store_err) = self.store.append(record).await {
            tracing::error!(error = %store_err, "failed to write audit record for scope decision");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberred_scope::ScopeConfig;

    async fn wrapped(yaml: &str) -> AuditedValidator {
        let config = ScopeConfig::from_yaml_str(yaml).unwrap();
        let validator = ScopeValidator::new(config);
        let store = AuditStore::open_in_memory().await.unwrap();
        AuditedValidator::new(validator, store, "test-suite")
    }

    #[tokio::test]
    async fn allow_then_deny_yields_exactly_two_records() {
        let audited = wrapped("allowed_targets:\n  - 192.168.1.0/24\nallow_private: true\n").await;

        assert!(audited.validate(None, Some("192.168.1.100"), Some(80), None, None).await.is_ok());
        assert!(audited.validate(None, Some("10.0.0.5"), None, None, None).await.is_err());

        let records = audited.store.for_engagement("missing").await.unwrap();
        assert_eq!(records.len(), 0);

        let chain_break = audited.store.verify_chain().await.unwrap();
        assert_eq!(chain_break, None);
    }

    #[tokio::test]
    async fn every_error_exit_is_audited_including_non_scope_errors() {
        let audited = wrapped("allowed_targets:\n  - example.com\n").await;

        let result = audited.validate(None, None, None, None, Some("nmap example.com; rm -rf /")).await;
        assert!(result.is_err());

        assert_eq!(audited.store.count().await.unwrap(), 1);
    }
}
