//! Hot-reload: the live config lives behind an `ArcSwap` so every reader
//! fetches the current value through an accessor rather than caching a
//! reference across an `await` point. A debounced file watcher and `SIGHUP`
//! both drive the same [`ConfigHandle::reload`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};
use notify_debouncer_full::notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};

use crate::loader::{discover_and_load, load_config};
use crate::schema::DaemonConfig;
use crate::validate::{validate, ValidationResult};

pub struct ConfigHandle {
    current: ArcSwap<DaemonConfig>,
    path: PathBuf,
    base_dir: PathBuf,
}

impl ConfigHandle {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Arc<Self> {
        let config = discover_and_load(&base_dir);
        let path = base_dir.join("config.yaml");
        Arc::new(Self { current: ArcSwap::from_pointee(config), path, base_dir })
    }

    /// Returns a guard over the current config. Do not hold this across an
    /// `await` point — fetch fresh after resuming.
    #[must_use]
    pub fn load(&self) -> Guard<Arc<DaemonConfig>> {
        self.current.load()
    }

    /// Re-reads `config.yaml` and swaps it in if (and only if) validation
    /// passes with no errors; warnings don't block the reload. Returns the
    /// validation result either way so the caller can log diagnostics.
    pub fn reload(&self) -> ValidationResult {
        if !self.path.exists() {
            return ValidationResult::default();
        }
        let loaded = match load_config(&self.path) {
            Ok(cfg) => cfg,
            Err(e) => {
                return ValidationResult {
                    diagnostics: vec![crate::validate::Diagnostic::parse_error(
                        "config.yaml",
                        format!("failed to parse: {e}"),
                    )],
                };
            }
        };

        let result = validate(&loaded);
        if !result.has_errors() {
            tracing::info!(path = %self.path.display(), "config reloaded");
            self.current.store(Arc::new(loaded));
        } else {
            tracing::warn!(path = %self.path.display(), diagnostics = ?result.diagnostics, "config reload rejected");
        }
        result
    }

    #[must_use]
    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }
}

/// Watches `config.yaml` for changes and calls [`ConfigHandle::reload`] on
/// debounced filesystem events. The returned value must be kept alive for
/// watching to continue.
pub struct ConfigWatcher {
    _debouncer: Debouncer<notify_debouncer_full::notify::RecommendedWatcher, RecommendedCache>,
}

impl ConfigWatcher {
    pub fn start(handle: Arc<ConfigHandle>) -> anyhow::Result<Self> {
        let watch_dir = handle.base_dir().to_path_buf();
        let debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let touched_config = events.iter().any(|event| {
                        event.paths.iter().any(|p| p.file_name().and_then(|n| n.to_str()) == Some("config.yaml"))
                    });
                    if touched_config {
                        handle.reload();
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::warn!(error = %e, "config watcher error");
                    }
                }
            },
        )?;

        let mut watcher = Self { _debouncer: debouncer };
        if watch_dir.exists() {
            watcher._debouncer.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        }
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_falls_back_to_defaults_without_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ConfigHandle::new(dir.path().to_path_buf());
        assert_eq!(handle.load().sessions.max_engagements, 10);
    }

    #[test]
    fn reload_picks_up_an_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sessions:\n  max_engagements: 4\n  max_history: 40\n").unwrap();

        let handle = ConfigHandle::new(dir.path().to_path_buf());
        assert_eq!(handle.load().sessions.max_engagements, 4);

        std::fs::write(&path, "sessions:\n  max_engagements: 7\n  max_history: 40\n").unwrap();
        let result = handle.reload();
        assert!(!result.has_errors());
        assert_eq!(handle.load().sessions.max_engagements, 7);
    }

    #[test]
    fn reload_rejects_an_invalid_edit_and_keeps_the_old_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sessions:\n  max_engagements: 4\n  max_history: 40\n").unwrap();

        let handle = ConfigHandle::new(dir.path().to_path_buf());
        std::fs::write(&path, "sessions:\n  max_engagements: 0\n  max_history: 40\n").unwrap();

        let result = handle.reload();
        assert!(result.has_errors());
        assert_eq!(handle.load().sessions.max_engagements, 4, "bad reload must not replace the live config");
    }
}
