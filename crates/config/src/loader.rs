//! Discovers and loads `config.yaml`, with `${ENV_VAR}` substitution.
//!
//! Search order: `./config.yaml`, then `{base_dir}/config.yaml`. The
//! `base_dir` search only applies once a config has already told us where
//! `base_dir` is, so in practice the first call is always project-local or
//! an explicit path; anything found there supplies `base_dir` for the rest
//! of the process's life.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::env_subst::substitute_env;
use crate::schema::DaemonConfig;

const CONFIG_FILENAME: &str = "config.yaml";

pub fn load_config(path: &Path) -> anyhow::Result<DaemonConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))
}

/// Search `./config.yaml` then `{base_dir}/config.yaml`, falling back to
/// `DaemonConfig::default()` with `base_dir` set when neither exists.
pub fn discover_and_load(base_dir: &Path) -> DaemonConfig {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        debug!(path = %local.display(), "loading config");
        return load_or_default(&local, base_dir);
    }

    let in_base_dir = base_dir.join(CONFIG_FILENAME);
    if in_base_dir.exists() {
        debug!(path = %in_base_dir.display(), "loading config");
        return load_or_default(&in_base_dir, base_dir);
    }

    debug!(base_dir = %base_dir.display(), "no config file found, using defaults");
    DaemonConfig {
        base_dir: base_dir.to_path_buf(),
        ..DaemonConfig::default()
    }
}

fn load_or_default(path: &Path, base_dir: &Path) -> DaemonConfig {
    match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            DaemonConfig {
                base_dir: base_dir.to_path_buf(),
                ..DaemonConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_with_env_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::env::set_var("CYBERRED_LOADER_TEST_DIR", "/var/cyberred");
        std::fs::write(&path, "base_dir: ${CYBERRED_LOADER_TEST_DIR}\nsessions:\n  max_engagements: 3\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.base_dir, PathBuf::from("/var/cyberred"));
        assert_eq!(cfg.sessions.max_engagements, 3);
        std::env::remove_var("CYBERRED_LOADER_TEST_DIR");
    }

    #[test]
    fn discover_and_load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = discover_and_load(dir.path());
        assert_eq!(cfg.base_dir, dir.path());
        assert_eq!(cfg.sessions.max_engagements, 10);
    }
}
