//! Scope configuration: the set of targets, ports, and protocols an engagement
//! is permitted to touch.

use std::path::Path;

use ipnet::IpNet;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A single allowed port, or an inclusive range (`[low, high]` in YAML).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
}

impl PortSpec {
    #[must_use]
    pub fn contains(self, port: u16) -> bool {
        match self {
            Self::Single(p) => p == port,
            Self::Range(lo, hi) => port >= lo && port <= hi,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    pub allowed_networks: Vec<IpNet>,
    pub allowed_hostnames: Vec<String>,
    pub allowed_ports: Option<Vec<PortSpec>>,
    pub allowed_protocols: Option<Vec<String>>,
    pub allow_private: bool,
    pub allow_loopback: bool,
}

/// Raw on-disk shape, deserialized before being bucketed into networks vs.
/// hostnames (a target can be either and we don't know which until we try to
/// parse it as a network).
#[derive(Debug, Deserialize)]
struct RawScopeConfig {
    #[serde(alias = "scope")]
    scope: Option<Box<RawScopeConfig>>,
    allowed_targets: Option<Vec<String>>,
    allowed_ports: Option<Vec<RawPort>>,
    allowed_protocols: Option<Vec<String>>,
    #[serde(default)]
    allow_private: bool,
    #[serde(default)]
    allow_loopback: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Single(u16),
    Range(u16, u16),
}

impl ScopeConfig {
    /// Parse a scope configuration from a raw YAML/JSON value.
    ///
    /// Accepts either a flat document (`allowed_targets: [...]`) or one
    /// nested under a top-level `scope:` key.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let parsed: RawScopeConfig = serde_yaml::from_str(raw)
            .map_err(|e| Error::Message(format!("invalid scope config: {e}")))?;
        Self::from_raw(parsed)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Message(format!(
                "scope config not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Message(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    fn from_raw(raw: RawScopeConfig) -> Result<Self> {
        let raw = match raw.scope {
            Some(nested) => *nested,
            None => raw,
        };

        let targets = raw
            .allowed_targets
            .ok_or_else(|| Error::Message("scope config missing 'allowed_targets'".into()))?;
        if targets.is_empty() {
            return Err(Error::Message(
                "scope config 'allowed_targets' must not be empty".into(),
            ));
        }

        let mut allowed_networks = Vec::new();
        let mut allowed_hostnames = Vec::new();
        for target in targets {
            match parse_network(&target) {
                Some(net) => allowed_networks.push(net),
                None => allowed_hostnames.push(target.to_lowercase()),
            }
        }

        let allowed_ports = raw.allowed_ports.map(|ports| {
            ports
                .into_iter()
                .map(|p| match p {
                    RawPort::Single(n) => PortSpec::Single(n),
                    RawPort::Range(lo, hi) => PortSpec::Range(lo, hi),
                })
                .collect()
        });

        let allowed_protocols = raw
            .allowed_protocols
            .map(|ps| ps.into_iter().map(|p| p.to_lowercase()).collect());

        Ok(Self {
            allowed_networks,
            allowed_hostnames,
            allowed_ports,
            allowed_protocols,
            allow_private: raw.allow_private,
            allow_loopback: raw.allow_loopback,
        })
    }
}

/// Try to parse `target` as an IP address or CIDR network, accepting a bare
/// address as a /32 or /128.
fn parse_network(target: &str) -> Option<IpNet> {
    if let Ok(net) = target.parse::<IpNet>() {
        return Some(net);
    }
    target
        .parse::<std::net::IpAddr>()
        .ok()
        .map(|ip| IpNet::new(ip, if ip.is_ipv4() { 32 } else { 128 }).ok())
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_ip_and_hostname_targets() {
        let cfg = ScopeConfig::from_yaml_str(
            "allowed_targets:\n  - 10.0.0.0/24\n  - Example.COM\nallow_private: true\n",
        )
        .unwrap();
        assert_eq!(cfg.allowed_networks.len(), 1);
        assert_eq!(cfg.allowed_hostnames, vec!["example.com".to_string()]);
        assert!(cfg.allow_private);
    }

    #[test]
    fn rejects_empty_targets() {
        let err = ScopeConfig::from_yaml_str("allowed_targets: []\n").unwrap_err();
        assert!(matches!(err, Error::Message(_)));
    }

    #[test]
    fn accepts_nested_scope_key() {
        let cfg = ScopeConfig::from_yaml_str("scope:\n  allowed_targets:\n    - 192.168.1.1\n")
            .unwrap();
        assert_eq!(cfg.allowed_networks.len(), 1);
    }
}
