//! Scope validation: the hard gate every outbound target/command must pass
//! before an agent is allowed to act on it.
//!
//! Validation is synchronous and side-effect free (aside from a `tracing`
//! event per decision) so it can run on the calling task without a context
//! switch. A `Result::Err` here always means "deny" — there is no code path
//! that silently allows a target through on an internal error, since an
//! unparseable target or host never produces an `Ok(())`.

use std::net::IpAddr;

use unicode_normalization::UnicodeNormalization;

use crate::config::{PortSpec, ScopeConfig};
use crate::error::{Error, Result};

const ZERO_WIDTH: [char; 6] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{200e}', '\u{200f}', '\u{feff}'];

pub struct ScopeValidator {
    config: ScopeConfig,
}

impl ScopeValidator {
    #[must_use]
    pub fn new(config: ScopeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Validate an explicit target/port/protocol and/or a command string.
    ///
    /// When `command` is given it is injection-checked and, for any of
    /// `target`/`port`/`protocol` left unset, used to infer a value — but an
    /// explicit argument always takes precedence over what's parsed from the
    /// command.
    pub fn validate(
        &self,
        target: Option<&str>,
        port: Option<u16>,
        protocol: Option<&str>,
        command: Option<&str>,
    ) -> Result<()> {
        let normalized_command = match command {
            Some(cmd) => {
                let normalized = normalize_input(cmd)?;
                check_injection(&normalized)?;
                Some(normalized)
            }
            None => None,
        };

        let parsed = normalized_command
            .as_deref()
            .map(parse_target_from_command)
            .unwrap_or_default();

        let effective_target = target
            .map(str::to_string)
            .or(parsed.target)
            .ok_or_else(|| {
                self.deny(None, command, "missing_target");
                Error::violation("missing_target", None, command.map(str::to_string))
            })?;

        let effective_target = normalize_input(&effective_target)?;
        let effective_port = port.or(parsed.port);
        let effective_protocol = protocol.map(str::to_lowercase).or(parsed.protocol);

        let target_for_deny = Some(effective_target.clone());
        let cmd_for_deny = command.map(str::to_string);

        let host_part = strip_url_scheme(&effective_target);
        let (host_only, port_from_target) = split_host_port(host_part);
        let effective_port = effective_port.or(port_from_target);

        let ip_candidate = host_only
            .split('/')
            .next()
            .unwrap_or(host_only)
            .parse::<IpAddr>()
            .ok();

        if let Some(ip) = ip_candidate {
            if self.is_reserved(ip) {
                self.deny(target_for_deny.clone(), command, "reserved_ip");
                return Err(Error::violation("reserved_ip", target_for_deny, cmd_for_deny));
            }
            if !self.is_ip_in_scope(ip) {
                self.deny(target_for_deny.clone(), command, "ip_out_of_scope");
                return Err(Error::violation(
                    "ip_out_of_scope",
                    target_for_deny,
                    cmd_for_deny,
                ));
            }
        } else {
            if !self.is_hostname_in_scope(host_only) {
                self.deny(target_for_deny.clone(), command, "hostname_out_of_scope");
                return Err(Error::violation(
                    "hostname_out_of_scope",
                    target_for_deny,
                    cmd_for_deny,
                ));
            }
        }

        if let Some(p) = effective_port {
            if !self.is_port_allowed(p) {
                self.deny(target_for_deny.clone(), command, "port_blocked");
                return Err(Error::violation("port_blocked", target_for_deny, cmd_for_deny));
            }
        }

        if let Some(ref proto) = effective_protocol {
            if !self.is_protocol_allowed(proto) {
                self.deny(target_for_deny.clone(), command, "protocol_blocked");
                return Err(Error::violation(
                    "protocol_blocked",
                    target_for_deny,
                    cmd_for_deny,
                ));
            }
        }

        tracing::info!(
            target = %effective_target,
            port = ?effective_port,
            protocol = ?effective_protocol,
            decision = "allow",
            "scope_validation"
        );
        Ok(())
    }

    fn deny(&self, target: Option<String>, command: Option<&str>, reason: &str) {
        tracing::warn!(
            target = ?target,
            command = ?command,
            reason,
            decision = "deny",
            "scope_validation"
        );
    }

    #[must_use]
    pub fn is_reserved(&self, ip: IpAddr) -> bool {
        if ip.is_loopback() && !self.config.allow_loopback {
            return true;
        }
        if is_link_local(ip) || ip.is_multicast() || ip.is_unspecified() {
            return true;
        }
        if is_private(ip) && !self.config.allow_private {
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_ip_in_scope(&self, ip: IpAddr) -> bool {
        self.config.allowed_networks.iter().any(|net| net.contains(&ip))
    }

    #[must_use]
    pub fn is_hostname_in_scope(&self, hostname: &str) -> bool {
        let hostname = hostname.to_lowercase();
        self.config.allowed_hostnames.iter().any(|allowed| {
            if let Some(suffix) = allowed.strip_prefix("*.") {
                hostname.ends_with(&format!(".{suffix}")) || hostname == suffix
            } else {
                hostname == *allowed
            }
        })
    }

    #[must_use]
    pub fn is_port_allowed(&self, port: u16) -> bool {
        match &self.config.allowed_ports {
            None => true,
            Some(ports) => ports.iter().any(|p| p.contains(port)),
        }
    }

    #[must_use]
    pub fn is_protocol_allowed(&self, protocol: &str) -> bool {
        match &self.config.allowed_protocols {
            None => true,
            Some(protocols) => protocols.iter().any(|p| p == protocol),
        }
    }
}

fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        // IPv6 unique local (fc00::/7); the documentation range 2001:db8::/32
        // is deliberately NOT treated as private.
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Normalize a target/command string before any scope decision is made:
/// NFKC-normalize, strip zero-width characters, and reject null bytes or
/// control characters (tab and CR/LF excepted).
pub fn normalize_input(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Message("empty_input".into()));
    }
    let normalized: String = trimmed.nfkc().collect();
    let stripped: String = normalized.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
    if stripped.contains('\0') {
        return Err(Error::Message("null_byte".into()));
    }
    if stripped
        .chars()
        .any(|c| c.is_control() && c != '\t' && c != '\r' && c != '\n')
    {
        return Err(Error::Message("control_char".into()));
    }
    Ok(stripped)
}

/// Shell-injection check over a normalized command string.
///
/// Walks the command tracking single-quote, double-quote, and backslash-escape
/// context. Single-quoted text is fully literal. Inside double quotes only
/// backtick and `$(` are dangerous. Outside any quoting, `;|&\`$()` and
/// newline are all rejected.
pub fn check_injection(command: &str) -> Result<()> {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let chars: Vec<char> = command.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '`' if in_double => {
                return Err(Error::Message("injection_backtick_double_quote".into()));
            }
            '$' if in_double && chars.get(i + 1) == Some(&'(') => {
                return Err(Error::Message("injection_dollar_double_quote".into()));
            }
            ';' | '|' | '&' | '`' | '$' | '(' | ')' | '\n' if !in_single && !in_double => {
                return Err(Error::Message(format!("injection_unquoted_{c}")));
            }
            _ => {}
        }
    }

    if in_single || in_double {
        return Err(Error::Message("parse_error".into()));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct ParsedCommandTarget {
    target: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
}

/// Best-effort extraction of a target/port/protocol from a tool invocation
/// command, used only when the caller doesn't supply them explicitly.
fn parse_target_from_command(command: &str) -> ParsedCommandTarget {
    let mut result = ParsedCommandTarget::default();
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        match tok {
            "-p" | "--port" => {
                if let Some(val) = tokens.get(i + 1) {
                    let first = val.split(',').next().unwrap_or(val);
                    result.port = first.parse().ok();
                    i += 1;
                }
            }
            "-u" | "--url" => {
                if let Some(val) = tokens.get(i + 1) {
                    apply_url_or_host(val, &mut result);
                    i += 1;
                }
            }
            _ if tok.contains("://") => apply_url_or_host(tok, &mut result),
            _ if result.target.is_none()
                && !tok.starts_with('-')
                && (tok.parse::<IpAddr>().is_ok() || tok.contains('.') || tok.contains(':')) =>
            {
                apply_url_or_host(tok, &mut result);
            }
            _ => {}
        }
        i += 1;
    }
    result
}

fn apply_url_or_host(value: &str, result: &mut ParsedCommandTarget) {
    if let Some((scheme, rest)) = value.split_once("://") {
        result.protocol.get_or_insert_with(|| scheme.to_lowercase());
        let host_part = rest.split('/').next().unwrap_or(rest);
        let (host, port) = split_host_port(host_part);
        result.target.get_or_insert_with(|| host.to_string());
        if result.port.is_none() {
            result.port = port;
        }
        return;
    }
    let (host, port) = split_host_port(value);
    result.target.get_or_insert_with(|| host.to_string());
    if result.port.is_none() {
        result.port = port;
    }
}

fn strip_url_scheme(target: &str) -> &str {
    target.split_once("://").map_or(target, |(_, rest)| rest.split('/').next().unwrap_or(rest))
}

/// Split `host:port` on a single colon. IPv6 literals (which contain more
/// than one colon) are returned unsplit.
fn split_host_port(value: &str) -> (&str, Option<u16>) {
    if value.matches(':').count() == 1 {
        if let Some((host, port)) = value.split_once(':') {
            if let Ok(p) = port.parse::<u16>() {
                return (host, Some(p));
            }
        }
    }
    (value, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;

    fn validator(yaml: &str) -> ScopeValidator {
        ScopeValidator::new(ScopeConfig::from_yaml_str(yaml).unwrap())
    }

    #[test]
    fn allows_target_inside_network() {
        let v = validator("allowed_targets:\n  - 10.0.0.0/24\nallow_private: true\n");
        assert!(v.validate(Some("10.0.0.5"), None, None, None).is_ok());
    }

    #[test]
    fn rejects_target_outside_network() {
        let v = validator("allowed_targets:\n  - 10.0.0.0/24\nallow_private: true\n");
        let err = v.validate(Some("10.0.1.5"), None, None, None).unwrap_err();
        assert_eq!(err.rule(), Some("ip_out_of_scope"));
    }

    #[test]
    fn loopback_denied_unless_allowed() {
        let v = validator("allowed_targets:\n  - 127.0.0.0/8\n");
        let err = v.validate(Some("127.0.0.1"), None, None, None).unwrap_err();
        assert_eq!(err.rule(), Some("reserved_ip"));

        let v2 = validator("allowed_targets:\n  - 127.0.0.0/8\nallow_loopback: true\n");
        assert!(v2.validate(Some("127.0.0.1"), None, None, None).is_ok());
    }

    #[test]
    fn wildcard_hostname_matches_subdomain_and_root() {
        let v = validator("allowed_targets:\n  - '*.example.com'\n");
        assert!(v.validate(Some("api.example.com"), None, None, None).is_ok());
        assert!(v.validate(Some("example.com"), None, None, None).is_ok());
        assert!(v.validate(Some("example.org"), None, None, None).is_err());
    }

    #[test]
    fn port_and_protocol_restrictions_apply() {
        let mut cfg = ScopeConfig::from_yaml_str("allowed_targets:\n  - example.com\n").unwrap();
        cfg.allowed_ports = Some(vec![PortSpec::Single(443), PortSpec::Range(8000, 8100)]);
        cfg.allowed_protocols = Some(vec!["https".into()]);
        let v = ScopeValidator::new(cfg);

        assert!(v.validate(Some("example.com"), Some(443), Some("https"), None).is_ok());
        assert!(v.validate(Some("example.com"), Some(22), Some("https"), None).is_err());
        assert!(v.validate(Some("example.com"), Some(443), Some("ssh"), None).is_err());
    }

    #[test]
    fn rejects_unquoted_semicolon_injection() {
        let v = validator("allowed_targets:\n  - example.com\n");
        let err = v
            .validate(None, None, None, Some("nmap example.com; rm -rf /"))
            .unwrap_err();
        assert_eq!(err.rule(), Some("injection_unquoted_;"));
    }

    #[test]
    fn allows_semicolon_inside_single_quotes() {
        let v = validator("allowed_targets:\n  - example.com\n");
        assert!(
            v.validate(None, None, None, Some("nmap -oG 'out;file.txt' example.com"))
                .is_ok()
        );
    }

    #[test]
    fn infers_target_and_port_from_command() {
        let v = validator("allowed_targets:\n  - example.com\n");
        assert!(
            v.validate(None, None, None, Some("nmap -p 443 example.com"))
                .is_ok()
        );
    }

    #[test]
    fn explicit_target_takes_precedence_over_command() {
        let v = validator("allowed_targets:\n  - example.com\n");
        // Command references an out-of-scope host, but the explicit target wins.
        let result = v.validate(
            Some("example.com"),
            None,
            None,
            Some("nmap attacker.invalid"),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_null_byte_and_control_chars() {
        let v = validator("allowed_targets:\n  - example.com\n");
        assert!(v.validate(Some("exa\0mple.com"), None, None, None).is_err());
        assert!(v.validate(Some("exa\x01mple.com"), None, None, None).is_err());
    }

    #[test]
    fn normalize_strips_zero_width_characters() {
        let normalized = normalize_input("exa\u{200b}mple.com").unwrap();
        assert_eq!(normalized, "example.com");
    }
}
