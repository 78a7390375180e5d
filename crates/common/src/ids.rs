//! ID generation helpers shared by the session manager and checkpoint store.

use rand::RngCore;

/// Generate a lowercase random hex suffix of the given byte length.
#[must_use]
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build an engagement id as `{name}-{YYYYMMDD-HHMMSS}-{6 hex chars}`.
#[must_use]
pub fn engagement_id(name: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "{name}-{}-{}",
        now.format("%Y%m%d-%H%M%S"),
        random_hex(3)
    )
}

/// Build a subscription id as `sub-{16 hex chars}`.
#[must_use]
pub fn subscription_id() -> String {
    format!("sub-{}", random_hex(8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn engagement_id_matches_expected_shape() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 7, 27, 12, 30, 5).unwrap();
        let id = engagement_id("acme-corp", now);
        assert!(id.starts_with("acme-corp-20260727-123005-"));
        assert_eq!(id.len(), "acme-corp-20260727-123005-".len() + 6);
    }

    #[test]
    fn subscription_id_has_sub_prefix_and_length() {
        let id = subscription_id();
        assert!(id.starts_with("sub-"));
        assert_eq!(id.len(), 4 + 16);
    }
}
