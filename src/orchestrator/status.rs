use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived state of an issued certificate at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Revoked,
    Invalid,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Invalid => "invalid",
        }
    }

    pub fn is_valid(&self) -> bool {
        *self == CertificateStatus::Valid
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First match wins: revocation, then ledger validity, then expiry.
pub fn derive_status(
    revoked: bool,
    ledger_valid: bool,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CertificateStatus {
    if revoked {
        return CertificateStatus::Revoked;
    }
    if !ledger_valid {
        return CertificateStatus::Invalid;
    }
    match expires_at {
        Some(expiry) if expiry < now => CertificateStatus::Expired,
        _ => CertificateStatus::Valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn revocation_outranks_everything() {
        let past = Some(now() - Duration::days(1));
        assert_eq!(derive_status(true, false, past, now()), CertificateStatus::Revoked);
        assert_eq!(derive_status(true, true, None, now()), CertificateStatus::Revoked);
    }

    #[test]
    fn ledger_invalid_outranks_expiry() {
        let past = Some(now() - Duration::days(1));
        assert_eq!(derive_status(false, false, past, now()), CertificateStatus::Invalid);
    }

    #[test]
    fn expiry_applies_only_to_past_dates() {
        assert_eq!(
            derive_status(false, true, Some(now() - Duration::seconds(1)), now()),
            CertificateStatus::Expired
        );
        assert_eq!(
            derive_status(false, true, Some(now() + Duration::days(365)), now()),
            CertificateStatus::Valid
        );
        assert_eq!(derive_status(false, true, None, now()), CertificateStatus::Valid);
        // expiring exactly now is not yet expired
        assert_eq!(derive_status(false, true, Some(now()), now()), CertificateStatus::Valid);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CertificateStatus::Revoked).unwrap(),
            "\"revoked\""
        );
    }
}
