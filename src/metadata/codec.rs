use super::schema::*;
use crate::clock::Clock;
use crate::error::CodecError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps issuance input onto the canonical metadata document and back.
///
/// Encoding never performs I/O; the only ambient input is the injected clock.
#[derive(Clone)]
pub struct MetadataCodec {
    clock: Arc<dyn Clock>,
    network_id: u64,
    contract_address: String,
}

impl MetadataCodec {
    pub fn new(clock: Arc<dyn Clock>, network_id: u64, contract_address: impl Into<String>) -> Self {
        Self {
            clock,
            network_id,
            contract_address: contract_address.into(),
        }
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn encode(&self, input: &CertificateInput) -> Result<CertificateMetadata, CodecError> {
        if input.recipient_wallet.trim().is_empty() {
            return Err(CodecError::invalid("recipient.walletAddress", "is required"));
        }
        if !is_ledger_address(input.recipient_wallet.trim()) {
            return Err(CodecError::invalid(
                "recipient.walletAddress",
                format!("'{}' is not a ledger address", input.recipient_wallet),
            ));
        }
        if !is_ledger_address(input.issuer_wallet.trim()) {
            return Err(CodecError::invalid(
                "issuer.walletAddress",
                format!("'{}' is not a ledger address", input.issuer_wallet),
            ));
        }
        if let Some(expiry) = input.expiry_date {
            if expiry.timestamp() <= 0 {
                return Err(CodecError::invalid(
                    "credential.expiryDate",
                    "must be after the epoch",
                ));
            }
        }

        let now = self.clock.now();
        Ok(CertificateMetadata {
            schema_version: SCHEMA_VERSION.to_string(),
            recipient: Recipient {
                name: non_blank(&input.recipient_name, RECIPIENT_PLACEHOLDER),
                wallet_address: input.recipient_wallet.trim().to_string(),
            },
            credential: Credential {
                title: non_blank(&input.title, TITLE_PLACEHOLDER),
                description: input.description.clone().unwrap_or_default(),
                issue_date: input.issue_date.unwrap_or(now),
                expiry_date: input.expiry_date,
                credential_type: non_blank(&input.credential_type, DEFAULT_CREDENTIAL_TYPE),
            },
            issuer: Issuer {
                name: non_blank(&input.issuer_name, ISSUER_PLACEHOLDER),
                website: optional(&input.issuer_website),
                wallet_address: input.issuer_wallet.trim().to_string(),
                logo_locator: optional(&input.issuer_logo_locator),
            },
            additional: input.additional.clone(),
            verification: VerificationInfo {
                ledger_network_id: self.network_id,
                contract_address: self.contract_address.clone(),
            },
            created_at: now,
            updated_at: now,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<CertificateMetadata, CodecError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::MalformedMetadata(format!("not json: {}", e)))?;

        let version = value
            .get("schemaVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::MalformedMetadata("missing schemaVersion".to_string()))?;
        check_version(version)?;

        let metadata: CertificateMetadata = serde_json::from_value(value)
            .map_err(|e| CodecError::MalformedMetadata(e.to_string()))?;
        if metadata.recipient.wallet_address.is_empty() {
            return Err(CodecError::MalformedMetadata(
                "recipient.walletAddress is empty".to_string(),
            ));
        }
        Ok(metadata)
    }
}

/// Serializes with object keys sorted at every depth, so equal documents
/// always produce equal bytes.
pub fn canonical_bytes(metadata: &CertificateMetadata) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(metadata)
        .map_err(|e| CodecError::MalformedMetadata(e.to_string()))?;
    serde_json::to_vec(&sorted(value)).map_err(|e| CodecError::MalformedMetadata(e.to_string()))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            let mut out = Map::new();
            for (k, v) in ordered {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn check_version(found: &str) -> Result<(), CodecError> {
    let (major, _) = parse_version(found)
        .ok_or_else(|| CodecError::MalformedMetadata(format!("bad schemaVersion '{}'", found)))?;
    let (supported_major, _) = parse_version(SCHEMA_VERSION).unwrap_or((1, 0));
    // newer minors only add optional fields
    if major > supported_major {
        return Err(CodecError::UnsupportedSchemaVersion {
            found: found.to_string(),
            supported: SCHEMA_VERSION.to_string(),
        });
    }
    Ok(())
}

/// `0x` followed by 20 hex-encoded bytes.
pub fn is_ledger_address(candidate: &str) -> bool {
    match candidate.strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

fn non_blank(value: &Option<String>, placeholder: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => placeholder.to_string(),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    const RECIPIENT: &str = "0x1111111111111111111111111111111111111111";
    const ISSUER: &str = "0x2222222222222222222222222222222222222222";

    fn codec() -> MetadataCodec {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap());
        MetadataCodec::new(Arc::new(clock), 80002, "0x3333333333333333333333333333333333333333")
    }

    #[test]
    fn encode_fills_placeholders_and_stamps_context() {
        let input = CertificateInput::new(RECIPIENT, ISSUER);
        let metadata = codec().encode(&input).unwrap();

        assert_eq!(metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(metadata.recipient.name, RECIPIENT_PLACEHOLDER);
        assert_eq!(metadata.credential.title, TITLE_PLACEHOLDER);
        assert_eq!(metadata.issuer.name, ISSUER_PLACEHOLDER);
        assert_eq!(metadata.verification.ledger_network_id, 80002);
        assert_eq!(metadata.created_at, metadata.updated_at);
        assert_eq!(metadata.credential.issue_date, metadata.created_at);
    }

    #[test]
    fn blank_recipient_name_becomes_placeholder() {
        let input = CertificateInput::new(RECIPIENT, ISSUER).with_recipient_name("   ");
        let metadata = codec().encode(&input).unwrap();
        assert_eq!(metadata.recipient.name, RECIPIENT_PLACEHOLDER);
    }

    #[test]
    fn encode_rejects_missing_or_bad_addresses() {
        let missing = CertificateInput::new("", ISSUER);
        assert!(matches!(
            codec().encode(&missing),
            Err(CodecError::InvalidInput { field: "recipient.walletAddress", .. })
        ));

        let bad_issuer = CertificateInput::new(RECIPIENT, "0xnothex");
        assert!(matches!(
            codec().encode(&bad_issuer),
            Err(CodecError::InvalidInput { field: "issuer.walletAddress", .. })
        ));
    }

    #[test]
    fn decode_of_canonical_encoding_preserves_fields() {
        let mut input = CertificateInput::new(RECIPIENT, ISSUER)
            .with_recipient_name("Ada Lovelace")
            .with_title("Analytical Engines 101")
            .with_issuer_name("Difference Academy")
            .with_expiry(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap());
        input.description = Some("Completed with distinction".into());
        input.issuer_website = Some("https://academy.example".into());
        input.issuer_logo_locator = Some("ar:logo123".into());
        input.additional.insert("grade".into(), json!("A"));
        input.additional.insert("credits".into(), json!(12));

        let encoded = codec().encode(&input).unwrap();
        let bytes = canonical_bytes(&encoded).unwrap();
        let decoded = MetadataCodec::decode(&bytes).unwrap();

        assert_eq!(decoded, encoded);
        assert_eq!(decoded.recipient.name, "Ada Lovelace");
        assert_eq!(decoded.additional["credits"], json!(12));
    }

    #[test]
    fn canonical_bytes_sort_keys() {
        let metadata = codec().encode(&CertificateInput::new(RECIPIENT, ISSUER)).unwrap();
        let text = String::from_utf8(canonical_bytes(&metadata).unwrap()).unwrap();
        let additional = text.find("\"additional\"").unwrap();
        let verification = text.find("\"verification\"").unwrap();
        let created = text.find("\"createdAt\"").unwrap();
        assert!(additional < created && created < verification);
    }

    #[test]
    fn decode_rejects_garbage_and_newer_major_versions() {
        assert!(matches!(
            MetadataCodec::decode(b"not json"),
            Err(CodecError::MalformedMetadata(_))
        ));
        assert!(matches!(
            MetadataCodec::decode(br#"{"recipient":{}}"#),
            Err(CodecError::MalformedMetadata(_))
        ));

        let metadata = codec().encode(&CertificateInput::new(RECIPIENT, ISSUER)).unwrap();
        let mut value = serde_json::to_value(&metadata).unwrap();
        value["schemaVersion"] = json!("2.0");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            MetadataCodec::decode(&bytes),
            Err(CodecError::UnsupportedSchemaVersion { .. })
        ));

        value["schemaVersion"] = json!("1.4");
        value["futureField"] = json!(true);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(MetadataCodec::decode(&bytes).is_ok());
    }

    #[test]
    fn expiry_before_issue_is_allowed() {
        let yesterday = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap() - Duration::days(1);
        let input = CertificateInput::new(RECIPIENT, ISSUER).with_expiry(yesterday);
        let metadata = codec().encode(&input).unwrap();
        assert_eq!(metadata.credential.expiry_date, Some(yesterday));
    }
}
