use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Storage network a locator points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Arweave,
    Ipfs,
    Local,
}

impl BackendKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::Arweave => "ar",
            BackendKind::Ipfs => "ipfs",
            BackendKind::Local => "local",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ar" | "arweave" => Some(BackendKind::Arweave),
            "ipfs" => Some(BackendKind::Ipfs),
            "local" | "mock" => Some(BackendKind::Local),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Backend-qualified reference to a stored metadata document, as returned by
/// the store that accepted the write. Bare identifiers (no scheme) are the
/// legacy format and carry no backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocator {
    backend: Option<BackendKind>,
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid storage locator '{0}'")]
pub struct LocatorParseError(pub String);

impl StorageLocator {
    pub fn new(backend: BackendKind, id: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            id: id.into(),
        }
    }

    pub fn legacy(id: impl Into<String>) -> Self {
        Self {
            backend: None,
            id: id.into(),
        }
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_legacy(&self) -> bool {
        self.backend.is_none()
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            Some(kind) => write!(f, "{}://{}", kind.scheme(), self.id),
            None => f.write_str(&self.id),
        }
    }
}

impl FromStr for StorageLocator {
    type Err = LocatorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LocatorParseError(raw.to_string()));
        }

        let Some((scheme, rest)) = raw.split_once(':') else {
            return Ok(StorageLocator::legacy(raw));
        };
        let kind = BackendKind::from_scheme(&scheme.to_ascii_lowercase())
            .ok_or_else(|| LocatorParseError(raw.to_string()))?;
        let id = rest.strip_prefix("//").unwrap_or(rest);
        if !is_valid_id(id) {
            return Err(LocatorParseError(raw.to_string()));
        }
        Ok(StorageLocator::new(kind, id))
    }
}

/// An id may be a path below a content root (`<cid>/metadata.json`), but
/// every segment must be non-empty and none may climb out of the root.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

impl Serialize for StorageLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorageLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_locators_round_trip() {
        let locator: StorageLocator = "ar://bNbA3TEQVL60xlgCcqdz4ZPHFZ711cZ3hmkpGttDt_U".parse().unwrap();
        assert_eq!(locator.backend(), Some(BackendKind::Arweave));
        assert_eq!(locator.to_string().parse::<StorageLocator>().unwrap(), locator);

        let short: StorageLocator = "local:mock_00ff".parse().unwrap();
        assert_eq!(short, StorageLocator::new(BackendKind::Local, "mock_00ff"));
        assert_eq!(short.to_string(), "local://mock_00ff");
    }

    #[test]
    fn bare_identifiers_are_legacy() {
        let locator: StorageLocator = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".parse().unwrap();
        assert!(locator.is_legacy());
        assert_eq!(locator.to_string(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
    }

    #[test]
    fn unknown_schemes_and_empty_ids_are_rejected() {
        assert!("ftp://abc".parse::<StorageLocator>().is_err());
        assert!("ar://".parse::<StorageLocator>().is_err());
        assert!("".parse::<StorageLocator>().is_err());
    }

    #[test]
    fn paths_below_a_content_root_are_kept() {
        let raw = "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/metadata.json";
        let locator: StorageLocator = raw.parse().unwrap();
        assert_eq!(locator.backend(), Some(BackendKind::Ipfs));
        assert_eq!(
            locator.id(),
            "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/metadata.json"
        );
        assert_eq!(locator.to_string(), raw);

        let legacy: StorageLocator = "QmRoot/certs/1.json".parse().unwrap();
        assert!(legacy.is_legacy());
        assert_eq!(legacy.id(), "QmRoot/certs/1.json");
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for raw in [
            "ipfs:///metadata.json",
            "ipfs://cid/",
            "ipfs://cid//metadata.json",
            "ar://tx/../other",
        ] {
            assert!(raw.parse::<StorageLocator>().is_err(), "{}", raw);
        }
    }

    #[test]
    fn serde_uses_the_string_form() {
        let locator = StorageLocator::new(BackendKind::Ipfs, "bafy123");
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"ipfs://bafy123\"");
        let back: StorageLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
    }
}
