use crate::config::ConfigError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Signing key that authorizes uploads to the primary storage network.
///
/// The key is handed in by configuration; how it was obtained (faucet, wallet
/// export, KMS) is outside this crate.
pub struct UploadSigner {
    signing_key: SigningKey,
}

impl UploadSigner {
    pub fn from_hex(secret: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| ConfigError::InvalidCredential(format!("signer key is not hex: {}", e)))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ConfigError::InvalidCredential(format!(
                "signer key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }

    pub fn verify(public_key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
        let Ok(pk_bytes) = <&[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(sig_bytes) = <&[u8; 64]>::try_from(signature) else {
            return false;
        };
        match VerifyingKey::from_bytes(pk_bytes) {
            Ok(pk) => pk.verify(payload, &Signature::from_bytes(sig_bytes)).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for UploadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_verify_against_the_public_key() {
        let signer = UploadSigner::generate();
        let payload = br#"{"schemaVersion":"1.0"}"#;
        let signature = signer.sign(payload);
        let public_key = hex::decode(signer.public_key_hex()).unwrap();

        assert!(UploadSigner::verify(&public_key, payload, &signature));
        assert!(!UploadSigner::verify(&public_key, b"tampered", &signature));
    }

    #[test]
    fn hex_keys_round_trip() {
        let signer = UploadSigner::generate();
        let restored = UploadSigner::from_hex(&signer.secret_hex()).unwrap();
        assert_eq!(restored.public_key_hex(), signer.public_key_hex());
    }

    #[test]
    fn malformed_keys_fail_fast() {
        assert!(matches!(
            UploadSigner::from_hex("zz"),
            Err(ConfigError::InvalidCredential(_))
        ));
        assert!(matches!(
            UploadSigner::from_hex("00ff"),
            Err(ConfigError::InvalidCredential(_))
        ));
    }
}
