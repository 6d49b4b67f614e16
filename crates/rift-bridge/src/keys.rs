//! Desktop public key sent to each peer as the bootstrap frame.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use p256::pkcs8::EncodePublicKey;
use p256::SecretKey;

use crate::error::{BridgeError, Result};

/// Source of the public key peers use to set up their secure channel.
pub trait PublicKeySource: Send + Sync {
    /// SPKI DER, base64-encoded.
    fn export_public_key(&self) -> Result<String>;
}

/// P-256 ECDH key generated per process and never persisted.
pub struct EphemeralKeyPair {
    secret: SecretKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            secret: SecretKey::random(&mut rng),
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl Default for EphemeralKeyPair {
    fn default() -> Self {
        Self::generate()
    }
}

impl PublicKeySource for EphemeralKeyPair {
    fn export_public_key(&self) -> Result<String> {
        let spki_der = self
            .secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| BridgeError::Session(format!("public key export failed: {e}")))?;
        Ok(B64.encode(spki_der.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::DecodePublicKey;
    use p256::PublicKey;

    #[test]
    fn exported_key_is_valid_spki() {
        let pair = EphemeralKeyPair::generate();
        let b64 = pair.export_public_key().unwrap();
        let der = B64.decode(&b64).unwrap();
        let decoded = PublicKey::from_public_key_der(&der).unwrap();
        assert_eq!(decoded, pair.secret_key().public_key());
    }

    #[test]
    fn export_is_stable_for_one_pair() {
        let pair = EphemeralKeyPair::generate();
        assert_eq!(
            pair.export_public_key().unwrap(),
            pair.export_public_key().unwrap()
        );
    }

    #[test]
    fn separate_pairs_differ() {
        let a = EphemeralKeyPair::generate().export_public_key().unwrap();
        let b = EphemeralKeyPair::generate().export_public_key().unwrap();
        assert_ne!(a, b);
    }
}
