//! Agent identity
//!
//! An identity is the root of trust for an agent: an Ed25519 keypair plus a
//! fingerprint (hex SHA-256 of the public key) that serves as the agent's
//! stable identifier everywhere else in the system. Verify-only identities
//! carry no signing half.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::{sha256_hex, CryptoError, CryptoResult};

/// Cryptographic identity for an agent
#[derive(Clone)]
pub struct Identity {
    verifying_key: VerifyingKey,
    signing_key: Option<SigningKey>,
    fingerprint: String,
}

impl Identity {
    /// Generate a new random identity with both key halves
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();
        let fingerprint = sha256_hex(verifying_key.as_bytes());

        Self {
            verifying_key,
            signing_key: Some(signing_key),
            fingerprint,
        }
    }

    /// Create a verify-only identity from a known public key
    pub fn from_public_key(public_key: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("public key must be 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        let fingerprint = sha256_hex(verifying_key.as_bytes());

        Ok(Self {
            verifying_key,
            signing_key: None,
            fingerprint,
        })
    }

    /// Recreate a full identity from stored signing key bytes
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        let fingerprint = sha256_hex(verifying_key.as_bytes());

        Self {
            verifying_key,
            signing_key: Some(signing_key),
            fingerprint,
        }
    }

    /// The agent's stable identifier: hex SHA-256 of the public key
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Raw public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Whether this identity can sign
    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Signing key bytes, for secure storage only
    pub fn signing_key_bytes(&self) -> Option<[u8; 32]> {
        self.signing_key.as_ref().map(|k| k.to_bytes())
    }

    /// Sign a byte string, producing a 64-byte detached signature
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.signing_key.as_ref().ok_or_else(|| {
            CryptoError::MissingPrivateKey("identity has no private key for signing".into())
        })?;
        let signature = key
            .try_sign(message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    /// Verify a detached signature against this identity's public key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_detached(&self.public_key_bytes(), message, signature)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("fingerprint", &self.fingerprint)
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

/// Verify a detached Ed25519 signature
///
/// Returns false on any structural or cryptographic failure; never errors.
pub fn verify_detached(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_fingerprint() {
        let identity = Identity::generate();
        assert_eq!(identity.fingerprint().len(), 64);
        assert!(identity.can_sign());
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = Identity::generate();
        let sig = identity.sign(b"hello").unwrap();
        assert!(identity.verify(b"hello", &sig));
        assert!(!identity.verify(b"tampered", &sig));
    }

    #[test]
    fn test_wrong_key_rejects() {
        let signer = Identity::generate();
        let other = Identity::generate();
        let sig = signer.sign(b"hello").unwrap();
        assert!(!other.verify(b"hello", &sig));
    }

    #[test]
    fn test_verify_only_identity() {
        let full = Identity::generate();
        let verify_only = Identity::from_public_key(&full.public_key_bytes()).unwrap();
        assert_eq!(verify_only.fingerprint(), full.fingerprint());
        assert!(!verify_only.can_sign());
        assert!(matches!(
            verify_only.sign(b"x"),
            Err(CryptoError::MissingPrivateKey(_))
        ));
    }

    #[test]
    fn test_from_signing_key_bytes_roundtrip() {
        let identity = Identity::generate();
        let bytes = identity.signing_key_bytes().unwrap();
        let restored = Identity::from_signing_key_bytes(&bytes);
        assert_eq!(restored.fingerprint(), identity.fingerprint());
    }

    #[test]
    fn test_verify_detached_malformed_inputs() {
        let identity = Identity::generate();
        assert!(!verify_detached(&[1, 2, 3], b"m", &[0u8; 64]));
        assert!(!verify_detached(&identity.public_key_bytes(), b"m", &[0u8; 10]));
    }
}
