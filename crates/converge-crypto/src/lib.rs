//! Converge Crypto - Cryptographic primitives for agent identity and messaging
//!
//! This crate provides:
//! - Ed25519 identities with SHA-256 fingerprints
//! - Detached signing and verification over canonical message bytes
//! - AES-256-GCM payload encryption
//! - PBKDF2 key derivation and secure random bytes
//!
//! # Security Invariant
//!
//! **The private half of an identity never crosses a crate boundary.**
//! Callers sign through `Identity::sign`; raw key bytes are only exported
//! for secure storage.

pub mod hash;
pub mod identity;
pub mod kdf;
pub mod random;
pub mod symmetric;

pub use hash::*;
pub use identity::*;
pub use kdf::*;
pub use random::*;
pub use symmetric::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Missing private key: {0}")]
    MissingPrivateKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
