//! Key derivation utilities

use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Derive a key from a password using PBKDF2-HMAC-SHA256
///
/// Use at least 16 bytes of random salt.
pub fn derive_key(password: &str, salt: &[u8], length: usize, iterations: u32) -> Vec<u8> {
    let mut out = vec![0u8; length];
    // The hmac-backed pbkdf2 only fails on zero-length output.
    let _ = pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Derive a 32-byte payload-encryption key with default iterations
pub fn derive_payload_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let derived = derive_key(password, salt, 32, DEFAULT_ITERATIONS);
    let mut key = [0u8; 32];
    key.copy_from_slice(&derived);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_same_inputs() {
        let a = derive_key("password", b"0123456789abcdef", 32, 1000);
        let b = derive_key("password", b"0123456789abcdef", 32, 1000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_salt_changes_output() {
        let a = derive_key("password", b"salt-one-16bytes", 32, 1000);
        let b = derive_key("password", b"salt-two-16bytes", 32, 1000);
        assert_ne!(a, b);
    }
}
