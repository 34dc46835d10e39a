//! Process key with secure memory handling.
//!
//! The key is loaded once at startup and injected into the cipher engine.
//! It zeroizes its memory on drop and has no serializer.

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use homekeep_common::{Error, Result};

/// Length of the process key in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the hex form of the process key.
pub const KEY_HEX_LENGTH: usize = KEY_LENGTH * 2;

/// Symmetric key protecting every stored secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProcessKey {
    key: [u8; KEY_LENGTH],
}

impl ProcessKey {
    /// Create a process key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Parse the 64-character hex form supplied through the environment.
    ///
    /// # Errors
    /// - Returns error if the value is not exactly 64 hex characters
    ///
    /// # Security
    /// The rejected value is never echoed in the error message.
    pub fn from_hex(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != KEY_HEX_LENGTH {
            return Err(Error::Config(format!(
                "Process key must be {} hex characters, got {}",
                KEY_HEX_LENGTH,
                value.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        if hex::decode_to_slice(value, &mut key).is_err() {
            key.zeroize();
            return Err(Error::Config(
                "Process key contains non-hex characters".to_string(),
            ));
        }

        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Constant-time comparison against another key.
    pub fn ct_eq(&self, other: &ProcessKey) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl fmt::Debug for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessKey([REDACTED])")
    }
}

/// Generate a fresh random key in its 64-character hex form.
///
/// Used when provisioning a new installation; the result belongs in the
/// secret store or environment, never in logs.
pub fn generate_hex() -> Zeroizing<String> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    OsRng.fill_bytes(&mut key[..]);
    Zeroizing::new(hex::encode(&key[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_from_hex() {
        let key = ProcessKey::from_hex(SAMPLE_HEX).unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[31], 0x1f);
    }

    #[test]
    fn test_from_hex_trims_whitespace() {
        let padded = format!("  {}\n", SAMPLE_HEX);
        assert!(ProcessKey::from_hex(&padded).is_ok());
    }

    #[test]
    fn test_from_hex_wrong_length() {
        let err = ProcessKey::from_hex(&SAMPLE_HEX[..62]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_hex_non_hex() {
        let bad = format!("zz{}", &SAMPLE_HEX[2..]);
        let err = ProcessKey::from_hex(&bad).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.to_string().contains(&bad));
    }

    #[test]
    fn test_debug_redacted() {
        let key = ProcessKey::from_hex(SAMPLE_HEX).unwrap();
        let rendered = format!("{:?}", key);
        assert_eq!(rendered, "ProcessKey([REDACTED])");
    }

    #[test]
    fn test_generate_hex() {
        let first = generate_hex();
        let second = generate_hex();

        assert_eq!(first.len(), KEY_HEX_LENGTH);
        assert_ne!(first.as_str(), second.as_str());

        let parsed = ProcessKey::from_hex(&first).unwrap();
        let again = ProcessKey::from_hex(&first).unwrap();
        assert!(parsed.ct_eq(&again));
    }
}
