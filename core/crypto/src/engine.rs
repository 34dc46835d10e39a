//! Cipher engine bound to the process key.

use crate::cipher::{self, CipherSuite, SealedSecret};
use crate::keys::ProcessKey;
use homekeep_common::{Result, SensitiveBytes};

/// Encrypt/decrypt seam used by the disclosure services.
///
/// Implementations hold their own key; callers never see it.
pub trait SecretCipher: Send + Sync {
    /// Encrypt a new value under a fresh IV.
    fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret>;

    /// Decrypt a stored value.
    ///
    /// # Errors
    /// - `Error::Crypto` on a wrong IV length, tampered data, or key mismatch
    fn open(&self, suite: CipherSuite, ciphertext: &[u8], iv: &[u8]) -> Result<SensitiveBytes>;
}

/// Stateless cipher engine holding the injected process key.
pub struct CipherEngine {
    key: ProcessKey,
}

impl CipherEngine {
    /// Create an engine for the given key.
    pub fn new(key: ProcessKey) -> Self {
        Self { key }
    }
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("suite", &CipherSuite::default())
            .finish_non_exhaustive()
    }
}

impl SecretCipher for CipherEngine {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret> {
        cipher::encrypt(&self.key, plaintext)
    }

    fn open(&self, suite: CipherSuite, ciphertext: &[u8], iv: &[u8]) -> Result<SensitiveBytes> {
        cipher::decrypt(&self.key, suite, ciphertext, iv).map(SensitiveBytes::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;
    use homekeep_common::Error;

    #[test]
    fn test_engine_roundtrip() {
        let engine = CipherEngine::new(ProcessKey::from_bytes([3u8; KEY_LENGTH]));
        let sealed = engine.seal(b"guest-network").unwrap();
        let opened = engine.open(sealed.suite, &sealed.ciphertext, &sealed.iv).unwrap();

        assert_eq!(opened.as_bytes(), b"guest-network");
    }

    #[test]
    fn test_engines_with_distinct_keys_are_isolated() {
        let first = CipherEngine::new(ProcessKey::from_bytes([1u8; KEY_LENGTH]));
        let second = CipherEngine::new(ProcessKey::from_bytes([2u8; KEY_LENGTH]));

        let sealed = first.seal(b"api-token").unwrap();
        let result = second.open(sealed.suite, &sealed.ciphertext, &sealed.iv);

        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let engine = CipherEngine::new(ProcessKey::from_bytes([0xAB; KEY_LENGTH]));
        let rendered = format!("{:?}", engine);
        assert!(!rendered.to_lowercase().contains("abab"));
        assert!(!rendered.contains("171"));
    }
}
