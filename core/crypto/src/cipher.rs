//! Symmetric encryption of stored secrets.
//!
//! New values are sealed with AES-256-GCM using a 16-byte random IV; the
//! 16-byte authentication tag is appended to the ciphertext. Values written
//! by earlier releases under AES-256-CBC/PKCS#7 remain decryptable so they
//! can be upgraded in place.

use aes::Aes256;
use aes_gcm::aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit};
use aes_gcm::AesGcm;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::ProcessKey;
use homekeep_common::{Error, Result};

/// IV size for every suite (16 bytes).
pub const IV_LENGTH: usize = 16;

/// Authentication tag size appended by AES-256-GCM (16 bytes).
pub const TAG_SIZE: usize = 16;

/// AES-256-GCM parameterized for a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Algorithm tag persisted next to every ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CipherSuite {
    /// AES-256-GCM, 16-byte IV, tag appended to the ciphertext.
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// AES-256-CBC with PKCS#7 padding and no MAC. Read-only.
    #[serde(rename = "aes-256-cbc")]
    LegacyAes256Cbc,
}

impl CipherSuite {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::LegacyAes256Cbc => "aes-256-cbc",
        }
    }

    /// Parse the storage representation.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "aes-256-gcm" => Ok(CipherSuite::Aes256Gcm),
            "aes-256-cbc" => Ok(CipherSuite::LegacyAes256Cbc),
            other => Err(Error::Crypto(format!("Unknown cipher suite: {}", other))),
        }
    }

    /// Whether values under this suite should be re-encrypted.
    pub fn is_legacy(&self) -> bool {
        matches!(self, CipherSuite::LegacyAes256Cbc)
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one encryption: ciphertext plus the IV it was produced under.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSecret {
    /// Algorithm that produced the ciphertext.
    pub suite: CipherSuite,
    /// Ciphertext (with tag for GCM).
    pub ciphertext: Vec<u8>,
    /// Fresh random IV.
    pub iv: [u8; IV_LENGTH],
}

impl fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedSecret")
            .field("suite", &self.suite)
            .field("ciphertext", &format_args!("[{} bytes]", self.ciphertext.len()))
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

impl SealedSecret {
    /// Lowercase hex of the ciphertext, as stored.
    pub fn ciphertext_hex(&self) -> String {
        hex::encode(&self.ciphertext)
    }

    /// Lowercase hex of the IV, as stored.
    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }
}

/// Draw a fresh IV from the OS random source.
///
/// An all-zero draw is rejected and redrawn.
pub fn generate_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    loop {
        OsRng.fill_bytes(&mut iv);
        if iv.iter().any(|b| *b != 0) {
            return iv;
        }
    }
}

/// Encrypt plaintext with AES-256-GCM under a fresh IV.
///
/// # Postconditions
/// - The IV is randomly generated and never all-zero
/// - The ciphertext length is plaintext length + TAG_SIZE
///
/// # Errors
/// - Returns error if encryption fails
pub fn encrypt(key: &ProcessKey, plaintext: &[u8]) -> Result<SealedSecret> {
    let iv = generate_iv();
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key.as_bytes()));

    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&iv), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(SealedSecret {
        suite: CipherSuite::Aes256Gcm,
        ciphertext,
        iv,
    })
}

/// Decrypt a stored ciphertext.
///
/// # Preconditions
/// - `iv` must be exactly IV_LENGTH bytes
///
/// # Errors
/// - Returns error if the IV length is wrong
/// - Returns error if authentication or padding fails (tampered data, wrong
///   IV, or wrong key)
///
/// # Security
/// - GCM verifies the tag before any plaintext is released
/// - No partial plaintext is ever returned
pub fn decrypt(
    key: &ProcessKey,
    suite: CipherSuite,
    ciphertext: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != IV_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid IV length: expected {}, got {}",
            IV_LENGTH,
            iv.len()
        )));
    }

    match suite {
        CipherSuite::Aes256Gcm => {
            if ciphertext.len() < TAG_SIZE {
                return Err(Error::Crypto("Ciphertext too short".to_string()));
            }
            let cipher = Aes256Gcm16::new(GenericArray::from_slice(key.as_bytes()));
            cipher
                .decrypt(GenericArray::from_slice(iv), ciphertext)
                .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
        }
        CipherSuite::LegacyAes256Cbc => {
            let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
                .map_err(|e| Error::Crypto(format!("Invalid key or IV: {}", e)))?;
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| Error::Crypto("Decryption failed: bad padding".to_string()))
        }
    }
}

/// Encrypt with the legacy AES-256-CBC suite.
///
/// # Warning
/// CBC without a MAC cannot detect tampering. This exists only to produce
/// fixtures for the upgrade path; nothing in the service layer writes it.
pub fn encrypt_legacy_cbc(key: &ProcessKey, plaintext: &[u8]) -> Result<SealedSecret> {
    let iv = generate_iv();
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| Error::Crypto(format!("Invalid key or IV: {}", e)))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok(SealedSecret {
        suite: CipherSuite::LegacyAes256Cbc,
        ciphertext,
        iv,
    })
}
