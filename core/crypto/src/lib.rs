//! Cipher engine for the Homekeep secret core.
//!
//! This module provides:
//! - The process-wide key with automatic zeroization
//! - AES-256-GCM sealing with a fresh 16-byte IV per call
//! - Read support for rows written under legacy AES-256-CBC
//! - The [`SecretCipher`] seam the services receive by injection
//!
//! # Security Guarantees
//! - Key material is zeroized on drop and never logged or serialized
//! - IVs come from the OS random source and are never all-zero
//! - Decryption is all-or-nothing: a failed tag or padding check returns an
//!   error, never partial plaintext

pub mod cipher;
pub mod engine;
pub mod keys;

pub use cipher::{decrypt, encrypt, encrypt_legacy_cbc, CipherSuite, SealedSecret, IV_LENGTH, TAG_SIZE};
pub use engine::{CipherEngine, SecretCipher};
pub use keys::{ProcessKey, KEY_LENGTH};
