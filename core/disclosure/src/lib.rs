//! Disclosure control for the Homekeep secret core.
//!
//! This module provides:
//! - [`DisclosureService`]: reveal, store, rotate and delete household secrets
//! - [`SystemTokenService`]: the same discipline for admin-only system tokens
//! - [`CipherUpgrade`]: re-encryption of rows still under the legacy suite
//! - [`AppConfig`]: process configuration read from the environment
//!
//! # Security Guarantees
//! - The access decision is made before any decrypt or encrypt call
//! - Plaintext is returned once to the caller and never logged or cached
//! - Decrypt failures surface as `Error::Internal`, never as not-found

pub mod config;
pub mod disclosure;
pub mod system;
pub mod upgrade;

pub use config::AppConfig;
pub use disclosure::{DisclosureService, NewSecret};
pub use system::SystemTokenService;
pub use upgrade::{CipherUpgrade, UpgradeReport};
