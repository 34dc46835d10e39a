//! Secret record storage for Homekeep.
//!
//! This module provides a trait-based interface over the tables holding
//! encrypted values, plus in-memory and SQLite implementations.
//!
//! # Design Principles
//! - Listing and disclosure use different types: [`ListView`] and
//!   [`RecordMetadata`] have no ciphertext or IV fields, so a list response
//!   cannot carry them
//! - Every mutation touches exactly one row and is atomic
//! - Ciphertext and IV are stored as lowercase hex

pub mod memory;
pub mod model;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use model::{
    DecryptableView, ListView, MetadataUpdate, NewRecord, RecordMetadata, SecretRecord,
    SystemTokenRecord, SystemTokenView, TokenName,
};
pub use sqlite::SqliteStore;
pub use store::{SecretStore, SystemTokenStore};
