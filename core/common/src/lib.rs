//! Common types shared across the Homekeep secret core.
//!
//! This module provides the caller identity, record identifiers and the
//! error taxonomy every other crate reports through.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{RecordId, Role, SecretKind, SensitiveBytes, Subject, SubjectId};
