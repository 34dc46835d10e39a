//! Record shapes for listing and disclosure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use homekeep_access::Resource;
use homekeep_common::{Error, RecordId, Result, SecretKind, SubjectId};
use homekeep_crypto::{CipherSuite, SealedSecret};

/// Maximum length of a system token name.
pub const MAX_TOKEN_NAME_LENGTH: usize = 64;

/// A record to be inserted. The value is already encrypted.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Creator of the record.
    pub owner_id: SubjectId,
    /// Credential or network key.
    pub kind: SecretKind,
    /// Display title.
    pub title: String,
    /// Associated login, if any.
    pub username: Option<String>,
    /// Associated URL or SSID, if any.
    pub url: Option<String>,
    /// Whether children may reveal the value.
    pub visible_to_child: bool,
    /// Encrypted value.
    pub sealed: SealedSecret,
}

/// Non-secret fields of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    pub id: RecordId,
    pub owner_id: SubjectId,
    pub kind: SecretKind,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub visible_to_child: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMetadata {
    /// Policy view of this record.
    pub fn resource(&self) -> Resource {
        Resource::owned(self.kind, self.owner_id.clone(), self.visible_to_child)
    }
}

/// Metadata-only projection returned by list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    #[serde(flatten)]
    pub metadata: RecordMetadata,
    /// Whether the caller would be allowed to reveal the value.
    pub revealable: bool,
}

/// A full record, including the encrypted value.
///
/// Only the single-record disclosure path obtains one. It deliberately has
/// no `Serialize` implementation, and its `Debug` output omits the payload.
#[derive(Clone)]
pub struct SecretRecord {
    pub metadata: RecordMetadata,
    pub suite: CipherSuite,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("metadata", &self.metadata)
            .field("suite", &self.suite)
            .field("ciphertext", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Alias naming the ciphertext-bearing projection.
pub type DecryptableView = SecretRecord;

impl SecretRecord {
    /// Record identifier.
    pub fn id(&self) -> RecordId {
        self.metadata.id
    }

    /// Policy view of this record.
    pub fn resource(&self) -> Resource {
        self.metadata.resource()
    }
}

/// Partial update of a record's non-secret fields.
///
/// `None` leaves a field unchanged; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub username: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub visible_to_child: Option<bool>,
}

impl MetadataUpdate {
    /// Update that only toggles child visibility.
    pub fn visibility(visible_to_child: bool) -> Self {
        Self {
            visible_to_child: Some(visible_to_child),
            ..Self::default()
        }
    }

    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.url.is_none()
            && self.visible_to_child.is_none()
    }

    /// Apply to a metadata value in place.
    pub fn apply(&self, metadata: &mut RecordMetadata, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            metadata.title = title.clone();
        }
        if let Some(username) = &self.username {
            metadata.username = username.clone();
        }
        if let Some(url) = &self.url {
            metadata.url = url.clone();
        }
        if let Some(visible) = self.visible_to_child {
            metadata.visible_to_child = visible;
        }
        metadata.updated_at = now;
    }
}

/// Name of a process-wide system token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TokenName(String);

impl TokenName {
    /// Validate a token name.
    ///
    /// # Errors
    /// - Returns error if empty, longer than MAX_TOKEN_NAME_LENGTH, or
    ///   containing characters outside `[A-Za-z0-9_.-]`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation("Token name cannot be empty".to_string()));
        }
        if name.len() > MAX_TOKEN_NAME_LENGTH {
            return Err(Error::Validation(format!(
                "Token name exceeds {} characters",
                MAX_TOKEN_NAME_LENGTH
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(Error::Validation(
                "Token name may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored system token, including its encrypted value.
#[derive(Clone)]
pub struct SystemTokenRecord {
    pub name: TokenName,
    pub suite: CipherSuite,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for SystemTokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTokenRecord")
            .field("name", &self.name)
            .field("suite", &self.suite)
            .field("ciphertext", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl SystemTokenRecord {
    /// Policy view of a system token.
    pub fn resource(&self) -> Resource {
        Resource::system_token()
    }
}

/// Listing projection of a system token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemTokenView {
    pub name: TokenName,
    pub updated_at: DateTime<Utc>,
}
