//! Common types used throughout Homekeep.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Opaque identifier of an authenticated household member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Create a new SubjectId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::Validation(
                "SubjectId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored secret record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw row id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw row id.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Household role of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "PARENT",
            Role::Child => "CHILD",
        }
    }

    /// Parse the wire representation (case-insensitive).
    pub fn parse(value: &str) -> crate::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PARENT" => Ok(Role::Parent),
            "CHILD" => Ok(Role::Child),
            other => Err(crate::Error::Validation(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind tag of an entity holding an encrypted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecretKind {
    /// Login password for a website or service.
    Credential,
    /// Wi-Fi passphrase.
    NetworkKey,
    /// Process-wide external-service token, admin only.
    SystemToken,
}

impl SecretKind {
    /// Wire and storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Credential => "CREDENTIAL",
            SecretKind::NetworkKey => "NETWORK_KEY",
            SecretKind::SystemToken => "SYSTEM_TOKEN",
        }
    }

    /// Parse the storage representation.
    pub fn parse(value: &str) -> crate::Result<Self> {
        match value {
            "CREDENTIAL" => Ok(SecretKind::Credential),
            "NETWORK_KEY" => Ok(SecretKind::NetworkKey),
            "SYSTEM_TOKEN" => Ok(SecretKind::SystemToken),
            other => Err(crate::Error::Validation(format!(
                "Unknown secret kind: {}",
                other
            ))),
        }
    }

    /// Whether records of this kind belong to a household member.
    pub fn is_owned(&self) -> bool {
        !matches!(self, SecretKind::SystemToken)
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a request.
///
/// Built once per request by the identity layer and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    id: SubjectId,
    role: Role,
    is_admin: bool,
}

impl Subject {
    /// Create a subject.
    pub fn new(id: SubjectId, role: Role, is_admin: bool) -> Self {
        Self { id, role, is_admin }
    }

    /// Subject identifier.
    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    /// Household role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the subject may manage system tokens.
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the bytes as UTF-8 text.
    ///
    /// # Errors
    /// - Returns error if the bytes are not valid UTF-8
    pub fn as_utf8(&self) -> crate::Result<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|_| crate::Error::Internal("Secret is not valid UTF-8".to_string()))
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_subject_id_creation() {
        let id = SubjectId::new("user-7").unwrap();
        assert_eq!(id.as_str(), "user-7");
    }

    #[test]
    fn test_subject_id_empty_fails() {
        assert!(SubjectId::new("").is_err());
        assert!(SubjectId::new("   ").is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("PARENT").unwrap(), Role::Parent);
        assert_eq!(Role::parse("child").unwrap(), Role::Child);
        assert!(Role::parse("GUEST").is_err());
    }

    #[test]
    fn test_secret_kind_parse() {
        assert_eq!(
            SecretKind::parse("NETWORK_KEY").unwrap(),
            SecretKind::NetworkKey
        );
        assert!(SecretKind::parse("network_key").is_err());
        assert!(!SecretKind::SystemToken.is_owned());
        assert!(SecretKind::Credential.is_owned());
    }

    #[test]
    fn test_secret_kind_serde_matches_storage_tag() {
        let json = serde_json::to_string(&SecretKind::NetworkKey).unwrap();
        assert_eq!(json, "\"NETWORK_KEY\"");
    }

    #[test]
    fn test_sensitive_bytes_debug_redacted() {
        let secret = SensitiveBytes::from("hunter2");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("7 bytes"));
    }

    #[test]
    fn test_sensitive_bytes_utf8() {
        let secret = SensitiveBytes::from("s3cr3t!");
        assert_eq!(secret.as_utf8().unwrap(), "s3cr3t!");

        let invalid = SensitiveBytes::new(vec![0xFF, 0xFE]);
        assert!(invalid.as_utf8().is_err());
    }

    proptest! {
        #[test]
        fn prop_subject_id_accepts_visible_ids(id in "[a-zA-Z0-9_-]{1,40}") {
            let subject_id = SubjectId::new(id.clone()).unwrap();
            prop_assert_eq!(subject_id.as_str(), id.as_str());
        }
    }
}
