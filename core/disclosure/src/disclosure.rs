//! Disclosure of household secrets.
//!
//! Every operation resolves the record, asks the access policy, and only
//! then touches the cipher. A denied request never reaches `seal` or `open`.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use homekeep_access::{decide, Action, Resource};
use homekeep_common::{Error, RecordId, Result, SecretKind, SensitiveBytes, Subject};
use homekeep_crypto::SecretCipher;
use homekeep_store::{ListView, MetadataUpdate, NewRecord, RecordMetadata, SecretRecord, SecretStore};

/// Maximum length of a record title, in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of a username or URL, in characters.
pub const MAX_FIELD_LENGTH: usize = 2048;

/// Maximum length of a secret value, in bytes.
pub const MAX_SECRET_LENGTH: usize = 4096;

/// Input for storing a new secret.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub kind: SecretKind,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub visible_to_child: bool,
    pub value: SensitiveBytes,
}

impl NewSecret {
    /// A hidden secret with only a title and value.
    pub fn new(kind: SecretKind, title: impl Into<String>, value: SensitiveBytes) -> Self {
        Self {
            kind,
            title: title.into(),
            username: None,
            url: None,
            visible_to_child: false,
            value,
        }
    }

    /// Set the associated username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the associated URL or SSID.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set child visibility.
    pub fn visible_to_child(mut self, visible: bool) -> Self {
        self.visible_to_child = visible;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.kind.is_owned() {
            return Err(Error::Validation(
                "System tokens are managed separately".to_string(),
            ));
        }
        validate_title(&self.title)?;
        validate_field("username", self.username.as_deref())?;
        validate_field("url", self.url.as_deref())?;
        validate_value(&self.value)
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(Error::Validation(format!(
            "Title exceeds {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_field(name: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) if value.chars().count() > MAX_FIELD_LENGTH => Err(Error::Validation(
            format!("{} exceeds {} characters", name, MAX_FIELD_LENGTH),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn validate_value(value: &SensitiveBytes) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation("Secret value cannot be empty".to_string()));
    }
    if value.len() > MAX_SECRET_LENGTH {
        return Err(Error::Validation(format!(
            "Secret value exceeds {} bytes",
            MAX_SECRET_LENGTH
        )));
    }
    Ok(())
}

fn validate_update(update: &MetadataUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(Error::Validation("Nothing to update".to_string()));
    }
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    validate_field("username", update.username.as_ref().and_then(|u| u.as_deref()))?;
    validate_field("url", update.url.as_ref().and_then(|u| u.as_deref()))
}

/// Check `action` against the policy, logging denials.
pub(crate) fn authorize(
    subject: &Subject,
    resource: &Resource,
    action: Action,
    target: &str,
) -> Result<()> {
    let decision = decide(subject, resource, action);
    if !decision.is_allowed() {
        warn!(
            subject = %subject.id(),
            target = %target,
            action = ?action,
            reason = ?decision.reason(),
            "Access denied"
        );
    }
    decision.into_result()
}

/// Reveal, store, rotate and delete household secrets.
#[derive(Clone)]
pub struct DisclosureService {
    store: Arc<dyn SecretStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl DisclosureService {
    /// Create a service over a store and cipher.
    pub fn new(store: Arc<dyn SecretStore>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { store, cipher }
    }

    async fn fetch(&self, id: RecordId) -> Result<SecretRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Secret {} not found", id)))
    }

    /// Decrypt and return one secret.
    ///
    /// # Preconditions
    /// - Subject may read the plaintext of the record
    ///
    /// # Postconditions
    /// - Store is unchanged
    /// - Plaintext is returned once and not retained
    ///
    /// # Errors
    /// - `Error::NotFound` if the record does not exist
    /// - `Error::Forbidden` if the policy denies; nothing is decrypted
    /// - `Error::Internal` if the stored value cannot be decrypted
    pub async fn reveal(&self, subject: &Subject, id: RecordId) -> Result<SensitiveBytes> {
        let record = self.fetch(id).await?;
        authorize(subject, &record.resource(), Action::ReadPlaintext, &id.to_string())?;

        let plaintext = self
            .cipher
            .open(record.suite, &record.ciphertext, &record.iv)
            .map_err(|e| {
                error!(record_id = %id, suite = %record.suite, error = %e, "Failed to decrypt secret");
                Error::Internal(format!("Secret {} could not be decrypted", id))
            })?;

        info!(record_id = %id, subject = %subject.id(), "Secret revealed");
        Ok(plaintext)
    }

    /// Encrypt and store a new secret owned by `subject`.
    ///
    /// # Errors
    /// - `Error::Validation` on malformed input
    /// - `Error::Forbidden` if the policy denies; nothing is encrypted
    pub async fn store(&self, subject: &Subject, secret: NewSecret) -> Result<RecordId> {
        secret.validate()?;

        let resource = Resource::owned(secret.kind, subject.id().clone(), secret.visible_to_child);
        authorize(subject, &resource, Action::Write, "new secret")?;

        let sealed = self.cipher.seal(secret.value.as_bytes())?;
        let id = self
            .store
            .create(NewRecord {
                owner_id: subject.id().clone(),
                kind: secret.kind,
                title: secret.title,
                username: secret.username,
                url: secret.url,
                visible_to_child: secret.visible_to_child,
                sealed,
            })
            .await?;

        info!(record_id = %id, kind = %secret.kind, subject = %subject.id(), "Secret stored");
        Ok(id)
    }

    /// Replace the value of a secret under a fresh IV.
    ///
    /// # Errors
    /// - `Error::Validation` if the value is empty or too long
    /// - `Error::NotFound` if the record does not exist
    /// - `Error::Forbidden` if the policy denies; nothing is encrypted
    pub async fn rotate(&self, subject: &Subject, id: RecordId, value: SensitiveBytes) -> Result<()> {
        validate_value(&value)?;
        let record = self.fetch(id).await?;
        authorize(subject, &record.resource(), Action::Write, &id.to_string())?;

        let sealed = self.cipher.seal(value.as_bytes())?;
        self.store.update_secret(id, sealed).await?;

        info!(record_id = %id, subject = %subject.id(), "Secret rotated");
        Ok(())
    }

    /// Update non-secret fields.
    ///
    /// # Errors
    /// - `Error::Validation` if the update is empty or malformed
    /// - `Error::NotFound` if the record does not exist
    /// - `Error::Forbidden` if the policy denies
    pub async fn update_metadata(
        &self,
        subject: &Subject,
        id: RecordId,
        update: MetadataUpdate,
    ) -> Result<RecordMetadata> {
        validate_update(&update)?;
        let record = self.fetch(id).await?;
        authorize(subject, &record.resource(), Action::Write, &id.to_string())?;

        let metadata = self.store.update_metadata(id, update).await?;
        debug!(record_id = %id, subject = %subject.id(), "Secret metadata updated");
        Ok(metadata)
    }

    /// Toggle whether children may reveal a secret.
    pub async fn set_visible_to_child(
        &self,
        subject: &Subject,
        id: RecordId,
        visible: bool,
    ) -> Result<RecordMetadata> {
        self.update_metadata(subject, id, MetadataUpdate::visibility(visible))
            .await
    }

    /// Delete a secret permanently.
    ///
    /// # Errors
    /// - `Error::NotFound` if the record does not exist
    /// - `Error::Forbidden` if the policy denies
    pub async fn delete(&self, subject: &Subject, id: RecordId) -> Result<()> {
        let record = self.fetch(id).await?;
        authorize(subject, &record.resource(), Action::Delete, &id.to_string())?;

        self.store.delete(id).await?;
        info!(record_id = %id, subject = %subject.id(), "Secret deleted");
        Ok(())
    }

    /// List secrets as metadata. Never decrypts.
    pub async fn list(&self, subject: &Subject, kind: Option<SecretKind>) -> Result<Vec<ListView>> {
        let views = self.store.find_all_metadata(subject, kind).await?;
        debug!(subject = %subject.id(), count = views.len(), "Secrets listed");
        Ok(views)
    }
}
