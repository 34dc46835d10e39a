//! Store trait definitions.

use async_trait::async_trait;

use crate::model::{
    ListView, MetadataUpdate, NewRecord, RecordMetadata, SecretRecord, SystemTokenRecord,
    SystemTokenView, TokenName,
};
use homekeep_access::{decide, Action};
use homekeep_common::{RecordId, Result, SecretKind, Subject};
use homekeep_crypto::{CipherSuite, SealedSecret};

/// Persistence for household secret records (credentials and network keys).
///
/// Implementations perform no authorization; callers decide first.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a new record.
    ///
    /// # Errors
    /// - `Error::Validation` if `record.kind` is a system token
    async fn create(&self, record: NewRecord) -> Result<RecordId>;

    /// Fetch a record with its encrypted value.
    async fn find_by_id(&self, id: RecordId) -> Result<Option<SecretRecord>>;

    /// List non-secret fields of every record, optionally of one kind.
    ///
    /// Results are ordered by id.
    async fn list_metadata(&self, kind: Option<SecretKind>) -> Result<Vec<RecordMetadata>>;

    /// Replace the encrypted value of a record.
    ///
    /// Ciphertext, IV, and suite are written together.
    ///
    /// # Errors
    /// - `Error::NotFound` if the record does not exist
    async fn update_secret(&self, id: RecordId, sealed: SealedSecret) -> Result<()>;

    /// Replace the encrypted value only if the stored IV still equals
    /// `expected_iv`. Returns whether the swap happened.
    async fn swap_secret(
        &self,
        id: RecordId,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool>;

    /// Update non-secret fields and return the new metadata.
    ///
    /// # Errors
    /// - `Error::NotFound` if the record does not exist
    async fn update_metadata(&self, id: RecordId, update: MetadataUpdate)
        -> Result<RecordMetadata>;

    /// Delete a record permanently.
    ///
    /// # Errors
    /// - `Error::NotFound` if the record does not exist
    async fn delete(&self, id: RecordId) -> Result<()>;

    /// Ids of records whose value is stored under `suite`.
    async fn ids_with_suite(&self, suite: CipherSuite) -> Result<Vec<RecordId>>;

    /// List records visible to `subject`, metadata only.
    ///
    /// Each record passes through the access policy with `ReadMetadata`;
    /// `revealable` carries the `ReadPlaintext` decision.
    async fn find_all_metadata(
        &self,
        subject: &Subject,
        kind: Option<SecretKind>,
    ) -> Result<Vec<ListView>> {
        let records = self.list_metadata(kind).await?;

        Ok(records
            .into_iter()
            .filter_map(|metadata| {
                let resource = metadata.resource();
                if !decide(subject, &resource, Action::ReadMetadata).is_allowed() {
                    return None;
                }
                let revealable = decide(subject, &resource, Action::ReadPlaintext).is_allowed();
                Some(ListView {
                    metadata,
                    revealable,
                })
            })
            .collect())
    }
}

/// Persistence for process-wide system tokens keyed by name.
#[async_trait]
pub trait SystemTokenStore: Send + Sync {
    /// Insert or replace a token.
    async fn put_token(&self, name: &TokenName, sealed: SealedSecret) -> Result<()>;

    /// Fetch a token with its encrypted value.
    async fn find_token(&self, name: &TokenName) -> Result<Option<SystemTokenRecord>>;

    /// List token names, ordered by name.
    async fn list_tokens(&self) -> Result<Vec<SystemTokenView>>;

    /// Delete a token.
    ///
    /// # Errors
    /// - `Error::NotFound` if the token does not exist
    async fn delete_token(&self, name: &TokenName) -> Result<()>;

    /// Replace a token's value only if its stored IV equals `expected_iv`.
    async fn swap_token(
        &self,
        name: &TokenName,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool>;

    /// Names of tokens stored under `suite`.
    async fn tokens_with_suite(&self, suite: CipherSuite) -> Result<Vec<TokenName>>;
}
