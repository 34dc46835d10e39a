//! In-memory store for testing and embedding.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{
    MetadataUpdate, NewRecord, RecordMetadata, SecretRecord, SystemTokenRecord, SystemTokenView,
    TokenName,
};
use crate::store::{SecretStore, SystemTokenStore};
use homekeep_common::{Error, RecordId, Result, SecretKind};
use homekeep_crypto::{CipherSuite, SealedSecret};

#[derive(Default)]
struct State {
    next_id: i64,
    records: BTreeMap<RecordId, SecretRecord>,
    tokens: BTreeMap<TokenName, SystemTokenRecord>,
}

/// In-memory store.
///
/// All data is lost on drop. Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

fn not_found(id: RecordId) -> Error {
    Error::NotFound(format!("Secret {} not found", id))
}

fn replace_value(record: &mut SecretRecord, sealed: SealedSecret) {
    record.suite = sealed.suite;
    record.ciphertext = sealed.ciphertext;
    record.iv = sealed.iv.to_vec();
    record.metadata.updated_at = Utc::now();
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn create(&self, record: NewRecord) -> Result<RecordId> {
        if !record.kind.is_owned() {
            return Err(Error::Validation(
                "System tokens are stored by name".to_string(),
            ));
        }

        let mut state = self.write()?;
        state.next_id += 1;
        let id = RecordId::new(state.next_id);
        let now = Utc::now();

        let stored = SecretRecord {
            metadata: RecordMetadata {
                id,
                owner_id: record.owner_id,
                kind: record.kind,
                title: record.title,
                username: record.username,
                url: record.url,
                visible_to_child: record.visible_to_child,
                created_at: now,
                updated_at: now,
            },
            suite: record.sealed.suite,
            ciphertext: record.sealed.ciphertext,
            iv: record.sealed.iv.to_vec(),
        };
        state.records.insert(id, stored);

        Ok(id)
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<SecretRecord>> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    async fn list_metadata(&self, kind: Option<SecretKind>) -> Result<Vec<RecordMetadata>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|record| kind.map_or(true, |k| record.metadata.kind == k))
            .map(|record| record.metadata.clone())
            .collect())
    }

    async fn update_secret(&self, id: RecordId, sealed: SealedSecret) -> Result<()> {
        let mut state = self.write()?;
        let record = state.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        replace_value(record, sealed);
        Ok(())
    }

    async fn swap_secret(
        &self,
        id: RecordId,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let record = state.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        if record.iv != expected_iv {
            return Ok(false);
        }
        replace_value(record, sealed);
        Ok(true)
    }

    async fn update_metadata(
        &self,
        id: RecordId,
        update: MetadataUpdate,
    ) -> Result<RecordMetadata> {
        let mut state = self.write()?;
        let record = state.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        update.apply(&mut record.metadata, Utc::now());
        Ok(record.metadata.clone())
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        self.write()?
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn ids_with_suite(&self, suite: CipherSuite) -> Result<Vec<RecordId>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|record| record.suite == suite)
            .map(|record| record.metadata.id)
            .collect())
    }
}

#[async_trait]
impl SystemTokenStore for MemoryStore {
    async fn put_token(&self, name: &TokenName, sealed: SealedSecret) -> Result<()> {
        let record = SystemTokenRecord {
            name: name.clone(),
            suite: sealed.suite,
            ciphertext: sealed.ciphertext,
            iv: sealed.iv.to_vec(),
            updated_at: Utc::now(),
        };
        self.write()?.tokens.insert(name.clone(), record);
        Ok(())
    }

    async fn find_token(&self, name: &TokenName) -> Result<Option<SystemTokenRecord>> {
        Ok(self.read()?.tokens.get(name).cloned())
    }

    async fn list_tokens(&self) -> Result<Vec<SystemTokenView>> {
        Ok(self
            .read()?
            .tokens
            .values()
            .map(|token| SystemTokenView {
                name: token.name.clone(),
                updated_at: token.updated_at,
            })
            .collect())
    }

    async fn delete_token(&self, name: &TokenName) -> Result<()> {
        self.write()?
            .tokens
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("System token {} not found", name)))
    }

    async fn swap_token(
        &self,
        name: &TokenName,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let token = state
            .tokens
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("System token {} not found", name)))?;
        if token.iv != expected_iv {
            return Ok(false);
        }
        token.suite = sealed.suite;
        token.ciphertext = sealed.ciphertext;
        token.iv = sealed.iv.to_vec();
        token.updated_at = Utc::now();
        Ok(true)
    }

    async fn tokens_with_suite(&self, suite: CipherSuite) -> Result<Vec<TokenName>> {
        Ok(self
            .read()?
            .tokens
            .values()
            .filter(|token| token.suite == suite)
            .map(|token| token.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homekeep_common::{Role, Subject, SubjectId};
    use homekeep_crypto::{CipherEngine, ProcessKey, SecretCipher, KEY_LENGTH};

    fn engine() -> CipherEngine {
        CipherEngine::new(ProcessKey::from_bytes([5u8; KEY_LENGTH]))
    }

    fn new_record(owner: &str, kind: SecretKind, visible: bool, value: &[u8]) -> NewRecord {
        NewRecord {
            owner_id: SubjectId::new(owner).unwrap(),
            kind,
            title: format!("{} secret", owner),
            username: None,
            url: None,
            visible_to_child: visible,
            sealed: engine().seal(value).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryStore::new();
        let id = store
            .create(new_record("mom", SecretKind::Credential, false, b"pw"))
            .await
            .unwrap();

        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.metadata.owner_id.as_str(), "mom");
        assert_eq!(record.iv.len(), 16);

        let opened = engine()
            .open(record.suite, &record.ciphertext, &record.iv)
            .unwrap();
        assert_eq!(opened.as_bytes(), b"pw");
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let store = MemoryStore::new();
        let first = store
            .create(new_record("mom", SecretKind::Credential, false, b"a"))
            .await
            .unwrap();
        store.delete(first).await.unwrap();
        let second = store
            .create(new_record("mom", SecretKind::Credential, false, b"b"))
            .await
            .unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_create_rejects_system_token_kind() {
        let store = MemoryStore::new();
        let result = store
            .create(new_record("mom", SecretKind::SystemToken, false, b"a"))
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_kind() {
        let store = MemoryStore::new();
        store
            .create(new_record("mom", SecretKind::Credential, false, b"a"))
            .await
            .unwrap();
        store
            .create(new_record("mom", SecretKind::NetworkKey, false, b"b"))
            .await
            .unwrap();

        assert_eq!(store.list_metadata(None).await.unwrap().len(), 2);
        let networks = store
            .list_metadata(Some(SecretKind::NetworkKey))
            .await
            .unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].kind, SecretKind::NetworkKey);
    }

    #[tokio::test]
    async fn test_find_all_metadata_never_leaks() {
        let store = MemoryStore::new();
        let id = store
            .create(new_record("mom", SecretKind::Credential, false, b"hunter2"))
            .await
            .unwrap();
        let record = store.find_by_id(id).await.unwrap().unwrap();
        let admin = Subject::new(SubjectId::new("mom").unwrap(), Role::Parent, true);

        let listed = store.find_all_metadata(&admin, None).await.unwrap();
        let json = serde_json::to_string(&listed).unwrap();

        assert!(!json.contains(&hex::encode(&record.ciphertext)));
        assert!(!json.contains(&hex::encode(&record.iv)));
        assert!(!json.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_find_all_metadata_marks_revealable() {
        let store = MemoryStore::new();
        store
            .create(new_record("mom", SecretKind::Credential, false, b"a"))
            .await
            .unwrap();
        store
            .create(new_record("mom", SecretKind::NetworkKey, true, b"b"))
            .await
            .unwrap();
        let child = Subject::new(SubjectId::new("kid").unwrap(), Role::Child, false);

        let listed = store.find_all_metadata(&child, None).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert!(!listed[0].revealable);
        assert!(listed[1].revealable);
    }

    #[tokio::test]
    async fn test_update_secret_replaces_pair() {
        let store = MemoryStore::new();
        let id = store
            .create(new_record("mom", SecretKind::Credential, false, b"old"))
            .await
            .unwrap();
        let before = store.find_by_id(id).await.unwrap().unwrap();

        store
            .update_secret(id, engine().seal(b"new").unwrap())
            .await
            .unwrap();
        let after = store.find_by_id(id).await.unwrap().unwrap();

        assert_ne!(before.iv, after.iv);
        let opened = engine()
            .open(after.suite, &after.ciphertext, &after.iv)
            .unwrap();
        assert_eq!(opened.as_bytes(), b"new");
    }

    #[tokio::test]
    async fn test_swap_secret_requires_matching_iv() {
        let store = MemoryStore::new();
        let id = store
            .create(new_record("mom", SecretKind::Credential, false, b"old"))
            .await
            .unwrap();
        let current = store.find_by_id(id).await.unwrap().unwrap();

        let swapped = store
            .swap_secret(id, &[0u8; 16], engine().seal(b"x").unwrap())
            .await
            .unwrap();
        assert!(!swapped);

        let swapped = store
            .swap_secret(id, &current.iv, engine().seal(b"y").unwrap())
            .await
            .unwrap();
        assert!(swapped);
    }

    #[tokio::test]
    async fn test_missing_record_errors() {
        let store = MemoryStore::new();
        let missing = RecordId::new(404);

        assert!(store.find_by_id(missing).await.unwrap().is_none());
        assert!(matches!(
            store.delete(missing).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store
                .update_metadata(missing, MetadataUpdate::visibility(true))
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tokens() {
        let store = MemoryStore::new();
        let name = TokenName::new("weather-api").unwrap();

        store
            .put_token(&name, engine().seal(b"tok").unwrap())
            .await
            .unwrap();
        assert_eq!(store.list_tokens().await.unwrap().len(), 1);
        assert!(store.find_token(&name).await.unwrap().is_some());

        store.delete_token(&name).await.unwrap();
        assert!(store.find_token(&name).await.unwrap().is_none());
        assert!(matches!(
            store.delete_token(&name).await,
            Err(Error::NotFound(_))
        ));
    }
}
