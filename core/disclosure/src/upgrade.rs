//! Re-encryption of legacy rows.
//!
//! Rows written under AES-256-CBC are opened with the process key and sealed
//! again under the default suite with a fresh IV. Each write is a
//! compare-and-swap on the old IV, so a concurrent rotation wins and the row
//! is skipped.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use homekeep_common::Result;
use homekeep_crypto::{CipherSuite, SecretCipher};
use homekeep_store::{SecretStore, SystemTokenStore};

/// Outcome of an upgrade pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Secret records re-encrypted.
    pub records_upgraded: usize,
    /// System tokens re-encrypted.
    pub tokens_upgraded: usize,
    /// Rows changed or removed while the pass ran.
    pub skipped: usize,
    /// Rows that could not be decrypted and were left untouched.
    pub failed: usize,
}

/// Operator maintenance task moving legacy rows to the default suite.
pub struct CipherUpgrade {
    secrets: Arc<dyn SecretStore>,
    tokens: Arc<dyn SystemTokenStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl CipherUpgrade {
    /// Create an upgrade task.
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        tokens: Arc<dyn SystemTokenStore>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            secrets,
            tokens,
            cipher,
        }
    }

    /// Re-encrypt every legacy record and token.
    ///
    /// Decrypt failures are counted and logged by id; the pass continues.
    pub async fn run(&self) -> Result<UpgradeReport> {
        let mut report = UpgradeReport::default();

        for id in self
            .secrets
            .ids_with_suite(CipherSuite::LegacyAes256Cbc)
            .await?
        {
            let Some(record) = self.secrets.find_by_id(id).await? else {
                report.skipped += 1;
                continue;
            };
            if !record.suite.is_legacy() {
                report.skipped += 1;
                continue;
            }

            let plaintext = match self.cipher.open(record.suite, &record.ciphertext, &record.iv) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    error!(record_id = %id, error = %e, "Failed to decrypt legacy secret");
                    report.failed += 1;
                    continue;
                }
            };
            let sealed = self.cipher.seal(plaintext.as_bytes())?;
            drop(plaintext);

            if self.secrets.swap_secret(id, &record.iv, sealed).await? {
                debug!(record_id = %id, "Secret upgraded");
                report.records_upgraded += 1;
            } else {
                report.skipped += 1;
            }
        }

        for name in self
            .tokens
            .tokens_with_suite(CipherSuite::LegacyAes256Cbc)
            .await?
        {
            let Some(token) = self.tokens.find_token(&name).await? else {
                report.skipped += 1;
                continue;
            };
            if !token.suite.is_legacy() {
                report.skipped += 1;
                continue;
            }

            let plaintext = match self.cipher.open(token.suite, &token.ciphertext, &token.iv) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    error!(token = %name, error = %e, "Failed to decrypt legacy system token");
                    report.failed += 1;
                    continue;
                }
            };
            let sealed = self.cipher.seal(plaintext.as_bytes())?;
            drop(plaintext);

            if self.tokens.swap_token(&name, &token.iv, sealed).await? {
                debug!(token = %name, "System token upgraded");
                report.tokens_upgraded += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            records = report.records_upgraded,
            tokens = report.tokens_upgraded,
            skipped = report.skipped,
            failed = report.failed,
            "Cipher upgrade finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homekeep_common::{SecretKind, SubjectId};
    use homekeep_crypto::{encrypt_legacy_cbc, CipherEngine, ProcessKey, KEY_LENGTH};
    use homekeep_store::{MemoryStore, NewRecord, TokenName};

    fn key() -> ProcessKey {
        ProcessKey::from_bytes([8u8; KEY_LENGTH])
    }

    fn legacy_record(value: &[u8]) -> NewRecord {
        NewRecord {
            owner_id: SubjectId::new("mom").unwrap(),
            kind: SecretKind::Credential,
            title: "Old bank".to_string(),
            username: None,
            url: None,
            visible_to_child: false,
            sealed: encrypt_legacy_cbc(&key(), value).unwrap(),
        }
    }

    fn upgrade(store: &MemoryStore, engine: CipherEngine) -> CipherUpgrade {
        CipherUpgrade::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(engine),
        )
    }

    #[tokio::test]
    async fn test_upgrades_records_and_tokens() {
        let store = MemoryStore::new();
        let engine = CipherEngine::new(key());
        let id = store.create(legacy_record(b"legacy-pw")).await.unwrap();
        let name = TokenName::new("weather").unwrap();
        store
            .put_token(&name, encrypt_legacy_cbc(&key(), b"legacy-tok").unwrap())
            .await
            .unwrap();

        let report = upgrade(&store, CipherEngine::new(key())).run().await.unwrap();

        assert_eq!(report.records_upgraded, 1);
        assert_eq!(report.tokens_upgraded, 1);
        assert_eq!(report.failed, 0);

        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.suite, CipherSuite::Aes256Gcm);
        assert_eq!(
            engine
                .open(record.suite, &record.ciphertext, &record.iv)
                .unwrap()
                .as_bytes(),
            b"legacy-pw"
        );

        let token = store.find_token(&name).await.unwrap().unwrap();
        assert_eq!(token.suite, CipherSuite::Aes256Gcm);
        assert_eq!(
            engine
                .open(token.suite, &token.ciphertext, &token.iv)
                .unwrap()
                .as_bytes(),
            b"legacy-tok"
        );
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let store = MemoryStore::new();
        store.create(legacy_record(b"pw")).await.unwrap();
        let task = upgrade(&store, CipherEngine::new(key()));

        task.run().await.unwrap();
        let report = task.run().await.unwrap();

        assert_eq!(report, UpgradeReport::default());
    }

    #[tokio::test]
    async fn test_undecryptable_row_counts_failure() {
        let store = MemoryStore::new();
        let mut record = legacy_record(b"pw");
        record.sealed.ciphertext.pop();
        let id = store.create(record).await.unwrap();

        let report = upgrade(&store, CipherEngine::new(key())).run().await.unwrap();

        assert_eq!(report.records_upgraded, 0);
        assert_eq!(report.failed, 1);
        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.suite, CipherSuite::LegacyAes256Cbc);
    }
}
