//! System token disclosure.
//!
//! System tokens have no owner, so the decision does not depend on the
//! stored row and is made before the store is consulted.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::disclosure::{authorize, validate_value};
use homekeep_access::{Action, Resource};
use homekeep_common::{Error, Result, SensitiveBytes, Subject};
use homekeep_crypto::SecretCipher;
use homekeep_store::{SystemTokenStore, SystemTokenView, TokenName};

/// Reveal and manage admin-only system tokens.
///
/// Unlike [`DisclosureService`](crate::DisclosureService), which looks the
/// record up first and reports a missing id as `Error::NotFound`, every
/// operation here authorizes before touching the store. A non-admin gets
/// `Error::Forbidden` whether or not the named token exists.
#[derive(Clone)]
pub struct SystemTokenService {
    store: Arc<dyn SystemTokenStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl SystemTokenService {
    /// Create a service over a token store and cipher.
    pub fn new(store: Arc<dyn SystemTokenStore>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { store, cipher }
    }

    /// Decrypt and return one token.
    ///
    /// # Errors
    /// - `Error::Forbidden` unless the subject is an admin
    /// - `Error::NotFound` if the token does not exist
    /// - `Error::Internal` if the stored value cannot be decrypted
    pub async fn reveal(&self, subject: &Subject, name: &TokenName) -> Result<SensitiveBytes> {
        authorize(subject, &Resource::system_token(), Action::ReadPlaintext, name.as_str())?;

        let token = self
            .store
            .find_token(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("System token {} not found", name)))?;

        let plaintext = self
            .cipher
            .open(token.suite, &token.ciphertext, &token.iv)
            .map_err(|e| {
                error!(token = %name, suite = %token.suite, error = %e, "Failed to decrypt system token");
                Error::Internal(format!("System token {} could not be decrypted", name))
            })?;

        info!(token = %name, subject = %subject.id(), "System token revealed");
        Ok(plaintext)
    }

    /// Create or replace a token.
    ///
    /// # Errors
    /// - `Error::Forbidden` unless the subject is an admin; nothing is encrypted
    /// - `Error::Validation` if the value is empty or too long
    pub async fn put(&self, subject: &Subject, name: &TokenName, value: SensitiveBytes) -> Result<()> {
        authorize(subject, &Resource::system_token(), Action::Write, name.as_str())?;
        validate_value(&value)?;

        let sealed = self.cipher.seal(value.as_bytes())?;
        self.store.put_token(name, sealed).await?;

        info!(token = %name, subject = %subject.id(), "System token stored");
        Ok(())
    }

    /// Delete a token.
    ///
    /// # Errors
    /// - `Error::Forbidden` unless the subject is an admin
    /// - `Error::NotFound` if the token does not exist
    pub async fn delete(&self, subject: &Subject, name: &TokenName) -> Result<()> {
        authorize(subject, &Resource::system_token(), Action::Delete, name.as_str())?;

        self.store.delete_token(name).await?;
        info!(token = %name, subject = %subject.id(), "System token deleted");
        Ok(())
    }

    /// List token names. Never decrypts.
    pub async fn list(&self, subject: &Subject) -> Result<Vec<SystemTokenView>> {
        authorize(subject, &Resource::system_token(), Action::ReadMetadata, "system tokens")?;

        let tokens = self.store.list_tokens().await?;
        debug!(subject = %subject.id(), count = tokens.len(), "System tokens listed");
        Ok(tokens)
    }
}
