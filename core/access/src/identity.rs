//! Identity context.
//!
//! Resolves the caller of a request from its authorization credential. The
//! rest of the core sees only the resulting [`Subject`]; tokens and session
//! internals stay here.

use std::sync::Arc;
use tracing::debug;

use homekeep_common::{Error, Result, Subject};

/// Verifies a raw session token and yields the subject it was issued to.
pub trait SessionVerifier: Send + Sync {
    /// Verify `token`.
    ///
    /// # Errors
    /// - `Error::Auth` if the token is malformed, forged, or expired
    fn verify(&self, token: &str) -> Result<Subject>;
}

/// Extract the token from a `Bearer` authorization value.
///
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, rest) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Turns authorization credentials into subjects.
#[derive(Clone)]
pub struct IdentityContext {
    verifier: Arc<dyn SessionVerifier>,
}

impl IdentityContext {
    /// Create a context backed by `verifier`.
    pub fn new(verifier: Arc<dyn SessionVerifier>) -> Self {
        Self { verifier }
    }

    /// Resolve an `Authorization` value.
    ///
    /// # Errors
    /// - `Error::Auth` for any scheme other than `Bearer`
    /// - `Error::Auth` if the session token does not verify
    pub fn resolve(&self, authorization: &str) -> Result<Subject> {
        let token = extract_bearer_token(authorization).ok_or_else(|| {
            debug!("rejecting authorization without a bearer token");
            Error::Auth("bearer token required".to_string())
        })?;
        self.resolve_token(token)
    }

    /// Resolve a bare session token.
    pub fn resolve_token(&self, token: &str) -> Result<Subject> {
        let subject = self.verifier.verify(token)?;
        debug!(subject = %subject.id(), role = %subject.role(), "resolved session");
        Ok(subject)
    }
}
