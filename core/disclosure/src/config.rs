//! Process configuration.
//!
//! Everything is read once at startup. A missing or malformed process key is
//! fatal; the process must not start without it.

use chrono::Duration;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use homekeep_access::{IdentityContext, SessionSecret, SessionSigner};
use homekeep_common::{Error, Result};
use homekeep_crypto::{CipherEngine, ProcessKey};
use homekeep_store::SqliteStore;

/// Environment variable holding the 64-character hex process key.
pub const ENV_SECRET_KEY: &str = "HOMEKEEP_SECRET_KEY";

/// Environment variable holding the session signing secret.
pub const ENV_SESSION_SECRET: &str = "HOMEKEEP_SESSION_SECRET";

/// Environment variable holding the database path.
pub const ENV_DATABASE: &str = "HOMEKEEP_DATABASE";

/// Environment variable holding the session lifetime in seconds.
pub const ENV_SESSION_TTL: &str = "HOMEKEEP_SESSION_TTL_SECS";

/// Database file used when none is configured.
pub const DEFAULT_DATABASE: &str = "homekeep.db";

/// Session lifetime used when none is configured.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 3600;

/// Process configuration.
#[derive(Clone)]
pub struct AppConfig {
    secret_key: ProcessKey,
    session_secret: Option<SessionSecret>,
    database: PathBuf,
    session_ttl: Duration,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    /// - `Error::Config` if the process key is missing or not 64 hex chars
    /// - `Error::Config` if the session secret is too short
    /// - `Error::Config` if the session lifetime is not an integer in
    ///   `1..=MAX_SESSION_TTL_SECS`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_key = Zeroizing::new(
            lookup(ENV_SECRET_KEY)
                .ok_or_else(|| Error::Config(format!("{} is not set", ENV_SECRET_KEY)))?,
        );
        let secret_key = ProcessKey::from_hex(&raw_key)?;

        let session_secret = match lookup(ENV_SESSION_SECRET) {
            Some(raw) => {
                let raw = Zeroizing::new(raw);
                Some(SessionSecret::new(raw.as_bytes())?)
            }
            None => None,
        };

        let database = lookup(ENV_DATABASE)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        let ttl_secs = match lookup(ENV_SESSION_TTL) {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| (1..=MAX_SESSION_TTL_SECS).contains(secs))
                .ok_or_else(|| {
                    Error::Config(format!(
                        "{} must be an integer between 1 and {}",
                        ENV_SESSION_TTL, MAX_SESSION_TTL_SECS
                    ))
                })?,
            None => DEFAULT_SESSION_TTL_SECS,
        };
        let session_ttl = Duration::try_seconds(ttl_secs)
            .ok_or_else(|| Error::Config(format!("{} is out of range", ENV_SESSION_TTL)))?;

        debug!(
            database = %database.display(),
            session_ttl_secs = ttl_secs,
            sessions = session_secret.is_some(),
            "Configuration loaded"
        );

        Ok(Self {
            secret_key,
            session_secret,
            database,
            session_ttl,
        })
    }

    /// Cipher engine bound to the process key.
    pub fn cipher_engine(&self) -> CipherEngine {
        CipherEngine::new(self.secret_key.clone())
    }

    /// Session signer for issuing and verifying tokens.
    ///
    /// # Errors
    /// - `Error::Config` if no session secret is configured
    pub fn session_signer(&self) -> Result<SessionSigner> {
        self.session_secret
            .clone()
            .map(SessionSigner::new)
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_SESSION_SECRET)))
    }

    /// Identity context verifying tokens from [`Self::session_signer`].
    pub fn identity_context(&self) -> Result<IdentityContext> {
        Ok(IdentityContext::new(Arc::new(self.session_signer()?)))
    }

    /// Open the configured SQLite database.
    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.database)
    }

    /// Configured database path.
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Configured session lifetime.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("secret_key", &"[REDACTED]")
            .field("session_secret", &self.session_secret.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homekeep_crypto::SecretCipher;
    use std::collections::HashMap;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_SECRET_KEY, KEY_HEX)])).unwrap();

        assert_eq!(config.database(), Path::new(DEFAULT_DATABASE));
        assert_eq!(
            config.session_ttl(),
            Duration::seconds(DEFAULT_SESSION_TTL_SECS)
        );
        assert!(matches!(config.session_signer(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let result = AppConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_key_is_fatal() {
        let padded = format!("{}zz", &KEY_HEX[..62]);
        for bad in ["abc", &KEY_HEX[..62], padded.as_str()] {
            let result = AppConfig::from_lookup(lookup(&[(ENV_SECRET_KEY, bad)]));
            assert!(matches!(result, Err(Error::Config(_))), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_key_not_echoed_in_error() {
        let bad = format!("{}zz", &KEY_HEX[..62]);
        let err = AppConfig::from_lookup(lookup(&[(ENV_SECRET_KEY, &bad)])).unwrap_err();
        assert!(!err.to_string().contains(&bad));
    }

    #[test]
    fn test_full_configuration() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_SECRET_KEY, KEY_HEX),
            (ENV_SESSION_SECRET, "a-session-secret-that-is-long-enough!!"),
            (ENV_DATABASE, "/var/lib/homekeep/secrets.db"),
            (ENV_SESSION_TTL, "600"),
        ]))
        .unwrap();

        assert_eq!(
            config.database(),
            Path::new("/var/lib/homekeep/secrets.db")
        );
        assert_eq!(config.session_ttl(), Duration::seconds(600));
        assert!(config.identity_context().is_ok());

        let engine = config.cipher_engine();
        let sealed = engine.seal(b"pw").unwrap();
        assert_eq!(
            engine
                .open(sealed.suite, &sealed.ciphertext, &sealed.iv)
                .unwrap()
                .as_bytes(),
            b"pw"
        );
    }

    #[test]
    fn test_short_session_secret_rejected() {
        let result = AppConfig::from_lookup(lookup(&[
            (ENV_SECRET_KEY, KEY_HEX),
            (ENV_SESSION_SECRET, "short"),
        ]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_ttl_rejected() {
        for bad in ["0", "-5", "soon"] {
            let result = AppConfig::from_lookup(lookup(&[
                (ENV_SECRET_KEY, KEY_HEX),
                (ENV_SESSION_TTL, bad),
            ]));
            assert!(matches!(result, Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_out_of_range_ttl_rejected() {
        let too_long = (MAX_SESSION_TTL_SECS + 1).to_string();
        let max = i64::MAX.to_string();
        for bad in [too_long.as_str(), max.as_str()] {
            let result = AppConfig::from_lookup(lookup(&[
                (ENV_SECRET_KEY, KEY_HEX),
                (ENV_SESSION_TTL, bad),
            ]));
            assert!(matches!(result, Err(Error::Config(_))), "accepted {}", bad);
        }

        let max_ok = MAX_SESSION_TTL_SECS.to_string();
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_SECRET_KEY, KEY_HEX),
            (ENV_SESSION_TTL, max_ok.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.session_ttl(), Duration::seconds(MAX_SESSION_TTL_SECS));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_SECRET_KEY, KEY_HEX)])).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(KEY_HEX));
        assert!(debug.contains("REDACTED"));
    }
}
