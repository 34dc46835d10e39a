//! Session tokens.
//!
//! Tokens are compact JWS strings signed with HMAC-SHA256:
//! `base64url(header).base64url(claims).base64url(signature)`. Only the
//! `HS256` algorithm is accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::identity::SessionVerifier;
use homekeep_common::{Error, Result, Role, Subject, SubjectId};

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted length of the signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Tolerated clock drift for `iat`, in seconds.
pub const CLOCK_SKEW_SECS: i64 = 60;

const ALGORITHM: &str = "HS256";

/// Secret used to sign session tokens.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret(Vec<u8>);

impl SessionSecret {
    /// Wrap a signing secret.
    ///
    /// # Errors
    /// - Returns error if the secret is shorter than MIN_SECRET_LENGTH bytes
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(Error::Config(format!(
                "Session secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        Ok(Self(secret))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSecret([REDACTED])")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject identifier.
    pub sub: String,
    /// Household role.
    pub role: Role,
    /// Admin flag.
    #[serde(default)]
    pub admin: bool,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Debug, Clone)]
pub struct SessionSigner {
    secret: SessionSecret,
}

impl SessionSigner {
    /// Create a signer for the given secret.
    pub fn new(secret: SessionSecret) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid session secret: {}", e)))
    }

    /// Issue a token for `subject` valid for `ttl` from now.
    pub fn issue(&self, subject: &Subject, ttl: Duration) -> Result<String> {
        self.issue_at(subject, Utc::now(), ttl)
    }

    /// Issue a token with an explicit issue time.
    ///
    /// # Errors
    /// - Returns error if `ttl` is not positive
    /// - Returns error if `now + ttl` is out of range
    pub fn issue_at(&self, subject: &Subject, now: DateTime<Utc>, ttl: Duration) -> Result<String> {
        if ttl <= Duration::zero() {
            return Err(Error::Validation(
                "Session lifetime must be positive".to_string(),
            ));
        }
        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Validation("Session lifetime is too long".to_string()))?;

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = SessionClaims {
            sub: subject.id().as_str().to_string(),
            role: subject.role(),
            admin: subject.is_admin(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify a token against the current time.
    pub fn verify_claims(&self, token: &str) -> Result<SessionClaims> {
        self.verify_claims_at(token, Utc::now())
    }

    /// Verify signature, structure, and expiry of a token.
    ///
    /// # Errors
    /// - `Error::Auth` for every failure; the token is never echoed
    pub fn verify_claims_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Auth("missing session token".to_string()));
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(Error::Auth("invalid token format".to_string()));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(segments[0].as_bytes())
            .map_err(|_| Error::Auth("invalid token header".to_string()))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| Error::Auth("invalid token header".to_string()))?;
        if header.alg != ALGORITHM {
            return Err(Error::Auth("unsupported signing algorithm".to_string()));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(segments[2].as_bytes())
            .map_err(|_| Error::Auth("invalid token signature".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(segments[0].as_bytes());
        mac.update(b".");
        mac.update(segments[1].as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::Auth("invalid token signature".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(segments[1].as_bytes())
            .map_err(|_| Error::Auth("invalid token payload".to_string()))?;
        let claims: SessionClaims = serde_json::from_slice(&payload)
            .map_err(|_| Error::Auth("invalid token payload".to_string()))?;

        if claims.exp <= now.timestamp() {
            debug!(sub = %claims.sub, "rejecting expired session");
            return Err(Error::Auth("session expired".to_string()));
        }
        if claims.exp <= claims.iat {
            return Err(Error::Auth("invalid token lifetime".to_string()));
        }
        if claims.iat > now.timestamp().saturating_add(CLOCK_SKEW_SECS) {
            debug!(sub = %claims.sub, "rejecting session issued in the future");
            return Err(Error::Auth("session not yet valid".to_string()));
        }

        Ok(claims)
    }
}

impl SessionVerifier for SessionSigner {
    fn verify(&self, token: &str) -> Result<Subject> {
        let claims = self.verify_claims(token)?;
        let id = SubjectId::new(claims.sub)
            .map_err(|_| Error::Auth("token missing subject".to_string()))?;
        Ok(Subject::new(id, claims.role, claims.admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(fill: u8) -> SessionSigner {
        SessionSigner::new(SessionSecret::new(vec![fill; 32]).unwrap())
    }

    fn parent() -> Subject {
        Subject::new(SubjectId::new("mom").unwrap(), Role::Parent, true)
    }

    #[test]
    fn test_secret_too_short() {
        assert!(matches!(
            SessionSecret::new(b"short".to_vec()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = signer(1);
        let token = signer.issue(&parent(), Duration::hours(1)).unwrap();

        let subject = signer.verify(&token).unwrap();
        assert_eq!(subject, parent());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer(1);
        let issued = Utc::now() - Duration::hours(2);
        let token = signer
            .issue_at(&parent(), issued, Duration::hours(1))
            .unwrap();

        let err = signer.verify_claims(&token).unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m == "session expired"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = signer(1).issue(&parent(), Duration::hours(1)).unwrap();
        let err = signer(2).verify(&token).unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let signer = signer(1);
        let child = Subject::new(SubjectId::new("kid").unwrap(), Role::Child, false);
        let token = signer.issue(&child, Duration::hours(1)).unwrap();

        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let forged = SessionClaims {
            sub: "kid".to_string(),
            role: Role::Parent,
            admin: true,
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        let err = signer.verify(&parts.join(".")).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let signer = signer(1);
        let token = signer.issue(&parent(), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);

        let forged = format!("{}.{}.", header, parts[1]);
        let err = signer.verify(&forged).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let signer = signer(1);
        for token in ["", "abc", "a.b", "a.b.c", "...."] {
            assert!(matches!(signer.verify(token), Err(Error::Auth(_))));
        }
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let result = signer(1).issue(&parent(), Duration::zero());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_overflowing_ttl_rejected() {
        let result = signer(1).issue(&parent(), Duration::seconds(9_000_000_000_000));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_future_issue_time_rejected() {
        let signer = signer(1);
        let now = Utc::now();
        let token = signer
            .issue_at(&parent(), now + Duration::hours(1), Duration::hours(2))
            .unwrap();

        let err = signer.verify_claims_at(&token, now).unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m == "session not yet valid"));

        let drifted = signer
            .issue_at(&parent(), now + Duration::seconds(30), Duration::hours(1))
            .unwrap();
        assert!(signer.verify_claims_at(&drifted, now).is_ok());
    }
}
