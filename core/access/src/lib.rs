//! Access control for the Homekeep secret core.
//!
//! This module provides:
//! - The pure access policy deciding (subject, resource, action)
//! - Session token signing and verification
//! - The identity context turning a bearer credential into a [`Subject`]
//!
//! [`Subject`]: homekeep_common::Subject

pub mod identity;
pub mod policy;
pub mod session;

pub use identity::{extract_bearer_token, IdentityContext, SessionVerifier};
pub use policy::{decide, AccessDecision, Action, DecisionReason, Resource};
pub use session::{SessionClaims, SessionSecret, SessionSigner};
