//! Access policy for secret-bearing resources.
//!
//! [`decide`] is a pure function: no I/O, no clock, no mutation. Every read
//! or write of a secret goes through it before the cipher engine is touched.

use serde::Serialize;

use homekeep_common::{Error, Result, Role, SecretKind, Subject, SubjectId};

/// Operation a subject wants to perform on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// List or inspect non-secret fields.
    ReadMetadata,
    /// Decrypt and return the secret value.
    ReadPlaintext,
    /// Create, rotate, or edit.
    Write,
    /// Remove permanently.
    Delete,
}

impl Action {
    /// All actions, in rule-table order.
    pub const ALL: [Action; 4] = [
        Action::ReadMetadata,
        Action::ReadPlaintext,
        Action::Write,
        Action::Delete,
    ];
}

/// Rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    MetadataOnly,
    ParentRole,
    Owner,
    VisibleToChild,
    Admin,
    AdminRequired,
    NotAuthorized,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    allow: bool,
    reason: DecisionReason,
}

impl AccessDecision {
    fn allow(reason: DecisionReason) -> Self {
        Self {
            allow: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allow: false,
            reason,
        }
    }

    /// Whether the action is permitted.
    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    /// Rule that matched. For server-side logging only.
    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    /// Convert into a result, mapping a denial to [`Error::Forbidden`].
    pub fn into_result(self) -> Result<()> {
        if self.allow {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

/// Policy-relevant attributes of a secret-bearing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    kind: SecretKind,
    owner_id: Option<SubjectId>,
    visible_to_child: bool,
}

impl Resource {
    /// A household-owned record (credential or network key).
    pub fn owned(kind: SecretKind, owner_id: SubjectId, visible_to_child: bool) -> Self {
        Self {
            kind,
            owner_id: Some(owner_id),
            visible_to_child,
        }
    }

    /// A process-wide system token. It has no owner and no child visibility.
    pub fn system_token() -> Self {
        Self {
            kind: SecretKind::SystemToken,
            owner_id: None,
            visible_to_child: false,
        }
    }

    /// Resource kind.
    pub fn kind(&self) -> SecretKind {
        self.kind
    }

    /// Owner, if the kind carries one.
    pub fn owner_id(&self) -> Option<&SubjectId> {
        self.owner_id.as_ref()
    }

    /// Whether children may reveal the value.
    pub fn visible_to_child(&self) -> bool {
        self.visible_to_child
    }
}

/// Decide whether `subject` may perform `action` on `resource`.
///
/// Rules, first match wins:
/// 1. `ReadMetadata` is always allowed.
/// 2. A parent may do anything to a credential or network key.
/// 3. The owner may do anything to their own record.
/// 4. A child may read plaintext of a record shared with children.
/// 5. System tokens require an admin.
/// 6. Everything else is denied.
///
/// Ownership and child visibility never apply to system tokens, whatever
/// fields the resource carries.
pub fn decide(subject: &Subject, resource: &Resource, action: Action) -> AccessDecision {
    if action == Action::ReadMetadata {
        return AccessDecision::allow(DecisionReason::MetadataOnly);
    }

    let owned = resource.kind.is_owned();

    if owned && subject.role() == Role::Parent {
        return AccessDecision::allow(DecisionReason::ParentRole);
    }

    if owned && resource.owner_id.as_ref() == Some(subject.id()) {
        return AccessDecision::allow(DecisionReason::Owner);
    }

    if owned
        && action == Action::ReadPlaintext
        && subject.role() == Role::Child
        && resource.visible_to_child
    {
        return AccessDecision::allow(DecisionReason::VisibleToChild);
    }

    if resource.kind == SecretKind::SystemToken {
        return if subject.is_admin() {
            AccessDecision::allow(DecisionReason::Admin)
        } else {
            AccessDecision::deny(DecisionReason::AdminRequired)
        };
    }

    AccessDecision::deny(DecisionReason::NotAuthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, role: Role, is_admin: bool) -> Subject {
        Subject::new(SubjectId::new(id).unwrap(), role, is_admin)
    }

    /// Independent statement of the rule table used to check `decide`.
    fn expected(
        role: Role,
        is_admin: bool,
        is_owner: bool,
        visible_to_child: bool,
        kind: SecretKind,
        action: Action,
    ) -> bool {
        match (action, kind) {
            (Action::ReadMetadata, _) => true,
            (_, SecretKind::SystemToken) => is_admin,
            _ if role == Role::Parent => true,
            _ if is_owner => true,
            (Action::ReadPlaintext, _) => role == Role::Child && visible_to_child,
            _ => false,
        }
    }

    #[test]
    fn test_authorization_matrix() {
        let mut cases = 0;
        for role in [Role::Parent, Role::Child] {
            for is_admin in [true, false] {
                for is_owner in [true, false] {
                    for visible in [true, false] {
                        for kind in [
                            SecretKind::Credential,
                            SecretKind::NetworkKey,
                            SecretKind::SystemToken,
                        ] {
                            for action in Action::ALL {
                                let caller = subject("caller", role, is_admin);
                                let owner = if is_owner { "caller" } else { "someone-else" };
                                let resource = Resource {
                                    kind,
                                    owner_id: Some(SubjectId::new(owner).unwrap()),
                                    visible_to_child: visible,
                                };

                                let decision = decide(&caller, &resource, action);
                                assert_eq!(
                                    decision.is_allowed(),
                                    expected(role, is_admin, is_owner, visible, kind, action),
                                    "role={:?} admin={} owner={} visible={} kind={:?} action={:?}",
                                    role,
                                    is_admin,
                                    is_owner,
                                    visible,
                                    kind,
                                    action
                                );
                                cases += 1;
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(cases, 2 * 2 * 2 * 2 * 3 * 4);
    }

    #[test]
    fn test_metadata_always_allowed() {
        let child = subject("kid", Role::Child, false);
        let decision = decide(&child, &Resource::system_token(), Action::ReadMetadata);

        assert!(decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::MetadataOnly);
    }

    #[test]
    fn test_parent_reason() {
        let parent = subject("mom", Role::Parent, false);
        let resource = Resource::owned(
            SecretKind::Credential,
            SubjectId::new("dad").unwrap(),
            false,
        );

        let decision = decide(&parent, &resource, Action::Delete);
        assert!(decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::ParentRole);
    }

    #[test]
    fn test_child_owner_can_write_own_record() {
        let child = subject("kid", Role::Child, false);
        let resource = Resource::owned(SecretKind::NetworkKey, child.id().clone(), false);

        let decision = decide(&child, &resource, Action::Write);
        assert!(decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::Owner);
    }

    #[test]
    fn test_child_cannot_write_shared_record() {
        let child = subject("kid", Role::Child, false);
        let resource = Resource::owned(
            SecretKind::Credential,
            SubjectId::new("mom").unwrap(),
            true,
        );

        assert!(decide(&child, &resource, Action::ReadPlaintext).is_allowed());
        assert!(!decide(&child, &resource, Action::Write).is_allowed());
        assert!(!decide(&child, &resource, Action::Delete).is_allowed());
    }

    #[test]
    fn test_admin_flag_does_not_grant_household_records() {
        let admin_child = subject("kid", Role::Child, true);
        let resource = Resource::owned(
            SecretKind::Credential,
            SubjectId::new("mom").unwrap(),
            false,
        );

        let decision = decide(&admin_child, &resource, Action::ReadPlaintext);
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::NotAuthorized);
    }

    #[test]
    fn test_system_token_requires_admin() {
        let parent = subject("mom", Role::Parent, false);
        let decision = decide(&parent, &Resource::system_token(), Action::ReadPlaintext);

        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::AdminRequired);

        let admin = subject("mom", Role::Parent, true);
        let decision = decide(&admin, &Resource::system_token(), Action::Write);
        assert!(decision.is_allowed());
        assert_eq!(decision.reason(), DecisionReason::Admin);
    }

    #[test]
    fn test_into_result() {
        let child = subject("kid", Role::Child, false);
        let denied = decide(&child, &Resource::system_token(), Action::Delete);

        assert!(matches!(denied.into_result(), Err(Error::Forbidden)));
    }
}
