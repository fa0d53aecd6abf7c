//! Membership records and the invitation payload

use super::types::{GroupId, MembershipId, Timestamp, UserId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Structured payload carried by a membership
///
/// Persisted as JSON. Keys this version does not know are dropped on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiences {
    /// Subgroups the inviter wants the invitee added to on redemption
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_group_ids"
    )]
    pub invited_group_ids: Option<BTreeSet<GroupId>>,
}

/// Keep the well-formed ids of a stored `invited_group_ids` list
///
/// A malformed entry is dropped on its own; a value that is not a list at
/// all counts as no list.
fn lenient_group_ids<'de, D>(deserializer: D) -> Result<Option<BTreeSet<GroupId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let entries = match raw {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Array(entries)) => entries,
        Some(other) => {
            warn!(value = %other, "Ignoring invited_group_ids that is not a list");
            return Ok(None);
        }
    };

    let mut ids = BTreeSet::new();
    for entry in entries {
        match entry.as_str().and_then(GroupId::from_hex) {
            Some(id) => {
                ids.insert(id);
            }
            None => warn!(entry = %entry, "Dropping malformed invited group id"),
        }
    }
    Ok(Some(ids))
}

impl Experiences {
    /// Payload inviting to the given subgroups
    pub fn inviting_to(groups: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            invited_group_ids: Some(groups.into_iter().collect()),
        }
    }

    /// Invited group ids, empty when none were given
    pub fn invited_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.invited_group_ids.iter().flatten()
    }
}

/// Relates one user to one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub user_id: UserId,

    /// Who invited the user (None for self-joins)
    pub inviter_id: Option<UserId>,

    /// Group administrator flag
    pub admin: bool,

    /// Set once the invitation is accepted; None while pending
    pub accepted_at: Option<Timestamp>,

    pub experiences: Experiences,
    pub created_at: Timestamp,
}

impl Membership {
    pub fn is_pending(&self) -> bool {
        self.accepted_at.is_none()
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    /// Stamp acceptance time
    ///
    /// Returns false (and leaves the record untouched) if already accepted.
    pub fn accept(&mut self, at: Timestamp) -> bool {
        if self.is_accepted() {
            return false;
        }
        self.accepted_at = Some(at);
        true
    }

    /// User an acceptance is attributed to: the inviter, or the member
    /// themselves for self-joins
    pub fn attributed_to(&self) -> &UserId {
        self.inviter_id.as_ref().unwrap_or(&self.user_id)
    }
}

/// Attributes for a membership that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub inviter_id: Option<UserId>,
    pub admin: bool,
    pub accepted_at: Option<Timestamp>,
    pub experiences: Experiences,
}

impl NewMembership {
    /// A pending invitation
    pub fn invitation(
        group_id: GroupId,
        user_id: UserId,
        inviter_id: UserId,
        experiences: Experiences,
    ) -> Self {
        Self {
            group_id,
            user_id,
            inviter_id: Some(inviter_id),
            admin: false,
            accepted_at: None,
            experiences,
        }
    }

    /// An accepted membership
    pub fn accepted(group_id: GroupId, user_id: UserId, inviter_id: Option<UserId>) -> Self {
        Self {
            group_id,
            user_id,
            inviter_id,
            admin: false,
            accepted_at: Some(Timestamp::now()),
            experiences: Experiences::default(),
        }
    }

    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    /// Materialize the record with a fresh id
    pub fn into_membership(self) -> Membership {
        Membership {
            id: MembershipId::generate(),
            group_id: self.group_id,
            user_id: self.user_id,
            inviter_id: self.inviter_id,
            admin: self.admin,
            accepted_at: self.accepted_at,
            experiences: self.experiences,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Membership {
        NewMembership::invitation(
            GroupId::generate(),
            UserId::new("bob"),
            UserId::new("alice"),
            Experiences::default(),
        )
        .into_membership()
    }

    #[test]
    fn test_invitation_is_pending() {
        let membership = invitation();
        assert!(membership.is_pending());
        assert!(!membership.is_accepted());
        assert!(!membership.admin);
    }

    #[test]
    fn test_accept_only_once() {
        let mut membership = invitation();
        assert!(membership.accept(Timestamp::from_millis(10)));
        assert!(!membership.accept(Timestamp::from_millis(20)));
        assert_eq!(membership.accepted_at, Some(Timestamp::from_millis(10)));
    }

    #[test]
    fn test_attribution_prefers_inviter() {
        let membership = invitation();
        assert_eq!(membership.attributed_to(), &UserId::new("alice"));

        let self_join =
            NewMembership::accepted(GroupId::generate(), UserId::new("carol"), None).into_membership();
        assert_eq!(self_join.attributed_to(), &UserId::new("carol"));
    }

    #[test]
    fn test_experiences_json_shape() {
        let empty = Experiences::default();
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");

        let group = GroupId::from_bytes([1; 32]);
        let invited = Experiences::inviting_to([group]);
        let json = serde_json::to_string(&invited).unwrap();
        assert_eq!(json, format!("{{\"invited_group_ids\":[\"{}\"]}}", group));
    }

    #[test]
    fn test_experiences_ignores_unknown_keys() {
        let parsed: Experiences =
            serde_json::from_str(r#"{"seen_welcome": true, "invited_group_ids": []}"#).unwrap();
        assert_eq!(parsed.invited_group_ids, Some(BTreeSet::new()));
        assert_eq!(parsed.invited_groups().count(), 0);

        let parsed: Experiences = serde_json::from_str(r#"{"seen_welcome": true}"#).unwrap();
        assert_eq!(parsed, Experiences::default());
    }

    #[test]
    fn test_experiences_drops_malformed_ids() {
        let group = GroupId::from_bytes([7; 32]);
        let json = format!(
            r#"{{"invited_group_ids": ["{}", 42, "zz", null, "{}"]}}"#,
            group, group
        );
        let parsed: Experiences = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.invited_groups().collect::<Vec<_>>(), vec![&group]);

        let parsed: Experiences =
            serde_json::from_str(r#"{"invited_group_ids": "not-a-list"}"#).unwrap();
        assert_eq!(parsed, Experiences::default());

        let parsed: Experiences = serde_json::from_str(r#"{"invited_group_ids": null}"#).unwrap();
        assert_eq!(parsed, Experiences::default());
    }

    #[test]
    fn test_admin_builder() {
        let membership = NewMembership::accepted(GroupId::generate(), UserId::new("root"), None)
            .as_admin()
            .into_membership();
        assert!(membership.admin);
        assert!(membership.is_accepted());
    }
}
