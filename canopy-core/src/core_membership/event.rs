//! Domain events emitted by lifecycle transitions
//!
//! Events are appended inside the same transaction as the change they record
//! and are never updated or deleted here. Delivery is somebody else's job.

use super::types::{EventId, GroupId, MembershipId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A pending invitation was redeemed
    InvitationAccepted,
    /// A user was removed from a group and its subtree
    MembershipRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InvitationAccepted => "invitation_accepted",
            EventKind::MembershipRemoved => "membership_removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invitation_accepted" => Some(EventKind::InvitationAccepted),
            "membership_removed" => Some(EventKind::MembershipRemoved),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSubject {
    Membership(MembershipId),
    Group(GroupId),
}

impl EventSubject {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EventSubject::Membership(_) => "membership",
            EventSubject::Group(_) => "group",
        }
    }

    pub fn id_bytes(&self) -> &[u8; 32] {
        match self {
            EventSubject::Membership(id) => id.as_bytes(),
            EventSubject::Group(id) => id.as_bytes(),
        }
    }

    pub fn from_parts(kind: &str, bytes: [u8; 32]) -> Option<Self> {
        match kind {
            "membership" => Some(EventSubject::Membership(MembershipId::from_bytes(bytes))),
            "group" => Some(EventSubject::Group(GroupId::from_bytes(bytes))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub actor_id: UserId,
    pub subject: EventSubject,
    pub created_at: Timestamp,
}

impl Event {
    pub fn new(kind: EventKind, actor_id: UserId, subject: EventSubject) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            actor_id,
            subject,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::InvitationAccepted.as_str(), "invitation_accepted");
        assert_eq!(EventKind::parse("membership_removed"), Some(EventKind::MembershipRemoved));
        assert_eq!(EventKind::parse("stance_created"), None);
    }

    #[test]
    fn test_subject_parts() {
        let id = MembershipId::generate();
        let subject = EventSubject::Membership(id);
        let rebuilt = EventSubject::from_parts(subject.kind_str(), *subject.id_bytes());
        assert_eq!(rebuilt, Some(subject));
        assert_eq!(EventSubject::from_parts("poll", [0; 32]), None);
    }
}
