//! Group data structures
//!
//! Groups form a strict tree through `parent_id`. Formal groups may have any
//! number of children. A guest group is spawned under exactly one host group
//! for a single thread object (a discussion or a poll) and is always a leaf.

use super::error::MembershipError;
use super::types::{GroupId, ThreadId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of thread object a guest group belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    Discussion,
    Poll,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Discussion => "discussion",
            ThreadKind::Poll => "poll",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discussion" => Some(ThreadKind::Discussion),
            "poll" => Some(ThreadKind::Poll),
            _ => None,
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Back-reference from a guest group to its host thread object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub kind: ThreadKind,
    pub id: ThreadId,
}

impl ThreadRef {
    pub fn discussion(id: ThreadId) -> Self {
        Self { kind: ThreadKind::Discussion, id }
    }

    pub fn poll(id: ThreadId) -> Self {
        Self { kind: ThreadKind::Poll, id }
    }
}

/// Distinguishes ordinary groups from per-thread guest groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Formal,
    Guest { thread: ThreadRef },
}

/// A node in the group tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier
    pub id: GroupId,

    /// Parent group (None for a root)
    pub parent_id: Option<GroupId>,

    /// Display name
    pub name: String,

    /// Formal group or guest group of a thread
    pub kind: GroupKind,

    /// Creation timestamp
    pub created_at: Timestamp,
}

impl Group {
    /// Create a new formal group, optionally under `parent`
    ///
    /// Fails if `parent` is a guest group.
    pub fn formal(name: impl Into<String>, parent: Option<&Group>) -> Result<Self, MembershipError> {
        if let Some(parent) = parent {
            Self::check_can_parent(parent)?;
        }

        Ok(Self {
            id: GroupId::generate(),
            parent_id: parent.map(|p| p.id),
            name: name.into(),
            kind: GroupKind::Formal,
            created_at: Timestamp::now(),
        })
    }

    /// Create the guest group of `thread`, hosted by `host`
    pub fn guest(host: &Group, thread: ThreadRef) -> Result<Self, MembershipError> {
        Self::check_can_parent(host)?;

        Ok(Self {
            id: GroupId::generate(),
            parent_id: Some(host.id),
            name: format!("{} guests", thread.kind),
            kind: GroupKind::Guest { thread },
            created_at: Timestamp::now(),
        })
    }

    fn check_can_parent(parent: &Group) -> Result<(), MembershipError> {
        if parent.is_guest() {
            return Err(MembershipError::InvalidHierarchy(format!(
                "guest group {} cannot have children",
                parent.id
            )));
        }
        Ok(())
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.kind, GroupKind::Guest { .. })
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Thread this group hosts guests for, if it is a guest group
    pub fn thread(&self) -> Option<&ThreadRef> {
        match &self.kind {
            GroupKind::Guest { thread } => Some(thread),
            GroupKind::Formal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formal_root_group() {
        let group = Group::formal("Parent", None).unwrap();
        assert!(group.is_root());
        assert!(!group.is_guest());
        assert!(group.thread().is_none());
    }

    #[test]
    fn test_subgroup_references_parent() {
        let parent = Group::formal("Parent", None).unwrap();
        let child = Group::formal("Child", Some(&parent)).unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[test]
    fn test_guest_group_is_hosted_by_parent() {
        let host = Group::formal("Host", None).unwrap();
        let thread = ThreadRef::discussion(ThreadId::generate());
        let guest = Group::guest(&host, thread).unwrap();

        assert!(guest.is_guest());
        assert_eq!(guest.parent_id, Some(host.id));
        assert_eq!(guest.thread(), Some(&thread));
        assert_eq!(guest.name, "discussion guests");
    }

    #[test]
    fn test_guest_group_cannot_parent() {
        let host = Group::formal("Host", None).unwrap();
        let guest = Group::guest(&host, ThreadRef::poll(ThreadId::generate())).unwrap();

        let result = Group::formal("Nested", Some(&guest));
        assert!(matches!(result, Err(MembershipError::InvalidHierarchy(_))));

        let result = Group::guest(&guest, ThreadRef::poll(ThreadId::generate()));
        assert!(matches!(result, Err(MembershipError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_thread_kind_parse() {
        assert_eq!(ThreadKind::parse("discussion"), Some(ThreadKind::Discussion));
        assert_eq!(ThreadKind::parse("poll"), Some(ThreadKind::Poll));
        assert_eq!(ThreadKind::parse("outcome"), None);
    }
}
