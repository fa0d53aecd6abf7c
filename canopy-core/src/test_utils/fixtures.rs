//! Test fixtures for building group trees and memberships
//!
//! Each helper runs its own committed transaction against an in-memory store.

use crate::core_membership::error::MembershipError;
use crate::core_membership::event::{Event, EventKind};
use crate::core_membership::group::{Group, ThreadRef};
use crate::core_membership::hierarchy::GroupHierarchy;
use crate::core_membership::membership::{Experiences, Membership, NewMembership};
use crate::core_membership::storage::MembershipSqlStore;
use crate::core_membership::store::{GroupStore, MembershipStore};
use crate::core_membership::types::{GroupId, UserId};

pub struct Fixture {
    pub store: MembershipSqlStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: MembershipSqlStore::memory().expect("in-memory store"),
        }
    }

    fn insert(&self, group: Group) -> Group {
        self.store
            .transaction(|txn| {
                txn.insert_group(&group)?;
                Ok::<_, MembershipError>(group)
            })
            .expect("insert group")
    }

    pub fn root(&self, name: &str) -> Group {
        self.insert(Group::formal(name, None).expect("root group"))
    }

    pub fn child(&self, parent: &Group, name: &str) -> Group {
        self.insert(Group::formal(name, Some(parent)).expect("subgroup"))
    }

    pub fn guest(&self, host: &Group, thread: ThreadRef) -> Group {
        self.insert(Group::guest(host, thread).expect("guest group"))
    }

    fn create(&self, attrs: NewMembership) -> Membership {
        self.store
            .transaction(|txn| txn.create(attrs))
            .expect("create membership")
    }

    /// Accepted membership without an inviter
    pub fn member(&self, group: &Group, user: &str) -> Membership {
        self.create(NewMembership::accepted(group.id, UserId::new(user), None))
    }

    pub fn admin(&self, group: &Group, user: &str) -> Membership {
        self.create(NewMembership::accepted(group.id, UserId::new(user), None).as_admin())
    }

    /// Pending invitation from `inviter`
    pub fn invite(
        &self,
        group: &Group,
        user: &str,
        inviter: &str,
        experiences: Experiences,
    ) -> Membership {
        self.create(NewMembership::invitation(
            group.id,
            UserId::new(user),
            UserId::new(inviter),
            experiences,
        ))
    }

    /// Pending membership with no inviter (a join request)
    pub fn pending_self_join(&self, group: &Group, user: &str) -> Membership {
        let mut attrs = NewMembership::accepted(group.id, UserId::new(user), None);
        attrs.accepted_at = None;
        self.create(attrs)
    }

    pub fn membership(&self, group: &Group, user: &str) -> Option<Membership> {
        self.store
            .read(|txn| txn.find_by_group_and_user(&group.id, &UserId::new(user)))
            .expect("find membership")
    }

    pub fn memberships_for(&self, user: &str) -> Vec<Membership> {
        self.store
            .read(|txn| txn.memberships_for_user(&UserId::new(user)))
            .expect("memberships for user")
    }

    pub fn find_group(&self, id: &GroupId) -> Option<Group> {
        self.store.read(|txn| txn.find_group(id)).expect("find group")
    }

    pub fn events(&self, kind: EventKind) -> Vec<Event> {
        self.store
            .read(|txn| txn.events_of_kind(kind))
            .expect("events")
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
