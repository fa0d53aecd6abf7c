//! Storage seams used by the lifecycle operations
//!
//! The cascade and redemption logic is written against these traits only.
//! `SqlTxn` is the production implementation; each call on it runs inside
//! the caller's open transaction.

use super::error::StoreError;
use super::event::{Event, EventKind, EventSubject};
use super::group::Group;
use super::hierarchy::GroupHierarchy;
use super::membership::{Membership, NewMembership};
use super::types::{GroupId, MembershipId, UserId};

pub trait MembershipStore {
    fn find(&self, id: &MembershipId) -> Result<Option<Membership>, StoreError>;

    fn find_by_group_and_user(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError>;

    fn memberships_in_group(&self, group_id: &GroupId) -> Result<Vec<Membership>, StoreError>;

    fn memberships_for_user(&self, user_id: &UserId) -> Result<Vec<Membership>, StoreError>;

    fn create(&mut self, attrs: NewMembership) -> Result<Membership, StoreError>;

    /// Persist changes to an existing membership
    fn save(&mut self, membership: &Membership) -> Result<(), StoreError>;

    /// Returns false if there was nothing to delete
    fn delete(&mut self, id: &MembershipId) -> Result<bool, StoreError>;
}

/// Group mutations, kept apart from the read-only hierarchy queries
pub trait GroupStore: GroupHierarchy {
    fn insert_group(&mut self, group: &Group) -> Result<(), StoreError>;

    /// Delete one group row. Callers remove children first.
    fn delete_group(&mut self, id: &GroupId) -> Result<bool, StoreError>;
}

pub trait EventEmitter {
    fn emit(
        &mut self,
        kind: EventKind,
        actor: &UserId,
        subject: EventSubject,
    ) -> Result<Event, StoreError>;
}
