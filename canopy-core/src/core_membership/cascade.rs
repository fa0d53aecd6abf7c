//! Removal cascades
//!
//! Removing a user from a group removes them from everything below it:
//! subgroups, guest groups of the group's discussions and polls, and guest
//! groups further down. Memberships in ancestor and sibling groups are never
//! touched.
//!
//! These functions run against whatever transaction `store` represents and
//! never commit; the caller decides.

use super::error::MembershipError;
use super::event::{EventKind, EventSubject};
use super::hierarchy::GroupHierarchy;
use super::store::{EventEmitter, GroupStore, MembershipStore};
use super::types::{GroupId, MembershipId, UserId};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedMembership {
    pub membership_id: MembershipId,
    pub group_id: GroupId,
}

/// Outcome of removing a user from a group subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Group the removal was issued for
    pub group_id: GroupId,
    pub user_id: UserId,
    /// Every membership deleted, the target group's first
    pub removed: Vec<RemovedMembership>,
}

impl Removal {
    pub fn removed_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.removed.iter().map(|r| &r.group_id)
    }
}

/// Remove the membership's user from its group and every descendant group
///
/// Fails with `MembershipNotFound` if the membership no longer exists. Groups
/// in the subtree where the user has no membership are skipped. Emits one
/// `membership_removed` event for the target group, attributed to `actor`.
pub fn destroy<S>(
    store: &mut S,
    membership_id: &MembershipId,
    actor: &UserId,
) -> Result<Removal, MembershipError>
where
    S: GroupHierarchy + MembershipStore + EventEmitter,
{
    let membership = store
        .find(membership_id)?
        .ok_or(MembershipError::MembershipNotFound(*membership_id))?;

    let mut scope = vec![membership.group_id];
    for group in store.descendants_of(&membership.group_id) {
        scope.push(group?.id);
    }

    let mut removed = Vec::new();
    for group_id in scope {
        let Some(existing) = store.find_by_group_and_user(&group_id, &membership.user_id)? else {
            continue;
        };
        if store.delete(&existing.id)? {
            debug!(group_id = %group_id, user_id = %membership.user_id, "Removed membership");
            removed.push(RemovedMembership {
                membership_id: existing.id,
                group_id,
            });
        }
    }

    store.emit(
        EventKind::MembershipRemoved,
        actor,
        EventSubject::Group(membership.group_id),
    )?;

    Ok(Removal {
        group_id: membership.group_id,
        user_id: membership.user_id,
        removed,
    })
}

/// Outcome of deleting a group subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRemoval {
    pub group_id: GroupId,
    /// Deleted groups, children before parents
    pub groups: Vec<GroupId>,
    pub memberships_removed: usize,
}

/// Delete a group, its whole subtree, and every membership in them
pub fn destroy_group<S>(
    store: &mut S,
    group_id: &GroupId,
    actor: &UserId,
) -> Result<GroupRemoval, MembershipError>
where
    S: GroupStore + MembershipStore,
{
    if store.find_group(group_id)?.is_none() {
        return Err(MembershipError::GroupNotFound(*group_id));
    }

    let mut groups = vec![*group_id];
    for group in store.descendants_of(group_id) {
        groups.push(group?.id);
    }

    let mut memberships_removed = 0;
    for id in &groups {
        for membership in store.memberships_in_group(id)? {
            if store.delete(&membership.id)? {
                memberships_removed += 1;
            }
        }
    }

    // breadth-first order reversed puts every child before its parent
    groups.reverse();
    for id in &groups {
        store.delete_group(id)?;
    }

    debug!(
        group_id = %group_id,
        actor = %actor,
        groups = groups.len(),
        memberships = memberships_removed,
        "Deleted group subtree"
    );

    Ok(GroupRemoval {
        group_id: *group_id,
        groups,
        memberships_removed,
    })
}
