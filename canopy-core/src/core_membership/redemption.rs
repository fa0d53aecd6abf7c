//! Invitation redemption
//!
//! Accepting an invitation may also add the user to subgroups listed in the
//! invitation's `experiences.invited_group_ids`. Each listed id is vetted
//! against the persisted tree: only genuine descendants of the invitation's
//! group are granted, so an id pointing at some unrelated group (guessed or
//! tampered with) grants nothing. Grants go one level deep; the payloads of
//! granted or reused memberships are never followed.

use super::error::{MembershipError, StoreError};
use super::event::{Event, EventKind, EventSubject};
use super::hierarchy::GroupHierarchy;
use super::membership::{Membership, NewMembership};
use super::store::{EventEmitter, MembershipStore};
use super::types::{GroupId, MembershipId, Timestamp, UserId};
use crate::config::{AlreadyAcceptedPolicy, MembershipConfig};
use std::fmt;
use tracing::{debug, info, warn};

/// Why an invited group id was not granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// The id is the invitation's own group
    InvitationGroup,
    /// No group with this id exists
    UnknownGroup,
    /// The group exists but is not below the invitation's group
    NotDescendant,
    /// The inviter does not administer the group
    InviterNotAdmin,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvitationGroup => "invitation_group",
            RejectionReason::UnknownGroup => "unknown_group",
            RejectionReason::NotDescendant => "not_descendant",
            RejectionReason::InviterNotAdmin => "inviter_not_admin",
        }
    }

    /// True for ids that point outside the invitation's subtree
    pub fn is_alien(&self) -> bool {
        matches!(self, RejectionReason::UnknownGroup | RejectionReason::NotDescendant)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub group_id: GroupId,
    pub membership_id: MembershipId,
    /// The user already had a membership there (possibly pending, now accepted)
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub group_id: GroupId,
    pub reason: RejectionReason,
}

/// Outcome of redeeming an invitation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    /// The invitation as persisted after redemption
    pub membership: Membership,
    /// The `invitation_accepted` event; None when nothing was done
    pub event: Option<Event>,
    pub granted: Vec<Grant>,
    pub rejected: Vec<Rejection>,
    /// The membership had been accepted before this call
    pub already_accepted: bool,
}

impl Redemption {
    fn unchanged(membership: Membership) -> Self {
        Self {
            membership,
            event: None,
            granted: Vec::new(),
            rejected: Vec::new(),
            already_accepted: true,
        }
    }

    pub fn granted_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.granted.iter().map(|g| &g.group_id)
    }

    pub fn rejected_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.rejected.iter().map(|r| &r.group_id)
    }
}

/// Accept a pending invitation and grant its vetted subgroups
///
/// The acceptance event is attributed to the inviter, or to the member when
/// there is no inviter. `actor` is whoever triggered the redemption and is
/// only logged.
pub fn redeem<S>(
    store: &mut S,
    membership_id: &MembershipId,
    actor: &UserId,
    policy: &MembershipConfig,
) -> Result<Redemption, MembershipError>
where
    S: GroupHierarchy + MembershipStore + EventEmitter,
{
    let mut membership = store
        .find(membership_id)?
        .ok_or(MembershipError::MembershipNotFound(*membership_id))?;

    if membership.is_accepted() {
        return match policy.already_accepted {
            AlreadyAcceptedPolicy::Ignore => {
                debug!(membership_id = %membership.id, "Membership already accepted");
                Ok(Redemption::unchanged(membership))
            }
            AlreadyAcceptedPolicy::Reject => Err(MembershipError::AlreadyProcessed(membership.id)),
        };
    }

    let now = Timestamp::now();
    membership.accept(now);
    store.save(&membership)?;

    let attributed_to = membership.attributed_to().clone();
    let event = store.emit(
        EventKind::InvitationAccepted,
        &attributed_to,
        EventSubject::Membership(membership.id),
    )?;

    let candidates: Vec<GroupId> = membership.experiences.invited_groups().copied().collect();
    let mut granted = Vec::new();
    let mut rejected = Vec::new();

    for candidate in candidates {
        if let Some(reason) = vet_candidate(store, &membership, &candidate, policy)? {
            warn!(
                membership_id = %membership.id,
                group_id = %candidate,
                reason = %reason,
                "Rejected invited group"
            );
            rejected.push(Rejection {
                group_id: candidate,
                reason,
            });
            continue;
        }

        granted.push(grant(store, &membership, candidate, now)?);
    }

    info!(
        membership_id = %membership.id,
        actor = %actor,
        granted = granted.len(),
        rejected = rejected.len(),
        "Invitation redeemed"
    );

    Ok(Redemption {
        membership,
        event: Some(event),
        granted,
        rejected,
        already_accepted: false,
    })
}

fn vet_candidate<S>(
    store: &S,
    invitation: &Membership,
    candidate: &GroupId,
    policy: &MembershipConfig,
) -> Result<Option<RejectionReason>, StoreError>
where
    S: GroupHierarchy + MembershipStore,
{
    if *candidate == invitation.group_id {
        return Ok(Some(RejectionReason::InvitationGroup));
    }
    if store.find_group(candidate)?.is_none() {
        return Ok(Some(RejectionReason::UnknownGroup));
    }
    if !store.is_descendant(candidate, &invitation.group_id)? {
        return Ok(Some(RejectionReason::NotDescendant));
    }
    if policy.require_inviter_admin
        && !inviter_administers(store, invitation.inviter_id.as_ref(), candidate)?
    {
        return Ok(Some(RejectionReason::InviterNotAdmin));
    }
    Ok(None)
}

/// Admin of `group_id` itself or of any group above it
fn inviter_administers<S>(
    store: &S,
    inviter: Option<&UserId>,
    group_id: &GroupId,
) -> Result<bool, StoreError>
where
    S: GroupHierarchy + MembershipStore,
{
    let Some(inviter) = inviter else {
        return Ok(false);
    };

    let is_admin = |group: &GroupId| -> Result<bool, StoreError> {
        Ok(store
            .find_by_group_and_user(group, inviter)?
            .is_some_and(|m| m.admin && m.is_accepted()))
    };

    if is_admin(group_id)? {
        return Ok(true);
    }
    for ancestor in store.ancestors_of(group_id) {
        if is_admin(&ancestor?.id)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn grant<S: MembershipStore>(
    store: &mut S,
    invitation: &Membership,
    group_id: GroupId,
    now: Timestamp,
) -> Result<Grant, StoreError> {
    if let Some(mut existing) = store.find_by_group_and_user(&group_id, &invitation.user_id)? {
        if existing.accept(now) {
            store.save(&existing)?;
        }
        debug!(group_id = %group_id, membership_id = %existing.id, "Reused membership");
        return Ok(Grant {
            group_id,
            membership_id: existing.id,
            reused: true,
        });
    }

    let mut attrs = NewMembership::accepted(
        group_id,
        invitation.user_id.clone(),
        invitation.inviter_id.clone(),
    );
    attrs.accepted_at = Some(now);
    let created = store.create(attrs)?;

    debug!(group_id = %group_id, membership_id = %created.id, "Granted membership");
    Ok(Grant {
        group_id,
        membership_id: created.id,
        reused: false,
    })
}
