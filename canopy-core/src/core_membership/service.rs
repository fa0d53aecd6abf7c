//! Membership lifecycle service
//!
//! Every public operation runs in exactly one store transaction. Permission
//! checks belong to the caller.

use super::cascade::{self, GroupRemoval, Removal};
use super::error::MembershipError;
use super::group::{Group, ThreadRef};
use super::hierarchy::GroupHierarchy;
use super::membership::{Experiences, Membership, NewMembership};
use super::redemption::{self, Redemption};
use super::storage::{MembershipSqlStore, SqlTxn};
use super::store::{GroupStore, MembershipStore};
use super::types::{GroupId, MembershipId, Timestamp, UserId};
use crate::config::{Config, MembershipConfig};
use crate::metrics::{self as membership_metrics, Timer};
use crate::tracing_ops::{membership as spans, TracedOperation};
use tracing::info;

pub struct MembershipService {
    store: MembershipSqlStore,
    config: MembershipConfig,
}

fn require_group(txn: &SqlTxn<'_>, id: &GroupId) -> Result<Group, MembershipError> {
    txn.find_group(id)?.ok_or(MembershipError::GroupNotFound(*id))
}

impl MembershipService {
    pub fn new(store: MembershipSqlStore, config: MembershipConfig) -> Self {
        Self { store, config }
    }

    /// Open the configured store and build a service on it
    pub fn from_config(config: &Config) -> Result<Self, MembershipError> {
        let store = MembershipSqlStore::open(&config.store)?;
        membership_metrics::init_metrics();
        Ok(Self::new(store, config.membership.clone()))
    }

    pub fn store(&self) -> &MembershipSqlStore {
        &self.store
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    // ===== Groups =====

    /// Create a formal group, optionally below `parent`
    pub fn create_group(
        &self,
        name: &str,
        parent: Option<&GroupId>,
    ) -> Result<Group, MembershipError> {
        self.store.transaction(|txn| {
            let parent = parent.map(|id| require_group(txn, id)).transpose()?;
            let group = Group::formal(name, parent.as_ref())?;
            txn.insert_group(&group)?;
            Ok(group)
        })
    }

    /// Guest group for `thread`, created under `host` on first use
    ///
    /// A thread has at most one guest group; asking for it under a different
    /// host is an error.
    pub fn create_guest_group(
        &self,
        host: &GroupId,
        thread: ThreadRef,
    ) -> Result<Group, MembershipError> {
        self.store.transaction(|txn| {
            if let Some(existing) = txn.guest_group_for(&thread)? {
                if existing.parent_id != Some(*host) {
                    return Err(MembershipError::InvalidHierarchy(format!(
                        "{} {} already has a guest group under another host",
                        thread.kind, thread.id
                    )));
                }
                return Ok(existing);
            }

            let host = require_group(txn, host)?;
            let group = Group::guest(&host, thread)?;
            txn.insert_group(&group)?;
            Ok(group)
        })
    }

    pub fn find_group(&self, id: &GroupId) -> Result<Group, MembershipError> {
        self.store.read(|txn| require_group(txn, id))
    }

    /// Delete a group with its subtree and all memberships in it
    pub fn destroy_group(
        &self,
        group_id: &GroupId,
        actor: &UserId,
    ) -> Result<GroupRemoval, MembershipError> {
        let op = spans::trace_destroy_group(&group_id.to_string(), actor.as_str());
        let result = self.instrumented(&op, "destroy_group", || {
            self.store
                .transaction(|txn| cascade::destroy_group(txn, group_id, actor))
        });

        if let Ok(removal) = &result {
            membership_metrics::record_counter(
                membership_metrics::REMOVED_TOTAL,
                removal.memberships_removed as u64,
            );
            info!(
                group_id = %group_id,
                groups = removal.groups.len(),
                memberships = removal.memberships_removed,
                "Group destroyed"
            );
        }
        op.complete();
        result
    }

    // ===== Memberships =====

    pub fn find_membership(&self, id: &MembershipId) -> Result<Membership, MembershipError> {
        self.store
            .read(|txn| txn.find(id)?.ok_or(MembershipError::MembershipNotFound(*id)))
    }

    /// Create a pending invitation
    pub fn invite(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        inviter_id: &UserId,
        experiences: Experiences,
    ) -> Result<Membership, MembershipError> {
        self.store.transaction(|txn| {
            require_group(txn, group_id)?;
            if txn.find_by_group_and_user(group_id, user_id)?.is_some() {
                return Err(MembershipError::AlreadyMember {
                    group_id: *group_id,
                    user_id: user_id.clone(),
                });
            }

            let membership = txn.create(NewMembership::invitation(
                *group_id,
                user_id.clone(),
                inviter_id.clone(),
                experiences,
            ))?;
            info!(group_id = %group_id, user_id = %user_id, inviter = %inviter_id, "Invitation created");
            Ok(membership)
        })
    }

    /// Add an accepted member; accepts a pending membership if there is one
    pub fn add_member(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        inviter_id: Option<&UserId>,
    ) -> Result<Membership, MembershipError> {
        self.store.transaction(|txn| {
            Self::upsert_accepted(txn, group_id, user_id, inviter_id, false)
        })
    }

    /// Add an accepted admin, promoting an existing membership
    pub fn add_admin(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Membership, MembershipError> {
        self.store
            .transaction(|txn| Self::upsert_accepted(txn, group_id, user_id, None, true))
    }

    fn upsert_accepted(
        txn: &mut SqlTxn<'_>,
        group_id: &GroupId,
        user_id: &UserId,
        inviter_id: Option<&UserId>,
        admin: bool,
    ) -> Result<Membership, MembershipError> {
        require_group(txn, group_id)?;

        if let Some(mut existing) = txn.find_by_group_and_user(group_id, user_id)? {
            let accepted = existing.accept(Timestamp::now());
            let promoted = admin && !existing.admin;
            existing.admin |= admin;
            if accepted || promoted {
                txn.save(&existing)?;
            }
            return Ok(existing);
        }

        let mut attrs = NewMembership::accepted(*group_id, user_id.clone(), inviter_id.cloned());
        attrs.admin = admin;
        Ok(txn.create(attrs)?)
    }

    /// Users with an accepted membership in the group
    pub fn members_of(&self, group_id: &GroupId) -> Result<Vec<UserId>, MembershipError> {
        self.store.read(|txn| {
            require_group(txn, group_id)?;
            Ok(txn.members_of(group_id)?)
        })
    }

    pub fn memberships_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Membership>, MembershipError> {
        self.store
            .read(|txn| Ok(txn.memberships_for_user(user_id)?))
    }

    /// Accept an invitation and grant its vetted subgroups
    pub fn redeem(
        &self,
        membership: &Membership,
        actor: &UserId,
    ) -> Result<Redemption, MembershipError> {
        let op = spans::trace_redeem(&membership.id.to_string(), actor.as_str());
        let result = self.instrumented(&op, "redeem", || {
            self.store.transaction(|txn| {
                redemption::redeem(txn, &membership.id, actor, &self.config)
            })
        });

        if let Ok(redemption) = &result {
            if !redemption.already_accepted {
                membership_metrics::record_counter(membership_metrics::REDEEM_TOTAL, 1);
            }
            membership_metrics::record_counter(
                membership_metrics::GRANTS_TOTAL,
                redemption.granted.len() as u64,
            );
            let aliens = redemption.rejected.iter().filter(|r| r.reason.is_alien()).count();
            membership_metrics::record_counter(
                membership_metrics::ALIEN_REJECTIONS_TOTAL,
                aliens as u64,
            );
        }
        op.complete();
        result
    }

    /// Remove the member from the group and its whole subtree
    pub fn destroy(
        &self,
        membership: &Membership,
        actor: &UserId,
    ) -> Result<Removal, MembershipError> {
        let op = spans::trace_destroy(&membership.id.to_string(), actor.as_str());
        let result = self.instrumented(&op, "destroy", || {
            self.store
                .transaction(|txn| cascade::destroy(txn, &membership.id, actor))
        });

        if let Ok(removal) = &result {
            membership_metrics::record_counter(membership_metrics::DESTROY_TOTAL, 1);
            membership_metrics::record_counter(
                membership_metrics::REMOVED_TOTAL,
                removal.removed.len() as u64,
            );
            info!(
                membership_id = %membership.id,
                user_id = %removal.user_id,
                removed = removal.removed.len(),
                "Membership destroyed"
            );
        }
        op.complete();
        result
    }

    fn instrumented<T>(
        &self,
        op: &TracedOperation,
        operation: &'static str,
        f: impl FnOnce() -> Result<T, MembershipError>,
    ) -> Result<T, MembershipError> {
        let timer = Timer::start(operation);
        let result = op.in_scope(f);
        timer.stop();

        if let Err(e) = &result {
            membership_metrics::record_counter(membership_metrics::FAILURES_TOTAL, 1);
            op.record_error(&e.to_string());
        }
        result
    }
}
