//! Async wrapper around [`MembershipService`]
//!
//! SQLite calls block, so each operation is moved onto tokio's blocking pool.
//! Serialization between concurrent cascades comes from the store's
//! `BEGIN IMMEDIATE` transactions, not from a lock here.

use super::cascade::{GroupRemoval, Removal};
use super::error::MembershipError;
use super::membership::{Experiences, Membership};
use super::redemption::Redemption;
use super::service::MembershipService;
use super::types::{GroupId, UserId};
use std::sync::Arc;

#[derive(Clone)]
pub struct AsyncMembershipService {
    inner: Arc<MembershipService>,
}

impl AsyncMembershipService {
    pub fn new(service: MembershipService) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// The wrapped synchronous service
    pub fn service(&self) -> &MembershipService {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> Result<T, MembershipError>
    where
        F: FnOnce(&MembershipService) -> Result<T, MembershipError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| MembershipError::TaskFailed(e.to_string()))?
    }

    pub async fn invite(
        &self,
        group_id: GroupId,
        user_id: UserId,
        inviter_id: UserId,
        experiences: Experiences,
    ) -> Result<Membership, MembershipError> {
        self.run(move |s| s.invite(&group_id, &user_id, &inviter_id, experiences))
            .await
    }

    pub async fn add_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        inviter_id: Option<UserId>,
    ) -> Result<Membership, MembershipError> {
        self.run(move |s| s.add_member(&group_id, &user_id, inviter_id.as_ref()))
            .await
    }

    pub async fn members_of(&self, group_id: GroupId) -> Result<Vec<UserId>, MembershipError> {
        self.run(move |s| s.members_of(&group_id)).await
    }

    pub async fn redeem(
        &self,
        membership: Membership,
        actor: UserId,
    ) -> Result<Redemption, MembershipError> {
        self.run(move |s| s.redeem(&membership, &actor)).await
    }

    pub async fn destroy(
        &self,
        membership: Membership,
        actor: UserId,
    ) -> Result<Removal, MembershipError> {
        self.run(move |s| s.destroy(&membership, &actor)).await
    }

    pub async fn destroy_group(
        &self,
        group_id: GroupId,
        actor: UserId,
    ) -> Result<GroupRemoval, MembershipError> {
        self.run(move |s| s.destroy_group(&group_id, &actor)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipConfig;
    use crate::core_membership::storage::MembershipSqlStore;

    fn setup() -> AsyncMembershipService {
        let store = MembershipSqlStore::memory().expect("Failed to create store");
        AsyncMembershipService::new(MembershipService::new(store, MembershipConfig::default()))
    }

    #[tokio::test]
    async fn test_async_invite_and_redeem() {
        let service = setup();
        let group = service.service().create_group("Group", None).unwrap();
        let sub = service.service().create_group("Sub", Some(&group.id)).unwrap();

        let invitation = service
            .invite(
                group.id,
                UserId::new("bob"),
                UserId::new("alice"),
                Experiences::inviting_to([sub.id]),
            )
            .await
            .unwrap();
        let redemption = service.redeem(invitation, UserId::new("bob")).await.unwrap();

        assert_eq!(redemption.granted.len(), 1);
        assert_eq!(
            service.members_of(sub.id).await.unwrap(),
            vec![UserId::new("bob")]
        );
    }

    #[tokio::test]
    async fn test_async_destroy_missing() {
        let service = setup();
        let group = service.service().create_group("Group", None).unwrap();
        let member = service
            .add_member(group.id, UserId::new("bob"), None)
            .await
            .unwrap();

        service.destroy(member.clone(), UserId::new("bob")).await.unwrap();
        let again = service.destroy(member, UserId::new("bob")).await;
        assert!(matches!(again, Err(MembershipError::MembershipNotFound(_))));
    }
}
