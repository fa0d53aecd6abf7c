//! Error types for membership storage and lifecycle operations

use super::types::{GroupId, MembershipId, UserId};
use thiserror::Error;

/// Failures raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Errors returned by membership lifecycle operations
///
/// Any error aborts the enclosing transaction; nothing is partially applied.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Membership not found: {0}")]
    MembershipNotFound(MembershipId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Membership already processed: {0}")]
    AlreadyProcessed(MembershipId),

    #[error("User {user_id} is already a member of group {group_id}")]
    AlreadyMember { group_id: GroupId, user_id: UserId },

    #[error("Invalid group hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl MembershipError {
    /// True for the not-found kinds (membership or group)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MembershipError::MembershipNotFound(_)
                | MembershipError::GroupNotFound(_)
                | MembershipError::Store(StoreError::NotFound(_))
        )
    }

    /// True when the underlying store failed
    pub fn is_store_failure(&self) -> bool {
        matches!(self, MembershipError::Store(_))
    }
}

impl From<rusqlite::Error> for MembershipError {
    fn from(err: rusqlite::Error) -> Self {
        MembershipError::Store(StoreError::Sql(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        let not_found = MembershipError::MembershipNotFound(MembershipId::from_bytes([1; 32]));
        assert!(not_found.is_not_found());
        assert!(!not_found.is_store_failure());

        let processed = MembershipError::AlreadyProcessed(MembershipId::from_bytes([1; 32]));
        assert!(!processed.is_not_found());
        assert!(!processed.is_store_failure());

        let store: MembershipError = StoreError::Corrupt("bad row".to_string()).into();
        assert!(store.is_store_failure());
    }

    #[test]
    fn test_store_not_found_counts_as_not_found() {
        let err: MembershipError = StoreError::NotFound("group".to_string()).into();
        assert!(err.is_not_found());
        assert!(err.is_store_failure());
    }

    #[test]
    fn test_error_display() {
        let err = MembershipError::InvalidHierarchy("guest groups cannot have children".into());
        assert_eq!(
            err.to_string(),
            "Invalid group hierarchy: guest groups cannot have children"
        );
    }
}
