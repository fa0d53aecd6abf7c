//! Group membership lifecycle
//!
//! Users belong to groups arranged in a tree. Joining and leaving have side
//! effects across that tree, and this module owns them.
//!
//! ## Architecture
//!
//! - **GroupHierarchy**: read-only traversal over the persisted parent links
//! - **MembershipStore / GroupStore / EventEmitter**: storage seams
//! - **cascade**: removing a user from a group subtree
//! - **redemption**: accepting an invitation and granting vetted subgroups
//! - **MembershipService**: one transaction per operation, plus tracing and metrics
//!
//! ## Key Design Principles
//!
//! 1. Guest groups of discussions and polls are ordinary leaves of the tree
//! 2. Invited subgroups are checked against the tree, never trusted
//! 3. Every operation commits or rolls back as a whole

pub mod async_service;
pub mod cascade;
pub mod error;
pub mod event;
pub mod group;
pub mod hierarchy;
pub mod membership;
pub mod redemption;
pub mod service;
pub mod storage;
pub mod store;
pub mod types;

pub use async_service::AsyncMembershipService;
pub use cascade::{GroupRemoval, Removal, RemovedMembership};
pub use error::{MembershipError, StoreError};
pub use event::{Event, EventKind, EventSubject};
pub use group::{Group, GroupKind, ThreadKind, ThreadRef};
pub use hierarchy::{Ancestors, Descendants, GroupHierarchy};
pub use membership::{Experiences, Membership, NewMembership};
pub use redemption::{Grant, Redemption, Rejection, RejectionReason};
pub use service::MembershipService;
pub use storage::{MembershipSqlStore, SqlTxn};
pub use store::{EventEmitter, GroupStore, MembershipStore};
pub use types::{EventId, GroupId, MembershipId, ThreadId, Timestamp, UserId};
