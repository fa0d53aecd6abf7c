//! Storage layer for groups and memberships
//!
//! Provides SQLite persistence for the membership system.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::{MembershipSqlStore, SqlTxn};
