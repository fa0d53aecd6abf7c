pub mod config;
pub mod core_membership;
pub mod logging;
pub mod metrics;
pub mod tracing_ops;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use core_membership::{
    AsyncMembershipService, MembershipError, MembershipService, MembershipSqlStore,
};
pub use logging::{init_logging, LogLevel};
