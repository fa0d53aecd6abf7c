//! Metrics for membership lifecycle operations
//!
//! Recorded through the `metrics` facade. Without an installed recorder every
//! call is a no-op, so the library never requires an exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const DESTROY_TOTAL: &str = "membership.destroy.total";
pub const REMOVED_TOTAL: &str = "membership.removed.total";
pub const REDEEM_TOTAL: &str = "membership.redeem.total";
pub const GRANTS_TOTAL: &str = "membership.grants.total";
pub const ALIEN_REJECTIONS_TOTAL: &str = "membership.alien_rejections.total";
pub const FAILURES_TOTAL: &str = "membership.failures.total";
pub const OPERATION_DURATION_MS: &str = "membership.operation.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(DESTROY_TOTAL, "Number of membership destroy operations");
    describe_counter!(REMOVED_TOTAL, "Memberships removed by destroy cascades");
    describe_counter!(REDEEM_TOTAL, "Number of invitations redeemed");
    describe_counter!(GRANTS_TOTAL, "Subgroup memberships granted on redemption");
    describe_counter!(
        ALIEN_REJECTIONS_TOTAL,
        "Invited group ids rejected on redemption"
    );
    describe_counter!(FAILURES_TOTAL, "Lifecycle operations that rolled back");
    describe_histogram!(
        OPERATION_DURATION_MS,
        "Lifecycle operation duration in milliseconds"
    );
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Times one lifecycle operation, labelled by operation name
pub struct Timer {
    operation: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(OPERATION_DURATION_MS, "operation" => self.operation)
            .record(duration.as_secs_f64() * 1000.0);
    }
}
