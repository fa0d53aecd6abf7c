//! Spans around lifecycle operations
//!
//! Each mutating service call gets one INFO span carrying the ids it acts on.
//! Store-level `debug!` lines emitted inside the call nest under it.

use std::cell::Cell;
use std::time::Instant;
use tracing::{field, info_span, Span};

/// A running lifecycle operation
pub struct TracedOperation {
    span: Span,
    start: Instant,
    failed: Cell<bool>,
}

impl TracedOperation {
    fn from_span(span: Span) -> Self {
        Self {
            span,
            start: Instant::now(),
            failed: Cell::new(false),
        }
    }

    /// Run `f` with this operation's span entered
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    /// Mark the span failed; the error is also logged under it
    pub fn record_error(&self, error: &str) {
        self.failed.set(true);
        self.span.record("outcome", "error");
        tracing::error!(parent: &self.span, error = error, "operation failed");
    }

    /// Close the operation, logging its duration
    pub fn complete(self) {
        if !self.failed.get() {
            self.span.record("outcome", "ok");
        }
        tracing::info!(
            parent: &self.span,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "operation completed"
        );
    }
}

/// Membership lifecycle spans
pub mod membership {
    use super::*;

    pub fn trace_destroy(membership_id: &str, actor: &str) -> TracedOperation {
        TracedOperation::from_span(info_span!(
            "membership_destroy",
            membership_id,
            actor,
            outcome = field::Empty
        ))
    }

    pub fn trace_redeem(membership_id: &str, actor: &str) -> TracedOperation {
        TracedOperation::from_span(info_span!(
            "membership_redeem",
            membership_id,
            actor,
            outcome = field::Empty
        ))
    }

    pub fn trace_destroy_group(group_id: &str, actor: &str) -> TracedOperation {
        TracedOperation::from_span(info_span!(
            "group_destroy",
            group_id,
            actor,
            outcome = field::Empty
        ))
    }
}
