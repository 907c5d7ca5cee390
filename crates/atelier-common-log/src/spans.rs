//! Span helpers shared by the authorization crates.

use std::fmt::Display;
use tracing::{debug_span, info_span, Span};

/// Span for a single authorization decision.
pub fn authz_span(user: &dyn Display, workspace: &dyn Display, check: &str) -> Span {
    debug_span!("authz", user = %user, workspace = %workspace, check = %check)
}

/// Span for a membership mutation workflow.
pub fn mutation_span(kind: &str, workspace: &dyn Display) -> Span {
    info_span!("membership_mutation", kind = %kind, workspace = %workspace)
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Complete the timer and record duration.
    pub fn finish(self) -> std::time::Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
        duration
    }
}

/// Time a block of code, logging the duration at debug level.
#[macro_export]
macro_rules! timed {
    ($name:expr, $body:expr) => {{
        let timer = $crate::spans::Timer::start($name);
        let result = $body;
        timer.finish();
        result
    }};
}
