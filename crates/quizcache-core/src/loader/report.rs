//! Surfacing unrecoverable failures to the user.

use tracing::error;

/// Receives short, non-technical messages meant for the user.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Reports through the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, message: &str) {
        error!(user_message = %message, "User-facing error");
    }
}
