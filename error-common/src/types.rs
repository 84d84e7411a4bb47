use std::fmt;

use crate::context::ErrorContext;

/// How a failure must be treated by the outermost layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected outcome; returned to the caller with enough detail to fix the request
    Recoverable,
    /// Store connectivity or configuration problem; surfaced as a generic server fault
    Fatal,
}

impl Severity {
    pub fn is_fatal(self) -> bool {
        self == Severity::Fatal
    }
}

/// Log an error together with its context, at a level matching its severity
pub fn log_error(error: &dyn fmt::Display, code: &str, severity: Severity, context: &ErrorContext) {
    match severity {
        Severity::Recoverable => tracing::debug!(
            code,
            request_id = ?context.request_id,
            actor_id = ?context.actor_id,
            entity_id = ?context.entity_id,
            additional = ?context.additional,
            error = %error,
            "Request rejected"
        ),
        Severity::Fatal => tracing::error!(
            code,
            request_id = ?context.request_id,
            actor_id = ?context.actor_id,
            entity_id = ?context.entity_id,
            additional = ?context.additional,
            error = %error,
            "Unrecoverable error"
        ),
    }
}
