// Error codes implementation
// Stable taxonomy strings shared by the HTTP layer, the real-time transport
// and the audit trail.

pub mod workflow {
    /// Edge does not exist in the state graph.
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    /// Edge exists but the actor's role is not permitted to take it.
    pub const UNAUTHORIZED_ROLE: &str = "unauthorized_role";
    /// A domain guard rejected an otherwise valid edge.
    pub const DOMAIN_GUARD_FAILED: &str = "domain_guard_failed";
    /// Guard reason: a lab order owned by the case is not closed yet.
    pub const LAB_PENDING: &str = "lab_pending";
    pub const INCOMPLETE_CHECKLIST: &str = "incomplete_checklist";
    pub const DUPLICATE_SUBMISSION: &str = "duplicate_submission";
}

pub mod validation {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_SERVICE_TYPE: &str = "unknown_service_type";
    pub const INVALID_INPUT: &str = "invalid_input";
}

pub mod authorization {
    pub const NOT_A_PARTICIPANT: &str = "not_a_participant";
    pub const ACCESS_DENIED: &str = "access_denied";
}

pub mod authentication {
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const TOKEN_EXPIRED: &str = "token_expired";
}

pub mod realtime {
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const CONNECTION_CLOSED: &str = "connection_closed";
}

pub mod resource {
    pub const NOT_FOUND: &str = "not_found";
}

pub mod system {
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const CONFIGURATION: &str = "configuration_error";
    pub const INTERNAL: &str = "internal_error";
}
