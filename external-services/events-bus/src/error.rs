use std::time::Duration;

use error_common::codes;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Not a participant of case {case_id}")]
    NotAParticipant { case_id: Uuid },

    #[error("Rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    #[error("Unknown connection: {0}")]
    UnknownConnection(Uuid),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Membership lookup failed: {0}")]
    MembershipLookup(String),

    #[error("Rate limit store error: {0}")]
    WindowStore(String),

    #[error("Backplane error: {0}")]
    Backplane(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    pub fn code(&self) -> &'static str {
        match self {
            BusError::NotAParticipant { .. } => codes::authorization::NOT_A_PARTICIPANT,
            BusError::RateLimited { .. } => codes::realtime::RATE_LIMITED,
            BusError::UnknownConnection(_) => codes::realtime::CONNECTION_CLOSED,
            BusError::InvalidTopic(_) | BusError::Serialization(_) => codes::validation::INVALID_INPUT,
            BusError::MembershipLookup(_) | BusError::WindowStore(_) | BusError::Backplane(_) => {
                codes::system::STORE_UNAVAILABLE
            }
        }
    }
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Backplane(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
