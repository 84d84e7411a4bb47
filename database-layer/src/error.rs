use error_common::codes;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Optimistic check failed: the stored state moved on since it was read
    #[error("{entity} {id} is {actual}, expected {expected}")]
    Conflict {
        entity: &'static str,
        id: Uuid,
        expected: String,
        actual: String,
    },

    /// Create-once record already exists
    #[error("{entity} already exists for {id}")]
    Duplicate { entity: &'static str, id: Uuid },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Store connectivity and integrity failures; everything else is a
    /// rejection the caller can act on
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DatabaseError::Conflict { .. } | DatabaseError::Duplicate { .. } | DatabaseError::NotFound { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            DatabaseError::Conflict { .. } => codes::workflow::INVALID_TRANSITION,
            DatabaseError::Duplicate { .. } => codes::workflow::DUPLICATE_SUBMISSION,
            DatabaseError::NotFound { .. } => codes::resource::NOT_FOUND,
            _ => codes::system::STORE_UNAVAILABLE,
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
