use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown audit action: {0}")]
    UnknownAction(String),

    #[error("Audit storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;
