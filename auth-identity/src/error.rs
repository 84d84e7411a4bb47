use error_common::codes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Signing secret missing; fatal at startup
    #[error("Signing secret is not configured")]
    MissingSecret,

    #[error("Token lifetime of {0} hours is out of range")]
    InvalidTokenTtl(i64),

    #[error("JWT error: {0}")]
    JwtError(String),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::InvalidToken | IdentityError::JwtError(_) => {
                codes::authentication::INVALID_TOKEN
            }
            IdentityError::TokenExpired => codes::authentication::TOKEN_EXPIRED,
            IdentityError::UnknownRole(_) => codes::validation::INVALID_INPUT,
            IdentityError::MissingSecret | IdentityError::InvalidTokenTtl(_) => codes::system::CONFIGURATION,
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
