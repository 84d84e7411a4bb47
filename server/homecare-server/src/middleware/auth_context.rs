//! Authentication context extraction
//!
//! Every `/api/v1` handler takes an [`AuthContext`]; extraction verifies the
//! bearer token with the server's `TokenService` and yields the acting
//! `(user_id, role)`.

use async_trait::async_trait;
use auth_identity::Actor;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use tracing::debug;

use crate::error::ApiError;
use crate::server::HomeCareServer;

/// Authenticated caller of a request
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub actor: Actor,
}

impl AuthContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::authentication("Missing Authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::authentication("Invalid Authorization header format. Expected: Bearer <token>"))
}

#[async_trait]
impl FromRequestParts<HomeCareServer> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, server: &HomeCareServer) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let actor = server.tokens.verify(token)?;
        debug!(actor = %actor, path = %parts.uri.path(), "Request authenticated");
        Ok(Self { actor })
    }
}
