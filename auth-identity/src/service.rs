use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

use crate::{config::IdentityConfig, error::*, models::*};

/// Issues and verifies the bearer tokens that authenticate actors
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// Build the service; an empty signing secret or an unrepresentable
    /// token lifetime is a configuration error
    pub fn new(config: IdentityConfig) -> Result<Self> {
        if config.jwt_secret.trim().is_empty() {
            return Err(IdentityError::MissingSecret);
        }
        let ttl = Duration::try_hours(config.token_ttl_hours)
            .ok_or(IdentityError::InvalidTokenTtl(config.token_ttl_hours))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(IdentityError::InvalidTokenTtl(self.ttl.num_hours()))?;
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| IdentityError::JwtError(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Actor> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::TokenExpired,
                _ => IdentityError::InvalidToken,
            }
        })?;

        Ok(Actor::new(data.claims.sub, data.claims.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(IdentityConfig::new("unit-test-signing-secret")).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let service = service();
        let user = Uuid::new_v4();
        let token = service.issue(user, Role::Admin).unwrap();

        let actor = service.verify(&token).unwrap();
        assert_eq!(actor, Actor::new(user, Role::Admin));
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = TokenService::new(IdentityConfig::new("   "));
        assert!(matches!(result, Err(IdentityError::MissingSecret)));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_invalid() {
        let other = TokenService::new(IdentityConfig::new("another-secret")).unwrap();
        let token = other.issue(Uuid::new_v4(), Role::Patient).unwrap();

        assert!(matches!(service().verify(&token), Err(IdentityError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let mut config = IdentityConfig::new("unit-test-signing-secret");
        config.token_ttl_hours = -2;
        config.leeway_seconds = 0;
        let service = TokenService::new(config).unwrap();
        let token = service.issue(Uuid::new_v4(), Role::Nurse).unwrap();

        assert!(matches!(service.verify(&token), Err(IdentityError::TokenExpired)));
    }

    #[test]
    fn test_unrepresentable_ttl_is_rejected() {
        let mut config = IdentityConfig::new("unit-test-signing-secret");
        config.token_ttl_hours = i64::MAX;
        let result = TokenService::new(config);
        assert!(matches!(result, Err(IdentityError::InvalidTokenTtl(i64::MAX))));

        let mut config = IdentityConfig::new("unit-test-signing-secret");
        config.token_ttl_hours = 2_500_000_000_000;
        let service = TokenService::new(config).unwrap();
        let err = service.issue(Uuid::new_v4(), Role::Nurse).unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(service().verify("not-a-jwt"), Err(IdentityError::InvalidToken)));
    }
}
