use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Allowed clock skew when checking `exp`, in seconds
    pub leeway_seconds: u64,
}

impl IdentityConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            ..Self::default()
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 12,
            leeway_seconds: 30,
        }
    }
}
