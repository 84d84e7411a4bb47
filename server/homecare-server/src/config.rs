//! Layered server configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. optional config file (`homecare.toml`, `.yaml`, ...)
//! 3. `HOMECARE__<SECTION>__<KEY>` environment variables (after `.env` is loaded)

use config::{Config, Environment, File};
use events_bus::RateLimiterConfig;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ServerError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub realtime: RealtimeSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "HomeCare Engine".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

/// No `url` means the in-memory store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeSection {
    pub rate_limit_max_events: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_enabled: bool,
    /// Shared rate-limit windows and the cross-instance backplane
    pub redis_url: Option<String>,
    pub backplane_channel: String,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            rate_limit_max_events: 20,
            rate_limit_window_secs: 10,
            rate_limit_enabled: true,
            redis_url: None,
            backplane_channel: "homecare:events".to_string(),
        }
    }
}

impl RealtimeSection {
    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_events: self.rate_limit_max_events,
            window: Duration::from_secs(self.rate_limit_window_secs),
            enabled: self.rate_limit_enabled,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
}

impl AppConfig {
    /// Load from the optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ServerError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix("HOMECARE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|built| built.try_deserialize::<AppConfig>())
            .map_err(|e| ServerError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Refuse to start without a signing secret or with a zero-sized rate window
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ServerError::Configuration(
                "auth.jwt_secret is not set (HOMECARE__AUTH__JWT_SECRET)".to_string(),
            ));
        }
        if self.realtime.rate_limit_enabled
            && (self.realtime.rate_limit_max_events == 0 || self.realtime.rate_limit_window_secs == 0)
        {
            return Err(ServerError::Configuration(
                "realtime rate limit needs a positive event count and window".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_a_secret() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert_eq!(config.realtime.rate_limiter().max_events, 20);
        assert!(matches!(config.validate(), Err(ServerError::Configuration(_))));
    }

    #[test]
    fn test_secret_makes_config_valid() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "a-long-signing-secret".to_string();
        assert!(config.validate().is_ok());

        config.realtime.rate_limit_window_secs = 0;
        assert!(config.validate().is_err());
    }
}
