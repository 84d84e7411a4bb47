use auth_identity::{IdentityConfig, TokenService};
use chrono::{DateTime, Utc};
use database_layer::{CareStore, DatabasePool, InMemoryCareStore, PoolOptions, PostgresCareStore};
use events_bus::{
    EventBus, InMemoryWindowStore, RateLimiter, RateLimiterConfig, RedisBackplane, RedisWindowStore,
    SubscriptionAuthority, WindowStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use workflow_engine::FlowRuleRegistry;

use crate::config::AppConfig;
use crate::error::ServerError;
use crate::services::{AuditLogService, CaseLifecycleService, LabOrderService, StoreMembership};

/// Main HomeCare server state
#[derive(Clone)]
pub struct HomeCareServer {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CareStore>,
    pub bus: EventBus,
    pub tokens: Arc<TokenService>,
    pub registry: Arc<FlowRuleRegistry>,
    pub started_at: DateTime<Utc>,
}

impl HomeCareServer {
    /// Build every collaborator from configuration
    ///
    /// Postgres when `database.url` is set, in-memory otherwise; Redis-backed
    /// rate windows and backplane when `realtime.redis_url` is set.
    pub async fn new(config: AppConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let store: Arc<dyn CareStore> = match &config.database.url {
            Some(url) => {
                let options = PoolOptions {
                    max_connections: config.database.max_connections,
                    ..PoolOptions::default()
                };
                let pool = DatabasePool::new(url, &options).await?;
                if config.database.run_migrations {
                    pool.migrate().await?;
                }
                Arc::new(PostgresCareStore::new(pool))
            }
            None => {
                warn!("No database.url configured, using the in-memory store");
                Arc::new(InMemoryCareStore::new())
            }
        };

        let window_store: Arc<dyn WindowStore> = match &config.realtime.redis_url {
            Some(url) => Arc::new(RedisWindowStore::connect(url).await?),
            None => Arc::new(InMemoryWindowStore::new()),
        };

        let tokens = TokenService::new(IdentityConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            token_ttl_hours: config.auth.token_ttl_hours,
            ..IdentityConfig::default()
        })?;

        let limiter = config.realtime.rate_limiter();
        let server = Self::from_parts(config, store, tokens, limiter, window_store);

        if let Some(url) = &server.config.realtime.redis_url {
            let backplane = RedisBackplane::connect(url, server.config.realtime.backplane_channel.clone()).await?;
            let _listener = backplane.spawn_listener(server.bus.clone());
            server.bus.set_backplane(Arc::new(backplane));
            info!(
                channel = %server.config.realtime.backplane_channel,
                instance_id = %server.bus.instance_id(),
                "Cross-instance event backplane enabled"
            );
        }

        Ok(server)
    }

    /// Assemble from ready-made parts; used by `new` and by tests
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn CareStore>,
        tokens: TokenService,
        limiter: RateLimiterConfig,
        window_store: Arc<dyn WindowStore>,
    ) -> Self {
        let authority = SubscriptionAuthority::new(Arc::new(StoreMembership::new(Arc::clone(&store))));
        let bus = EventBus::new(authority, RateLimiter::new(limiter, window_store));

        Self {
            config: Arc::new(config),
            store,
            bus,
            tokens: Arc::new(tokens),
            registry: Arc::new(FlowRuleRegistry::standard()),
            started_at: Utc::now(),
        }
    }

    pub fn cases(&self) -> CaseLifecycleService {
        CaseLifecycleService::new(Arc::clone(&self.store), self.bus.clone(), Arc::clone(&self.registry))
    }

    pub fn lab_orders(&self) -> LabOrderService {
        LabOrderService::new(Arc::clone(&self.store), self.bus.clone())
    }

    pub fn audit_log(&self) -> AuditLogService {
        AuditLogService::new(Arc::clone(&self.store))
    }
}
