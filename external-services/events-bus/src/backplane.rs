// Cross-instance relay
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::authority::CaseMembership;
use crate::bus::EventBus;
use crate::error::Result;
use crate::event::Event;
use crate::topic::Topic;

/// One publish as seen by every instance
///
/// The receiving instance applies the same case-membership filter to its own
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: Uuid,
    pub targets: Vec<Topic>,
    pub membership: Option<CaseMembership>,
    pub event: Event,
}

/// Shares publishes between server instances
#[async_trait]
pub trait Backplane: Send + Sync {
    async fn relay(&self, envelope: &Envelope) -> Result<()>;
}

/// Redis pub/sub backplane
pub struct RedisBackplane {
    client: redis::Client,
    publisher: ConnectionManager,
    channel: String,
}

impl RedisBackplane {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let channel = channel.into();
        info!(channel = %channel, "Redis backplane connected");
        Ok(Self {
            client,
            publisher,
            channel,
        })
    }

    /// Feed relayed envelopes into the local bus; reconnects after failures
    pub fn spawn_listener(&self, bus: EventBus) -> JoinHandle<()> {
        let client = self.client.clone();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = listen(&client, &channel, &bus).await {
                    error!(channel = %channel, error = %e, "Backplane subscription lost");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }
}

async fn listen(client: &redis::Client, channel: &str, bus: &EventBus) -> Result<()> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.subscribe(channel).await?;
    info!(channel = %channel, "Listening for relayed events");

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Unreadable backplane message");
                continue;
            }
        };
        match serde_json::from_str::<Envelope>(&payload) {
            Ok(envelope) => {
                bus.deliver_relayed(&envelope);
            }
            Err(e) => warn!(error = %e, "Malformed backplane envelope"),
        }
    }
    Ok(())
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn relay(&self, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(&self.channel, payload).await?;
        Ok(())
    }
}
