// Point-to-point call signaling
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::bus::{ConnectionId, EventBus};
use crate::error::Result;
use crate::event::Event;
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    End,
    Decline,
}

impl SignalKind {
    pub fn event_name(self) -> &'static str {
        match self {
            SignalKind::Offer => "call.offer",
            SignalKind::Answer => "call.answer",
            SignalKind::IceCandidate => "call.ice_candidate",
            SignalKind::End => "call.end",
            SignalKind::Decline => "call.decline",
        }
    }
}

impl EventBus {
    /// Relay a signaling message to the target user's personal topic
    ///
    /// Not case-authorized: the caller's claim about the call is trusted.
    /// Counts against the sender's rate limit.
    pub async fn signal(
        &self,
        from: ConnectionId,
        target_user_id: Uuid,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Result<usize> {
        let sender = self.actor_of(from)?;
        self.check_rate(from).await?;

        let topic = Topic::User(target_user_id);
        let event = Event::new(
            kind.event_name(),
            topic,
            json!({
                "fromUserId": sender.user_id,
                "fromRole": sender.role,
                "kind": kind,
                "payload": payload,
            }),
        );
        let delivered = self.fan_out(vec![topic], None, event).await;
        debug!(from = %sender, to = %target_user_id, ?kind, delivered, "Signal relayed");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::testing::StaticMembership;
    use crate::authority::SubscriptionAuthority;
    use crate::error::BusError;
    use crate::rate_limiter::{InMemoryWindowStore, RateLimiter, RateLimiterConfig};
    use auth_identity::{Actor, Role};
    use std::sync::Arc;
    use std::time::Duration;

    fn bus(max_events: u32) -> EventBus {
        let limiter = RateLimiter::new(
            RateLimiterConfig {
                max_events,
                window: Duration::from_secs(10),
                enabled: true,
            },
            Arc::new(InMemoryWindowStore::new()),
        );
        EventBus::new(
            SubscriptionAuthority::new(Arc::new(StaticMembership::default())),
            limiter,
        )
    }

    #[tokio::test]
    async fn test_signal_reaches_only_target_user() {
        let bus = bus(20);
        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let patient = Actor::new(Uuid::new_v4(), Role::Patient);
        let (doctor_conn, mut doctor_rx) = bus.connect(doctor);
        let (_patient_conn, mut patient_rx) = bus.connect(patient);

        let delivered = bus
            .signal(doctor_conn, patient.user_id, SignalKind::Offer, json!({ "sdp": "v=0" }))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let event = patient_rx.recv().await.unwrap();
        assert_eq!(event.name, "call.offer");
        assert_eq!(event.payload["fromUserId"], json!(doctor.user_id));
        assert_eq!(event.payload["payload"]["sdp"], "v=0");
        assert!(doctor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_signal_is_rate_limited() {
        let bus = bus(1);
        let (conn, _rx) = bus.connect(Actor::new(Uuid::new_v4(), Role::Nurse));
        let target = Uuid::new_v4();

        bus.signal(conn, target, SignalKind::IceCandidate, json!({})).await.unwrap();
        let err = bus
            .signal(conn, target, SignalKind::IceCandidate, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::RateLimited { .. }));
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_value(SignalKind::IceCandidate).unwrap(), "ice_candidate");
        assert_eq!(SignalKind::Decline.event_name(), "call.decline");
    }
}
