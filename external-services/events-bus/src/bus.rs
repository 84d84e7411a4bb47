// Topic subscriptions and fan-out
use std::collections::HashSet;
use std::sync::Arc;

use auth_identity::Actor;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authority::{CaseMembership, SubscriptionAuthority};
use crate::backplane::{Backplane, Envelope};
use crate::error::{BusError, Result};
use crate::event::{Event, Notification};
use crate::rate_limiter::RateLimiter;
use crate::topic::Topic;

pub type ConnectionId = Uuid;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

struct Connection {
    actor: Actor,
    /// `None` once disconnected; delivery holds the read lock while sending
    outbound: RwLock<Option<mpsc::UnboundedSender<Event>>>,
    topics: Mutex<HashSet<Topic>>,
}

impl Connection {
    fn deliver(&self, event: &Event) -> bool {
        match self.outbound.read().as_ref() {
            Some(tx) => tx.send(event.clone()).is_ok(),
            None => false,
        }
    }
}

struct BusInner {
    instance_id: Uuid,
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    authority: SubscriptionAuthority,
    limiter: RateLimiter,
    backplane: RwLock<Option<Arc<dyn Backplane>>>,
}

/// Process-wide subscription table and delivery fabric
///
/// Topic sets live in a sharded map: operations on different topics do not
/// contend, operations on one topic serialize on its shard.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(authority: SubscriptionAuthority, limiter: RateLimiter) -> Self {
        Self {
            inner: Arc::new(BusInner {
                instance_id: Uuid::new_v4(),
                topics: DashMap::new(),
                connections: DashMap::new(),
                authority,
                limiter,
                backplane: RwLock::new(None),
            }),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    pub fn authority(&self) -> &SubscriptionAuthority {
        &self.inner.authority
    }

    pub fn set_backplane(&self, backplane: Arc<dyn Backplane>) {
        *self.inner.backplane.write() = Some(backplane);
    }

    /// Register an authenticated connection, subscribed to its user and role topics
    pub fn connect(&self, actor: Actor) -> (ConnectionId, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let connection = Arc::new(Connection {
            actor,
            outbound: RwLock::new(Some(tx)),
            topics: Mutex::new(HashSet::new()),
        });
        self.inner.connections.insert(id, connection);

        self.subscribe(id, Topic::User(actor.user_id));
        self.subscribe(id, Topic::Role(actor.role));

        info!(connection = %id, actor = %actor, "Real-time connection registered");
        (id, rx)
    }

    /// Remove the connection from every topic; nothing is delivered to it afterwards
    pub async fn disconnect(&self, id: ConnectionId) {
        let Some((_, connection)) = self.inner.connections.remove(&id) else {
            return;
        };
        connection.outbound.write().take();

        let topics: Vec<Topic> = connection.topics.lock().drain().collect();
        for topic in topics {
            self.remove_from_topic(id, &topic);
        }

        if let Err(e) = self.inner.limiter.release(id).await {
            warn!(connection = %id, error = %e, "Failed to release rate-limit window");
        }
        info!(connection = %id, actor = %connection.actor, "Real-time connection closed");
    }

    pub fn actor_of(&self, id: ConnectionId) -> Result<Actor> {
        self.inner
            .connections
            .get(&id)
            .map(|c| c.actor)
            .ok_or(BusError::UnknownConnection(id))
    }

    pub(crate) async fn check_rate(&self, id: ConnectionId) -> Result<()> {
        self.inner.limiter.check(id).await
    }

    /// Explicit case-topic join: rate limited, then authorized against live membership
    pub async fn join_case(&self, id: ConnectionId, case_id: Uuid) -> Result<()> {
        let actor = self.actor_of(id)?;
        self.check_rate(id).await?;
        self.inner.authority.authorize_join(&actor, case_id).await?;

        self.subscribe(id, Topic::Case(case_id));
        debug!(connection = %id, case_id = %case_id, "Joined case topic");
        Ok(())
    }

    pub async fn leave_case(&self, id: ConnectionId, case_id: Uuid) -> Result<()> {
        self.actor_of(id)?;
        self.check_rate(id).await?;

        self.unsubscribe(id, &Topic::Case(case_id));
        debug!(connection = %id, case_id = %case_id, "Left case topic");
        Ok(())
    }

    /// Drop every subscription a user holds on a case topic
    pub fn revoke_case(&self, case_id: Uuid, user_id: Uuid) -> usize {
        let topic = Topic::Case(case_id);
        let subscribers: Vec<ConnectionId> = match self.inner.topics.get(&topic) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let mut revoked = 0;
        for id in subscribers {
            let belongs = self
                .inner
                .connections
                .get(&id)
                .is_some_and(|c| c.actor.user_id == user_id);
            if belongs {
                self.unsubscribe(id, &topic);
                revoked += 1;
            }
        }
        if revoked > 0 {
            info!(case_id = %case_id, user_id = %user_id, revoked, "Case subscriptions revoked");
        }
        revoked
    }

    /// Publish to one topic; case topics deliver only to still-authorized subscribers
    pub async fn publish(
        &self,
        topic: Topic,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<usize> {
        let membership = match topic.case_id() {
            Some(case_id) => self.inner.authority.current_membership(case_id).await?,
            None => None,
        };
        if topic.case_id().is_some() && membership.is_none() {
            return Ok(0);
        }

        let event = Event::new(name, topic, payload);
        Ok(self.fan_out(vec![topic], membership, event).await)
    }

    /// Deliver a notification decided by the workflow
    pub async fn dispatch(&self, notification: Notification) -> usize {
        let targets = notification.audience.topics();
        let membership = notification.audience.membership().cloned();
        let event = Event::new(
            notification.name,
            notification.audience.primary(),
            notification.payload,
        );
        self.fan_out(targets, membership, event).await
    }

    pub(crate) async fn fan_out(
        &self,
        targets: Vec<Topic>,
        membership: Option<CaseMembership>,
        event: Event,
    ) -> usize {
        let envelope = Envelope {
            origin: self.inner.instance_id,
            targets,
            membership,
            event,
        };

        let backplane = self.inner.backplane.read().clone();
        if let Some(backplane) = backplane {
            if let Err(e) = backplane.relay(&envelope).await {
                warn!(event = %envelope.event.name, error = %e, "Backplane relay failed");
            }
        }

        let delivered = self.deliver_local(&envelope);
        debug!(
            event = %envelope.event.name,
            topic = %envelope.event.topic,
            delivered,
            "Event published"
        );
        delivered
    }

    /// Deliver an envelope relayed by another instance
    pub fn deliver_relayed(&self, envelope: &Envelope) -> usize {
        if envelope.origin == self.inner.instance_id {
            return 0;
        }
        self.deliver_local(envelope)
    }

    /// Each connection receives the event at most once, however many target
    /// topics it is subscribed to.
    fn deliver_local(&self, envelope: &Envelope) -> usize {
        let mut seen = HashSet::new();
        let mut delivered = 0;

        for topic in &envelope.targets {
            let subscribers: Vec<ConnectionId> = match self.inner.topics.get(topic) {
                Some(set) => set.iter().copied().collect(),
                None => continue,
            };

            for id in subscribers {
                if seen.contains(&id) {
                    continue;
                }
                let Some(connection) = self.inner.connections.get(&id).map(|c| Arc::clone(c.value()))
                else {
                    continue;
                };

                if let Topic::Case(case_id) = topic {
                    let admitted = envelope
                        .membership
                        .as_ref()
                        .is_some_and(|m| m.case_id == *case_id && m.admits(&connection.actor));
                    if !admitted {
                        debug!(connection = %id, case_id = %case_id, "Evicting unauthorized case subscriber");
                        self.unsubscribe(id, topic);
                        continue;
                    }
                }

                seen.insert(id);
                if connection.deliver(&envelope.event) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn subscribe(&self, id: ConnectionId, topic: Topic) {
        let Some(connection) = self.inner.connections.get(&id).map(|c| Arc::clone(c.value())) else {
            return;
        };
        self.inner.topics.entry(topic).or_default().insert(id);
        connection.topics.lock().insert(topic);

        // lost a race with disconnect
        if !self.inner.connections.contains_key(&id) {
            self.remove_from_topic(id, &topic);
        }
    }

    fn unsubscribe(&self, id: ConnectionId, topic: &Topic) {
        if let Some(connection) = self.inner.connections.get(&id) {
            connection.topics.lock().remove(topic);
        }
        self.remove_from_topic(id, topic);
    }

    fn remove_from_topic(&self, id: ConnectionId, topic: &Topic) {
        if let Some(mut set) = self.inner.topics.get_mut(topic) {
            set.remove(&id);
        }
        self.inner.topics.remove_if(topic, |_, set| set.is_empty());
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner.topics.get(topic).map_or(0, |set| set.len())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::testing::StaticMembership;
    use crate::event::{names, Audience};
    use crate::rate_limiter::{InMemoryWindowStore, RateLimiterConfig};
    use auth_identity::Role;
    use serde_json::json;
    use std::time::Duration;

    fn bus_with(lookup: Arc<StaticMembership>, max_events: u32) -> EventBus {
        let limiter = RateLimiter::new(
            RateLimiterConfig {
                max_events,
                window: Duration::from_secs(10),
                enabled: true,
            },
            Arc::new(InMemoryWindowStore::new()),
        );
        EventBus::new(SubscriptionAuthority::new(lookup), limiter)
    }

    fn case_with_nurse() -> CaseMembership {
        CaseMembership {
            case_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            nurse_id: Some(Uuid::new_v4()),
            doctor_id: None,
        }
    }

    #[tokio::test]
    async fn test_connect_subscribes_user_and_role_topics() {
        let bus = bus_with(Arc::new(StaticMembership::default()), 20);
        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let (_id, mut rx) = bus.connect(doctor);

        assert_eq!(bus.subscriber_count(&Topic::User(doctor.user_id)), 1);
        assert_eq!(bus.subscriber_count(&Topic::Role(Role::Doctor)), 1);

        let delivered = bus
            .publish(Topic::Role(Role::Doctor), names::CASE_REVIEW_REQUESTED, json!({}))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap().name, names::CASE_REVIEW_REQUESTED);
    }

    #[tokio::test]
    async fn test_join_requires_membership() {
        let lookup = Arc::new(StaticMembership::default());
        let case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup, 20);

        let (patient, _rx1) = bus.connect(Actor::new(case.patient_id, Role::Patient));
        let (stranger, _rx2) = bus.connect(Actor::new(Uuid::new_v4(), Role::Patient));
        let (admin, _rx3) = bus.connect(Actor::new(Uuid::new_v4(), Role::Admin));

        assert!(bus.join_case(patient, case.case_id).await.is_ok());
        assert!(bus.join_case(admin, case.case_id).await.is_ok());
        let err = bus.join_case(stranger, case.case_id).await.unwrap_err();
        assert!(matches!(err, BusError::NotAParticipant { .. }));
        assert_eq!(bus.subscriber_count(&Topic::Case(case.case_id)), 2);
    }

    #[tokio::test]
    async fn test_reassigned_nurse_is_cut_off() {
        let lookup = Arc::new(StaticMembership::default());
        let mut case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup.clone(), 20);

        let former = case.nurse_id.unwrap();
        let (conn, mut rx) = bus.connect(Actor::new(former, Role::Nurse));
        bus.join_case(conn, case.case_id).await.unwrap();

        case.nurse_id = Some(Uuid::new_v4());
        lookup.put(case.clone());

        // stale subscription is evicted on the next publish
        let delivered = bus
            .publish(Topic::Case(case.case_id), names::CASE_STATUS_CHANGED, json!({}))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(&Topic::Case(case.case_id)), 0);

        assert!(bus.join_case(conn, case.case_id).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_case_drops_only_that_user() {
        let lookup = Arc::new(StaticMembership::default());
        let case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup, 20);

        let (nurse_conn, _rx1) = bus.connect(Actor::new(case.nurse_id.unwrap(), Role::Nurse));
        let (patient_conn, _rx2) = bus.connect(Actor::new(case.patient_id, Role::Patient));
        bus.join_case(nurse_conn, case.case_id).await.unwrap();
        bus.join_case(patient_conn, case.case_id).await.unwrap();

        assert_eq!(bus.revoke_case(case.case_id, case.nurse_id.unwrap()), 1);
        assert_eq!(bus.subscriber_count(&Topic::Case(case.case_id)), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_connection() {
        let lookup = Arc::new(StaticMembership::default());
        let case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup, 3);

        let patient = Actor::new(case.patient_id, Role::Patient);
        let (first, _rx1) = bus.connect(patient);
        let (second, _rx2) = bus.connect(patient);

        for _ in 0..3 {
            bus.join_case(first, case.case_id).await.unwrap();
        }
        let err = bus.join_case(first, case.case_id).await.unwrap_err();
        assert_eq!(err.code(), "rate_limited");

        // connection stays registered and the other one is unaffected
        assert!(bus.actor_of(first).is_ok());
        assert!(bus.join_case(second, case.case_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_case_notification_is_delivered_once_per_connection() {
        let lookup = Arc::new(StaticMembership::default());
        let case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup, 20);

        let (patient_conn, mut patient_rx) = bus.connect(Actor::new(case.patient_id, Role::Patient));
        bus.join_case(patient_conn, case.case_id).await.unwrap();
        let (_nurse_conn, mut nurse_rx) = bus.connect(Actor::new(case.nurse_id.unwrap(), Role::Nurse));
        let (_admin_conn, mut admin_rx) = bus.connect(Actor::new(Uuid::new_v4(), Role::Admin));
        let (_other_conn, mut other_rx) = bus.connect(Actor::new(Uuid::new_v4(), Role::Nurse));

        let delivered = bus
            .dispatch(Notification::new(
                names::CASE_STATUS_CHANGED,
                Audience::case(case.clone()),
                json!({ "status": "nurse_on_the_way" }),
            ))
            .await;
        assert_eq!(delivered, 3);

        let event = patient_rx.recv().await.unwrap();
        assert_eq!(event.topic, Topic::Case(case.case_id));
        assert!(patient_rx.try_recv().is_err());
        assert_eq!(nurse_rx.recv().await.unwrap().payload, event.payload);
        assert!(admin_rx.recv().await.is_some());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_removes_all_subscriptions() {
        let lookup = Arc::new(StaticMembership::default());
        let case = case_with_nurse();
        lookup.put(case.clone());
        let bus = bus_with(lookup, 20);

        let patient = Actor::new(case.patient_id, Role::Patient);
        let (conn, mut rx) = bus.connect(patient);
        bus.join_case(conn, case.case_id).await.unwrap();

        bus.disconnect(conn).await;
        assert_eq!(bus.connection_count(), 0);
        assert_eq!(bus.subscriber_count(&Topic::Case(case.case_id)), 0);
        assert_eq!(bus.subscriber_count(&Topic::User(patient.user_id)), 0);
        assert_eq!(bus.subscriber_count(&Topic::Role(Role::Patient)), 0);

        let delivered = bus
            .publish(Topic::User(patient.user_id), names::CASE_STATUS_CHANGED, json!({}))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        // sender dropped, channel closed
        assert!(rx.recv().await.is_none());
        assert!(matches!(bus.join_case(conn, case.case_id).await, Err(BusError::UnknownConnection(_))));
    }

    #[tokio::test]
    async fn test_relayed_envelopes_from_self_are_ignored() {
        let bus = bus_with(Arc::new(StaticMembership::default()), 20);
        let user = Uuid::new_v4();
        let (_conn, mut rx) = bus.connect(Actor::new(user, Role::Patient));

        let envelope = Envelope {
            origin: bus.instance_id(),
            targets: vec![Topic::User(user)],
            membership: None,
            event: Event::new("case.created", Topic::User(user), json!({})),
        };
        assert_eq!(bus.deliver_relayed(&envelope), 0);

        let remote = Envelope {
            origin: Uuid::new_v4(),
            ..envelope
        };
        assert_eq!(bus.deliver_relayed(&remote), 1);
        assert_eq!(rx.recv().await.unwrap().name, "case.created");
    }
}
