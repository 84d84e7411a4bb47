//! Real-time event distribution for HomeCare Engine
//!
//! This crate announces care workflow state changes to exactly the right
//! connections:
//! - Three topic kinds: per-user (`user:<id>`), per-role (`role:<role>`) and
//!   per-case (`case:<id>`)
//! - Every connection is subscribed to its own user and role topic on connect;
//!   case topics need an explicit, authorized join
//! - Case-topic joins and deliveries are checked against live case membership
//!   through the `SubscriptionAuthority`
//! - Join/leave and signaling requests are rate limited per connection
//! - Point-to-point call signaling goes straight to a user topic
//! - An optional Redis backplane relays publishes between server instances
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use auth_identity::{Actor, Role};
//! use events_bus::{
//!     EventBus, InMemoryWindowStore, MembershipLookup, RateLimiter, RateLimiterConfig,
//!     SubscriptionAuthority, Topic,
//! };
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! async fn run(lookup: Arc<dyn MembershipLookup>) -> Result<(), Box<dyn std::error::Error>> {
//!     let limiter = RateLimiter::new(RateLimiterConfig::default(), Arc::new(InMemoryWindowStore::new()));
//!     let bus = EventBus::new(SubscriptionAuthority::new(lookup), limiter);
//!
//!     let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
//!     let (_connection, mut events) = bus.connect(doctor);
//!
//!     bus.publish(Topic::Role(Role::Doctor), "case.review_requested", json!({ "caseId": Uuid::new_v4() }))
//!         .await?;
//!
//!     if let Some(event) = events.recv().await {
//!         println!("received {}", event.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod backplane;
pub mod bus;
pub mod error;
pub mod event;
pub mod rate_limiter;
pub mod signaling;
pub mod topic;

pub use authority::*;
pub use backplane::*;
pub use bus::*;
pub use error::*;
pub use event::*;
pub use rate_limiter::*;
pub use signaling::*;
pub use topic::*;
