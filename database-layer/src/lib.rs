//! Care workflow persistence for HomeCare Engine
//!
//! Every workflow operation ends in exactly one call to [`CareStore::commit`],
//! which writes the entity changes and their audit records together or not at
//! all. Two backends implement the seam:
//! - [`InMemoryCareStore`]: one lock over every table; tests and single-node demos
//! - [`PostgresCareStore`]: sqlx transactions with optimistic status checks
//!
//! # Example
//!
//! ```rust
//! use database_layer::{CareStore, InMemoryCareStore};
//! use uuid::Uuid;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryCareStore::new();
//! assert!(store.get_case(Uuid::new_v4()).await.unwrap().is_none());
//! assert!(store.is_healthy().await);
//! # });
//! ```

pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::*;
pub use error::*;
pub use memory::*;
pub use postgres::*;
pub use store::*;
