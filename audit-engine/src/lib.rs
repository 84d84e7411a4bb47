//! Append-only audit trail for HomeCare Engine
//!
//! Every state-changing operation in the care workflow writes exactly one
//! audit record per applied transition, inside the same atomic unit as the
//! entity write. Records are never updated or deleted.
//!
//! - `NewAuditEntry`: what the workflow decides to record
//! - `AuditEntry`: a committed record, with the store-assigned, monotonically
//!   increasing `sequence`
//! - `AuditQuery`: the two supported lookups, by entity and by actor
//!
//! # Example
//!
//! ```rust
//! use audit_engine::{AuditAction, EntityType, NewAuditEntry};
//! use auth_identity::{Actor, Role};
//! use uuid::Uuid;
//!
//! let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);
//! let case_id = Uuid::new_v4();
//! let draft = NewAuditEntry::new(nurse, AuditAction::CaseTransitioned, EntityType::Case, case_id)
//!     .with_states("nurse_assigned", "nurse_on_the_way");
//!
//! let entry = draft.commit(1);
//! assert_eq!(entry.sequence, 1);
//! assert_eq!(entry.to_state.as_deref(), Some("nurse_on_the_way"));
//! ```

pub mod entry;
pub mod error;
pub mod search;

pub use entry::*;
pub use error::*;
pub use search::*;
