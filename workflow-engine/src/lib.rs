//! Care workflow orchestration for HomeCare Engine
//!
//! This crate holds the pure core of a home-care visit:
//! - **Transition tables** for a case and for a lab order, with the roles
//!   permitted on every edge and the domain guards (`lab_pending`, the sample
//!   collection checklist)
//! - **Flow Rule Registry**: per service type required fields, image minimums,
//!   emergency flag and the auto-close predicate that lets a visit skip doctor review
//! - **Validation Engine**: every violation of a nurse's submission, not just the first
//! - **Decide phase** of the case lifecycle: each operation returns the change
//!   set to commit, its audit records and the notifications to send afterwards
//!
//! Nothing here touches storage or the network; persistence lives in
//! `database-layer` and delivery in `events-bus`.
//!
//! # Example
//!
//! ```rust
//! use auth_identity::Role;
//! use workflow_engine::{attempt_transition, CaseStatus, FlowRuleRegistry, GuardContext};
//! use serde_json::json;
//!
//! // only a nurse may set off to the patient
//! let ok = attempt_transition(
//!     CaseStatus::NurseAssigned,
//!     CaseStatus::NurseOnTheWay,
//!     Role::Nurse,
//!     &GuardContext::default(),
//! );
//! assert!(ok.is_ok());
//!
//! let registry = FlowRuleRegistry::standard();
//! let captured = json!({ "reactionStatus": "none" });
//! assert!(registry.can_auto_close("injection", captured.as_object().unwrap()));
//! ```

pub mod case_state;
pub mod changes;
pub mod checklist;
pub mod error;
pub mod flow_rules;
pub mod lab_orders;
pub mod lab_state;
pub mod lifecycle;
pub mod models;
pub mod service_type;
pub mod state_machine;
pub mod validation;

pub use case_state::*;
pub use changes::*;
pub use checklist::*;
pub use error::*;
pub use flow_rules::*;
pub use lab_orders::*;
pub use lab_state::*;
pub use lifecycle::*;
pub use models::*;
pub use service_type::*;
pub use state_machine::*;
pub use validation::*;
