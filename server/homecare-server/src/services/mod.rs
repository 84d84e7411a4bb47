//! Apply phase of the care workflow
//!
//! Services load current entities from the `CareStore`, ask `workflow-engine`
//! for a decision, commit its change set in one transaction and only then
//! hand the decided notifications to the event bus.

pub mod audit_log;
pub mod case_lifecycle;
pub mod lab_orders;
pub mod membership;

pub use audit_log::AuditLogService;
pub use case_lifecycle::{CaseLifecycleService, DoctorActionOutcome};
pub use lab_orders::LabOrderService;
pub use membership::StoreMembership;

use audit_engine::AuditEntry;
use database_layer::{CareStore, DatabaseError};
use events_bus::EventBus;
use tracing::debug;
use workflow_engine::{Decision, WorkflowError};

use crate::error::ApiError;

/// Commit, then revoke, then notify
///
/// A lost optimistic race is reported as `invalid_transition` from the status
/// the entity holds now.
pub(crate) async fn commit_decision(
    store: &dyn CareStore,
    bus: &EventBus,
    decision: Decision,
) -> Result<Vec<AuditEntry>, ApiError> {
    let Decision {
        changes,
        notifications,
        revocations,
    } = decision;

    let case_target = changes.case.as_ref().map(|write| write.case().status.to_string());
    let lab_target = changes.lab_orders.first().map(|write| write.order().status.to_string());

    let committed = store.commit(changes).await.map_err(|err| match err {
        DatabaseError::Conflict { entity, actual, .. } => {
            let to = if entity == "lab_order" { lab_target } else { case_target };
            ApiError::from(WorkflowError::InvalidTransition {
                from: actual,
                to: to.unwrap_or_default(),
            })
        }
        other => ApiError::from(other),
    })?;

    for revocation in revocations {
        let removed = bus.revoke_case(revocation.case_id, revocation.user_id);
        debug!(
            case_id = %revocation.case_id,
            user_id = %revocation.user_id,
            removed,
            "Case subscriptions revoked"
        );
    }

    for notification in notifications {
        bus.dispatch(notification).await;
    }

    Ok(committed)
}
