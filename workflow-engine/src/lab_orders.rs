// Lab order decisions
use audit_engine::{AuditAction, EntityType, NewAuditEntry};
use auth_identity::{Actor, Role};
use chrono::{DateTime, Utc};
use events_bus::{names, Audience, Notification};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::changes::{ChangeSet, Decision, LabOrderWrite, LabReportWrite};
use crate::checklist::SampleCollectionChecklist;
use crate::error::{Result, WorkflowError};
use crate::lab_state::LabOrderStatus;
use crate::models::{Case, LabOrder, LabReport};
use crate::state_machine::{attempt_transition, GuardContext};

/// One step of a lab order's lifecycle
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum LabOperation {
    Confirm,
    Decline {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ScheduleCollection {
        collector_id: Uuid,
        scheduled_at: DateTime<Utc>,
    },
    RecordCollection {
        checklist: SampleCollectionChecklist,
    },
    SendToLab,
    #[serde(rename_all = "camelCase")]
    UploadReport {
        artifact_ref: String,
    },
    BeginReview,
    CloseReview {
        notes: String,
    },
}

impl LabOperation {
    pub fn target(&self) -> LabOrderStatus {
        match self {
            LabOperation::Confirm => LabOrderStatus::PendingSampleCollection,
            LabOperation::Decline { .. } | LabOperation::CloseReview { .. } => LabOrderStatus::LabClosed,
            LabOperation::ScheduleCollection { .. } => LabOrderStatus::SampleCollectionScheduled,
            LabOperation::RecordCollection { .. } => LabOrderStatus::SampleCollected,
            LabOperation::SendToLab => LabOrderStatus::SentToLab,
            LabOperation::UploadReport { .. } => LabOrderStatus::ReportReady,
            LabOperation::BeginReview => LabOrderStatus::DoctorReviewPending,
        }
    }

    fn audit_action(&self) -> AuditAction {
        match self {
            LabOperation::UploadReport { .. } => AuditAction::LabReportUploaded,
            LabOperation::CloseReview { .. } => AuditAction::LabReportReviewed,
            _ => AuditAction::LabOrderTransitioned,
        }
    }
}

/// Who may touch a lab order: admins, its patient and doctor, the case's nurse
/// or the assigned collector; a nurse may also pick up collection for themself.
pub fn authorize_lab_access(actor: &Actor, case: &Case, order: &LabOrder, operation: &LabOperation) -> Result<()> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Patient => order.patient_id == actor.user_id,
        Role::Doctor => order.doctor_id == actor.user_id,
        Role::Nurse => {
            case.nurse_id == Some(actor.user_id)
                || order.collector_id == Some(actor.user_id)
                || matches!(
                    operation,
                    LabOperation::ScheduleCollection { collector_id, .. } if *collector_id == actor.user_id
                )
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::NotAParticipant { case_id: case.id })
    }
}

/// Read access: anyone admitted to the owning case, or the collector
pub fn can_view_lab_order(actor: &Actor, case: &Case, order: &LabOrder) -> bool {
    case.membership().admits(actor) || order.collector_id == Some(actor.user_id)
}

pub fn decide_lab_operation(
    actor: &Actor,
    case: &Case,
    order: &LabOrder,
    report: Option<&LabReport>,
    operation: LabOperation,
    now: DateTime<Utc>,
) -> Result<Decision> {
    authorize_lab_access(actor, case, order, &operation)?;

    let target = operation.target();
    let ctx = match &operation {
        LabOperation::RecordCollection { checklist } => {
            GuardContext::default().with_checklist(checklist.clone(), order.requires_fasting)
        }
        _ => GuardContext::default(),
    };
    attempt_transition(order.status, target, actor.role, &ctx)?;

    let mut updated = order.clone();
    updated.status = target;
    updated.updated_at = now;

    let mut metadata = json!({ "caseId": case.id });
    let mut report_write = None;

    match &operation {
        LabOperation::Decline { reason } => {
            metadata["reason"] = json!(reason);
        }
        LabOperation::ScheduleCollection {
            collector_id,
            scheduled_at,
        } => {
            if actor.role == Role::Nurse && *collector_id != actor.user_id {
                return Err(WorkflowError::AccessDenied(
                    "nurses may only schedule collections for themselves".to_string(),
                ));
            }
            updated.collector_id = Some(*collector_id);
            updated.scheduled_collection_at = Some(*scheduled_at);
            metadata["collectorId"] = json!(collector_id);
            metadata["scheduledAt"] = json!(scheduled_at);
        }
        LabOperation::RecordCollection { checklist } => {
            metadata["checklist"] = json!(checklist);
        }
        LabOperation::UploadReport { artifact_ref } => {
            if artifact_ref.trim().is_empty() {
                return Err(WorkflowError::InvalidInput("artifactRef is required".to_string()));
            }
            if report.is_some() {
                return Err(WorkflowError::DuplicateSubmission {
                    entity: "lab report",
                    case_id: case.id,
                });
            }
            let uploaded = LabReport {
                id: Uuid::new_v4(),
                lab_order_id: order.id,
                artifact_ref: artifact_ref.trim().to_string(),
                uploaded_by: actor.user_id,
                uploaded_at: now,
                review_notes: None,
                reviewed_by: None,
                reviewed_at: None,
            };
            metadata["labReportId"] = json!(uploaded.id);
            report_write = Some(LabReportWrite::Insert(uploaded));
        }
        LabOperation::CloseReview { notes } => {
            if notes.trim().is_empty() {
                return Err(WorkflowError::InvalidInput("review notes are required".to_string()));
            }
            let mut reviewed = report.cloned().ok_or(WorkflowError::NotFound {
                entity: "lab report",
                id: order.id,
            })?;
            reviewed.review_notes = Some(notes.trim().to_string());
            reviewed.reviewed_by = Some(actor.user_id);
            reviewed.reviewed_at = Some(now);
            metadata["labReportId"] = json!(reviewed.id);
            report_write = Some(LabReportWrite::Update(reviewed));
        }
        LabOperation::Confirm | LabOperation::SendToLab | LabOperation::BeginReview => {}
    }

    let audit = NewAuditEntry::new(*actor, operation.audit_action(), EntityType::LabOrder, order.id)
        .with_states(order.status.as_str(), target.as_str())
        .with_metadata(metadata)
        .at(now);

    let notification = Notification::new(
        names::LAB_ORDER_STATUS_CHANGED,
        Audience::Case {
            membership: case.membership(),
            also: updated.collector_id.into_iter().collect(),
        },
        json!({
            "labOrderId": order.id,
            "caseId": case.id,
            "status": target,
            "previousStatus": order.status,
            "urgency": order.urgency,
            "collectorId": updated.collector_id,
            "scheduledCollectionAt": updated.scheduled_collection_at,
        }),
    );

    Ok(Decision {
        changes: ChangeSet {
            lab_orders: vec![LabOrderWrite::Update {
                order: updated,
                expected: order.status,
            }],
            lab_report: report_write,
            audit: vec![audit],
            ..ChangeSet::default()
        },
        notifications: vec![notification],
        revocations: Vec::new(),
    })
}
