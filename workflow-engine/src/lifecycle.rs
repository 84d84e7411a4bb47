//! Case Lifecycle Service: decide phase
//!
//! Every operation takes the currently stored entities plus the request and
//! returns a `Decision`: the change set to commit atomically, the audit
//! records that go with it, and the notifications to dispatch once the commit
//! succeeded. Nothing here performs I/O, so a rejected request leaves no
//! trace and no event is ever emitted for a change that did not commit.

use audit_engine::{AuditAction, EntityType, NewAuditEntry};
use auth_identity::{Actor, Role};
use chrono::{DateTime, NaiveDate, Utc};
use events_bus::{names, Audience, Notification};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::case_state::CaseStatus;
use crate::changes::{CaseWrite, ChangeSet, Decision, LabOrderWrite, Revocation};
use crate::error::{Result, WorkflowError};
use crate::flow_rules::FlowRuleSet;
use crate::lab_state::LabOrderStatus;
use crate::models::{Attachment, Case, ClinicalReport, DoctorAction, LabOrder, TriageSeverity, Urgency};
use crate::service_type::ServiceType;
use crate::state_machine::{attempt_transition, GuardContext};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCaseRequest {
    pub service_type: String,
    #[serde(default = "default_immediate")]
    pub is_immediate: bool,
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Required when an admin books on a patient's behalf
    pub patient_id: Option<Uuid>,
}

fn default_immediate() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalSubmission {
    #[serde(default)]
    pub vitals: Map<String, Value>,
    pub triage_severity: TriageSeverity,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorActionRequest {
    pub diagnosis: String,
    pub notes: Option<String>,
    pub referral: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub lab_tests: Vec<String>,
    #[serde(default)]
    pub lab_urgency: Urgency,
    #[serde(default)]
    pub requires_fasting: bool,
}

/// Participation check for case reads and participant actions
///
/// Delegates to `CaseMembership::admits`,
/// the same predicate the real-time join uses.
pub fn authorize_case_access(actor: &Actor, case: &Case) -> Result<()> {
    if case.membership().admits(actor) {
        Ok(())
    } else {
        Err(WorkflowError::NotAParticipant { case_id: case.id })
    }
}

/// Access for the two claim operations
///
/// A pending case nobody accepted yet is open to any nurse; a case awaiting
/// its first doctor is open to any doctor.
fn authorize_case_claim(actor: &Actor, case: &Case) -> Result<()> {
    let open_to_actor = match actor.role {
        Role::Nurse => case.nurse_id.is_none() && case.status == CaseStatus::PendingNurseAssignment,
        Role::Doctor => case.doctor_id.is_none() && case.status == CaseStatus::AwaitingDoctorReview,
        Role::Patient | Role::Admin => false,
    };

    if open_to_actor {
        Ok(())
    } else {
        authorize_case_access(actor, case)
    }
}

pub(crate) fn case_payload(case: &Case, previous: Option<CaseStatus>) -> Value {
    json!({
        "caseId": case.id,
        "serviceType": case.service_type,
        "status": case.status,
        "previousStatus": previous,
        "patientId": case.patient_id,
        "nurseId": case.nurse_id,
        "doctorId": case.doctor_id,
    })
}

fn transition_audit(
    actor: &Actor,
    action: AuditAction,
    case: &Case,
    from: CaseStatus,
    to: CaseStatus,
    now: DateTime<Utc>,
) -> NewAuditEntry {
    NewAuditEntry::new(*actor, action, EntityType::Case, case.id)
        .with_states(from.as_str(), to.as_str())
        .at(now)
}

fn status_changed(case: &Case, previous: CaseStatus) -> Notification {
    Notification::new(
        names::CASE_STATUS_CHANGED,
        Audience::case(case.membership()),
        case_payload(case, Some(previous)),
    )
}

pub fn decide_create_case(actor: &Actor, request: &NewCaseRequest, now: DateTime<Utc>) -> Result<Decision> {
    let service_type: ServiceType = request.service_type.parse()?;

    let patient_id = match actor.role {
        Role::Patient => match request.patient_id {
            Some(other) if other != actor.user_id => {
                return Err(WorkflowError::AccessDenied(
                    "patients may only request care for themselves".to_string(),
                ))
            }
            _ => actor.user_id,
        },
        Role::Admin => request.patient_id.ok_or_else(|| {
            WorkflowError::InvalidInput("patientId is required when booking for a patient".to_string())
        })?,
        Role::Nurse | Role::Doctor => {
            return Err(WorkflowError::AccessDenied(
                "only patients and admins may request care".to_string(),
            ))
        }
    };

    if !request.is_immediate && request.scheduled_time.is_none() {
        return Err(WorkflowError::InvalidInput(
            "scheduledTime is required for scheduled visits".to_string(),
        ));
    }

    let case = Case {
        id: Uuid::new_v4(),
        service_type,
        status: CaseStatus::PendingNurseAssignment,
        patient_id,
        nurse_id: None,
        doctor_id: None,
        is_immediate: request.is_immediate,
        scheduled_time: request.scheduled_time,
        created_at: now,
        updated_at: now,
    };

    let audit = NewAuditEntry::new(*actor, AuditAction::CaseCreated, EntityType::Case, case.id)
        .with_metadata(json!({ "serviceType": service_type, "isImmediate": case.is_immediate }))
        .at(now);
    let audit = NewAuditEntry {
        to_state: Some(case.status.as_str().to_string()),
        ..audit
    };

    let notifications = vec![
        Notification::new(
            names::CASE_CREATED,
            Audience::case(case.membership()),
            case_payload(&case, None),
        ),
        Notification::new(
            names::CASE_OPEN_FOR_ASSIGNMENT,
            Audience::role(Role::Nurse),
            json!({
                "caseId": case.id,
                "serviceType": service_type,
                "isImmediate": case.is_immediate,
                "scheduledTime": case.scheduled_time,
            }),
        ),
    ];

    debug!(case_id = %case.id, service_type = %service_type, "Case creation decided");
    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Insert(case)),
            audit: vec![audit],
            ..ChangeSet::default()
        },
        notifications,
        revocations: Vec::new(),
    })
}

pub fn decide_assign_nurse(actor: &Actor, case: &Case, nurse_id: Uuid, now: DateTime<Utc>) -> Result<Decision> {
    authorize_case_claim(actor, case)?;
    attempt_transition(case.status, CaseStatus::NurseAssigned, actor.role, &GuardContext::default())?;

    if actor.role == Role::Nurse && nurse_id != actor.user_id {
        return Err(WorkflowError::AccessDenied(
            "nurses may only accept cases for themselves".to_string(),
        ));
    }

    let mut updated = case.clone();
    updated.nurse_id = Some(nurse_id);
    updated.status = CaseStatus::NurseAssigned;
    updated.updated_at = now;

    let audit = transition_audit(actor, AuditAction::NurseAssigned, &updated, case.status, updated.status, now)
        .with_metadata(json!({ "nurseId": nurse_id }));
    let notification = Notification::new(
        names::CASE_NURSE_ASSIGNED,
        Audience::case(updated.membership()),
        case_payload(&updated, Some(case.status)),
    );

    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Update {
                case: updated,
                expected: case.status,
            }),
            audit: vec![audit],
            ..ChangeSet::default()
        },
        notifications: vec![notification],
        revocations: Vec::new(),
    })
}

/// Swap the assigned nurse; the former nurse loses case membership
pub fn decide_reassign_nurse(actor: &Actor, case: &Case, nurse_id: Uuid, now: DateTime<Utc>) -> Result<Decision> {
    if actor.role != Role::Admin {
        return Err(WorkflowError::AccessDenied("only admins may reassign nurses".to_string()));
    }
    if !matches!(case.status, CaseStatus::NurseAssigned | CaseStatus::NurseOnTheWay) {
        return Err(WorkflowError::InvalidTransition {
            from: case.status.to_string(),
            to: "nurse_reassigned".to_string(),
        });
    }
    if case.nurse_id == Some(nurse_id) {
        return Err(WorkflowError::InvalidInput(
            "nurse is already assigned to this case".to_string(),
        ));
    }

    let former = case.nurse_id;
    let mut updated = case.clone();
    updated.nurse_id = Some(nurse_id);
    updated.updated_at = now;

    let audit = NewAuditEntry::new(*actor, AuditAction::NurseReassigned, EntityType::Case, case.id)
        .with_metadata(json!({ "fromNurseId": former, "toNurseId": nurse_id }))
        .at(now);

    let notification = Notification::new(
        names::CASE_NURSE_REASSIGNED,
        Audience::Case {
            membership: updated.membership(),
            also: former.into_iter().collect(),
        },
        json!({
            "caseId": case.id,
            "status": case.status,
            "fromNurseId": former,
            "toNurseId": nurse_id,
        }),
    );

    let revocations = former
        .map(|user_id| Revocation {
            case_id: case.id,
            user_id,
        })
        .into_iter()
        .collect();

    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Update {
                case: updated,
                expected: case.status,
            }),
            audit: vec![audit],
            ..ChangeSet::default()
        },
        notifications: vec![notification],
        revocations,
    })
}

/// Generic edge: on-the-way, review hand-off, completion, cancellation
pub fn decide_transition(
    actor: &Actor,
    case: &Case,
    target: CaseStatus,
    open_lab_orders: usize,
    now: DateTime<Utc>,
) -> Result<Decision> {
    authorize_case_access(actor, case)?;
    let ctx = GuardContext::default().with_open_lab_orders(open_lab_orders);
    attempt_transition(case.status, target, actor.role, &ctx)?;

    let dedicated = match target {
        CaseStatus::NurseAssigned => Some("assign a nurse"),
        CaseStatus::VitalsRecorded => Some("submit the clinical report"),
        CaseStatus::DoctorCompleted => Some("record a doctor action"),
        _ => None,
    };
    if let Some(operation) = dedicated {
        return Err(WorkflowError::InvalidInput(format!(
            "{target} is reached through its own operation: {operation}"
        )));
    }

    let mut updated = case.clone();
    updated.status = target;
    updated.updated_at = now;

    let audit = transition_audit(actor, AuditAction::CaseTransitioned, &updated, case.status, target, now);
    let notification = status_changed(&updated, case.status);

    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Update {
                case: updated,
                expected: case.status,
            }),
            audit: vec![audit],
            ..ChangeSet::default()
        },
        notifications: vec![notification],
        revocations: Vec::new(),
    })
}

/// Nurse's triage submission
///
/// Applies `nurse_on_the_way -> vitals_recorded -> awaiting_doctor_review`
/// and, when the service type's auto-close predicate holds,
/// `-> doctor_completed` without a doctor action. One audit record per
/// applied transition.
pub fn decide_clinical_report(
    actor: &Actor,
    case: &Case,
    report_exists: bool,
    submission: &ClinicalSubmission,
    rules: &FlowRuleSet,
    now: DateTime<Utc>,
) -> Result<Decision> {
    authorize_case_access(actor, case)?;
    if actor.role == Role::Nurse && case.nurse_id != Some(actor.user_id) {
        return Err(WorkflowError::NotAParticipant { case_id: case.id });
    }
    if report_exists {
        return Err(WorkflowError::DuplicateSubmission {
            entity: "clinical report",
            case_id: case.id,
        });
    }

    let ctx = GuardContext::default();
    attempt_transition(case.status, CaseStatus::VitalsRecorded, actor.role, &ctx)?;

    let violations = rules.validate(&submission.vitals, &submission.attachments);
    if !violations.is_empty() {
        return Err(WorkflowError::ValidationFailed(violations));
    }

    attempt_transition(CaseStatus::VitalsRecorded, CaseStatus::AwaitingDoctorReview, actor.role, &ctx)?;
    let auto_close = rules.can_auto_close(&submission.vitals);
    if auto_close {
        attempt_transition(
            CaseStatus::AwaitingDoctorReview,
            CaseStatus::DoctorCompleted,
            actor.role,
            &ctx.clone().auto_close(),
        )?;
    }

    let report = ClinicalReport {
        id: Uuid::new_v4(),
        case_id: case.id,
        nurse_id: actor.user_id,
        vitals: submission.vitals.clone(),
        triage_severity: submission.triage_severity,
        attachments: submission.attachments.clone(),
        created_at: now,
    };

    let mut updated = case.clone();
    updated.status = if auto_close {
        CaseStatus::DoctorCompleted
    } else {
        CaseStatus::AwaitingDoctorReview
    };
    updated.updated_at = now;

    let mut audit = vec![
        transition_audit(
            actor,
            AuditAction::ClinicalReportSubmitted,
            &updated,
            case.status,
            CaseStatus::VitalsRecorded,
            now,
        )
        .with_metadata(json!({
            "clinicalReportId": report.id,
            "triageSeverity": report.triage_severity,
            "attachments": report.attachments.len(),
        })),
        transition_audit(
            actor,
            AuditAction::CaseTransitioned,
            &updated,
            CaseStatus::VitalsRecorded,
            CaseStatus::AwaitingDoctorReview,
            now,
        ),
    ];
    if auto_close {
        audit.push(
            transition_audit(
                actor,
                AuditAction::CaseAutoAdvanced,
                &updated,
                CaseStatus::AwaitingDoctorReview,
                CaseStatus::DoctorCompleted,
                now,
            )
            .with_metadata(json!({ "reason": "auto_close" })),
        );
    }

    let mut notifications = Vec::new();
    if rules.is_emergency || report.triage_severity == TriageSeverity::Critical {
        notifications.push(Notification::new(
            names::CASE_EMERGENCY_ALERT,
            Audience::role(Role::Doctor),
            json!({
                "caseId": case.id,
                "serviceType": case.service_type,
                "triageSeverity": report.triage_severity,
                "patientId": case.patient_id,
                "nurseId": actor.user_id,
                "priority": "high",
            }),
        ));
    }

    let mut payload = case_payload(&updated, Some(case.status));
    if let Some(fields) = payload.as_object_mut() {
        fields.insert("autoClosed".to_string(), json!(auto_close));
        fields.insert("triageSeverity".to_string(), json!(report.triage_severity));
    }
    notifications.push(Notification::new(
        names::CASE_STATUS_CHANGED,
        Audience::case(updated.membership()),
        payload,
    ));

    if !auto_close {
        notifications.push(Notification::new(
            names::CASE_REVIEW_REQUESTED,
            Audience::role(Role::Doctor),
            json!({
                "caseId": case.id,
                "serviceType": case.service_type,
                "triageSeverity": report.triage_severity,
            }),
        ));
    }

    debug!(case_id = %case.id, auto_close, status = %updated.status, "Clinical report decided");
    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Update {
                case: updated,
                expected: case.status,
            }),
            clinical_report: Some(report),
            audit,
            ..ChangeSet::default()
        },
        notifications,
        revocations: Vec::new(),
    })
}

/// Doctor's review; optionally orders labs
pub fn decide_doctor_action(
    actor: &Actor,
    case: &Case,
    report_exists: bool,
    action_exists: bool,
    request: &DoctorActionRequest,
    now: DateTime<Utc>,
) -> Result<Decision> {
    authorize_case_claim(actor, case)?;
    if action_exists {
        return Err(WorkflowError::DuplicateSubmission {
            entity: "doctor action",
            case_id: case.id,
        });
    }
    if !report_exists {
        return Err(WorkflowError::DomainGuardFailed {
            reason: "clinical_report_missing",
            message: "a doctor action needs the nurse's clinical report first".to_string(),
        });
    }
    attempt_transition(case.status, CaseStatus::DoctorCompleted, actor.role, &GuardContext::default())?;

    let diagnosis = request.diagnosis.trim();
    if diagnosis.is_empty() {
        return Err(WorkflowError::InvalidInput("diagnosis is required".to_string()));
    }

    let tests: Vec<String> = request
        .lab_tests
        .iter()
        .map(|test| test.trim())
        .filter(|test| !test.is_empty())
        .map(str::to_string)
        .collect();

    let action = DoctorAction {
        id: Uuid::new_v4(),
        case_id: case.id,
        doctor_id: actor.user_id,
        diagnosis: diagnosis.to_string(),
        notes: request.notes.clone(),
        referral: request.referral.clone(),
        lab_tests: tests.clone(),
        follow_up_date: request.follow_up_date,
        created_at: now,
    };

    let mut updated = case.clone();
    updated.doctor_id = Some(actor.user_id);
    updated.status = CaseStatus::DoctorCompleted;
    updated.updated_at = now;

    let mut audit = vec![transition_audit(
        actor,
        AuditAction::DoctorActionRecorded,
        &updated,
        case.status,
        CaseStatus::DoctorCompleted,
        now,
    )
    .with_metadata(json!({
        "doctorActionId": action.id,
        "labTests": tests.len(),
        "referral": action.referral.is_some(),
    }))];

    let mut notifications = vec![status_changed(&updated, case.status)];
    let mut lab_orders = Vec::new();

    if !tests.is_empty() {
        let order = LabOrder {
            id: Uuid::new_v4(),
            case_id: case.id,
            patient_id: case.patient_id,
            doctor_id: actor.user_id,
            tests,
            urgency: request.lab_urgency,
            requires_fasting: request.requires_fasting,
            collector_id: None,
            scheduled_collection_at: None,
            status: LabOrderStatus::PendingPatientConfirmation,
            created_at: now,
            updated_at: now,
        };

        let created = NewAuditEntry::new(*actor, AuditAction::LabOrderCreated, EntityType::LabOrder, order.id)
            .with_metadata(json!({ "caseId": case.id, "tests": order.tests, "urgency": order.urgency }))
            .at(now);
        audit.push(NewAuditEntry {
            to_state: Some(order.status.as_str().to_string()),
            ..created
        });

        notifications.push(Notification::new(
            names::LAB_ORDER_CREATED,
            Audience::case(updated.membership()),
            json!({
                "labOrderId": order.id,
                "caseId": case.id,
                "status": order.status,
                "tests": order.tests,
                "urgency": order.urgency,
                "requiresFasting": order.requires_fasting,
            }),
        ));
        lab_orders.push(LabOrderWrite::Insert(order));
    }

    Ok(Decision {
        changes: ChangeSet {
            case: Some(CaseWrite::Update {
                case: updated,
                expected: case.status,
            }),
            doctor_action: Some(action),
            lab_orders,
            audit,
            ..ChangeSet::default()
        },
        notifications,
        revocations: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_rules::FlowRuleRegistry;
    use crate::state_machine::StateMachine;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    fn case(service_type: ServiceType, status: CaseStatus, patient: &Actor, nurse: Option<&Actor>) -> Case {
        let now = Utc::now();
        Case {
            id: Uuid::new_v4(),
            service_type,
            status,
            patient_id: patient.user_id,
            nurse_id: nurse.map(|n| n.user_id),
            doctor_id: None,
            is_immediate: true,
            scheduled_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn injection(reaction: &str) -> ClinicalSubmission {
        ClinicalSubmission {
            vitals: json!({
                "medicationName": "Enoxaparin",
                "dose": "40 mg",
                "route": "subcutaneous",
                "injectionSite": "abdomen",
                "prescriptionVerified": true,
                "reactionStatus": reaction,
                "administeredAt": "2026-03-01T09:30:00Z"
            })
            .as_object()
            .cloned()
            .unwrap(),
            triage_severity: TriageSeverity::Low,
            attachments: vec![Attachment::for_field("rx/123.jpg", "prescriptionPhoto")],
        }
    }

    fn rules(service_type: ServiceType) -> FlowRuleSet {
        FlowRuleRegistry::standard().get(service_type).cloned().unwrap()
    }

    #[test]
    fn test_create_case_by_patient() {
        let patient = actor(Role::Patient);
        let request = NewCaseRequest {
            service_type: "wound_dressing".into(),
            is_immediate: true,
            scheduled_time: None,
            patient_id: None,
        };
        let decision = decide_create_case(&patient, &request, Utc::now()).unwrap();
        let case = decision.case().unwrap();
        assert_eq!(case.status, CaseStatus::PendingNurseAssignment);
        assert_eq!(case.patient_id, patient.user_id);
        assert!(case.nurse_id.is_none());
        assert_eq!(decision.changes.audit.len(), 1);
        assert_eq!(decision.notifications.len(), 2);
    }

    #[test]
    fn test_create_case_rejects_unknown_service_and_missing_schedule() {
        let patient = actor(Role::Patient);
        let unknown = NewCaseRequest {
            service_type: "massage".into(),
            is_immediate: true,
            scheduled_time: None,
            patient_id: None,
        };
        assert_eq!(
            decide_create_case(&patient, &unknown, Utc::now()).unwrap_err().code(),
            "unknown_service_type"
        );

        let scheduled = NewCaseRequest {
            service_type: "injection".into(),
            is_immediate: false,
            scheduled_time: None,
            patient_id: None,
        };
        assert_eq!(
            decide_create_case(&patient, &scheduled, Utc::now()).unwrap_err().code(),
            "invalid_input"
        );
    }

    #[test]
    fn test_nurse_self_assigns_pending_case() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let pending = case(ServiceType::Injection, CaseStatus::PendingNurseAssignment, &patient, None);

        let decision = decide_assign_nurse(&nurse, &pending, nurse.user_id, Utc::now()).unwrap();
        let assigned = decision.case().unwrap();
        assert_eq!(assigned.status, CaseStatus::NurseAssigned);
        assert_eq!(assigned.nurse_id, Some(nurse.user_id));

        let other = Uuid::new_v4();
        let err = decide_assign_nurse(&nurse, &pending, other, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "access_denied");

        let err = decide_assign_nurse(&patient, &pending, nurse.user_id, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "unauthorized_role");
    }

    #[test]
    fn test_reassign_revokes_former_nurse() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let admin = actor(Role::Admin);
        let assigned = case(ServiceType::Injection, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));
        let replacement = Uuid::new_v4();

        let decision = decide_reassign_nurse(&admin, &assigned, replacement, Utc::now()).unwrap();
        assert_eq!(decision.case().unwrap().nurse_id, Some(replacement));
        assert_eq!(decision.case().unwrap().status, CaseStatus::NurseOnTheWay);
        assert_eq!(
            decision.revocations,
            vec![Revocation {
                case_id: assigned.id,
                user_id: nurse.user_id
            }]
        );
        assert_eq!(decision.changes.audit[0].action, AuditAction::NurseReassigned);

        let completed = case(ServiceType::Injection, CaseStatus::AwaitingDoctorReview, &patient, Some(&nurse));
        assert_eq!(
            decide_reassign_nurse(&admin, &completed, replacement, Utc::now()).unwrap_err().code(),
            "invalid_transition"
        );
    }

    #[test]
    fn test_injection_without_reaction_auto_closes() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let visiting = case(ServiceType::Injection, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));

        let decision = decide_clinical_report(
            &nurse,
            &visiting,
            false,
            &injection("none"),
            &rules(ServiceType::Injection),
            Utc::now(),
        )
        .unwrap();

        let closed = decision.case().unwrap();
        assert_eq!(closed.status, CaseStatus::DoctorCompleted);
        assert!(closed.doctor_id.is_none());
        assert!(decision.changes.doctor_action.is_none());

        let actions: Vec<AuditAction> = decision.changes.audit.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::ClinicalReportSubmitted,
                AuditAction::CaseTransitioned,
                AuditAction::CaseAutoAdvanced
            ]
        );
        assert!(decision.changes.audit.iter().all(|a| a.actor_id == nurse.user_id));
        assert!(!decision
            .notifications
            .iter()
            .any(|n| n.name == names::CASE_REVIEW_REQUESTED));
    }

    #[test]
    fn test_injection_with_mild_reaction_waits_for_doctor() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let visiting = case(ServiceType::Injection, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));

        let decision = decide_clinical_report(
            &nurse,
            &visiting,
            false,
            &injection("mild"),
            &rules(ServiceType::Injection),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(decision.case().unwrap().status, CaseStatus::AwaitingDoctorReview);
        assert_eq!(decision.changes.audit.len(), 2);
        let review = decision
            .notifications
            .iter()
            .find(|n| n.name == names::CASE_REVIEW_REQUESTED)
            .unwrap();
        assert_eq!(review.audience, Audience::role(Role::Doctor));
    }

    #[test]
    fn test_clinical_report_rejections() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let visiting = case(ServiceType::Injection, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));
        let rules = rules(ServiceType::Injection);

        let err = decide_clinical_report(&nurse, &visiting, true, &injection("none"), &rules, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_submission");

        let intruder = actor(Role::Nurse);
        let err = decide_clinical_report(&intruder, &visiting, false, &injection("none"), &rules, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "not_a_participant");

        let mut incomplete = injection("none");
        incomplete.attachments.clear();
        incomplete.vitals.remove("dose");
        match decide_clinical_report(&nurse, &visiting, false, &incomplete, &rules, Utc::now()).unwrap_err() {
            WorkflowError::ValidationFailed(violations) => assert_eq!(violations.len(), 3),
            other => panic!("expected validation failure, got {other:?}"),
        }

        let early = case(ServiceType::Injection, CaseStatus::NurseAssigned, &patient, Some(&nurse));
        let err = decide_clinical_report(&nurse, &early, false, &injection("none"), &rules, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn test_emergency_and_critical_triage_alert_doctors() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let emergency = case(ServiceType::EmergencyVisit, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));
        let submission = ClinicalSubmission {
            vitals: json!({
                "chiefComplaint": "Chest pain radiating to left arm",
                "consciousnessLevel": "alert",
                "bloodPressure": "150/95",
                "pulse": 118,
                "spo2": 91
            })
            .as_object()
            .cloned()
            .unwrap(),
            triage_severity: TriageSeverity::High,
            attachments: Vec::new(),
        };
        let decision = decide_clinical_report(
            &nurse,
            &emergency,
            false,
            &submission,
            &rules(ServiceType::EmergencyVisit),
            Utc::now(),
        )
        .unwrap();
        let first = decision.notifications.first().unwrap();
        assert_eq!(first.name, names::CASE_EMERGENCY_ALERT);
        assert_eq!(first.audience, Audience::role(Role::Doctor));

        let routine = case(ServiceType::Injection, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));
        let mut critical = injection("severe");
        critical.triage_severity = TriageSeverity::Critical;
        let decision =
            decide_clinical_report(&nurse, &routine, false, &critical, &rules(ServiceType::Injection), Utc::now())
                .unwrap();
        assert!(decision
            .notifications
            .iter()
            .any(|n| n.name == names::CASE_EMERGENCY_ALERT));
    }

    #[test]
    fn test_doctor_action_orders_labs() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let doctor = actor(Role::Doctor);
        let review = case(ServiceType::VitalsCheck, CaseStatus::AwaitingDoctorReview, &patient, Some(&nurse));
        let request = DoctorActionRequest {
            diagnosis: "Suspected anaemia".into(),
            notes: None,
            referral: None,
            follow_up_date: None,
            lab_tests: vec!["CBC".into(), " ".into(), "Ferritin".into()],
            lab_urgency: Urgency::Urgent,
            requires_fasting: false,
        };

        let decision = decide_doctor_action(&doctor, &review, true, false, &request, Utc::now()).unwrap();
        let updated = decision.case().unwrap();
        assert_eq!(updated.status, CaseStatus::DoctorCompleted);
        assert_eq!(updated.doctor_id, Some(doctor.user_id));

        let order = decision.lab_order().unwrap();
        assert_eq!(order.status, LabOrderStatus::PendingPatientConfirmation);
        assert_eq!(order.tests, vec!["CBC".to_string(), "Ferritin".to_string()]);
        assert_eq!(order.patient_id, patient.user_id);
        assert_eq!(decision.changes.audit.len(), 2);

        let err = decide_doctor_action(&doctor, &review, true, true, &request, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "duplicate_submission");
        let err = decide_doctor_action(&doctor, &review, false, false, &request, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "domain_guard_failed");
        let err = decide_doctor_action(&nurse, &review, true, false, &request, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "unauthorized_role");
    }

    #[test]
    fn test_completion_blocked_by_open_labs() {
        let patient = actor(Role::Patient);
        let doctor = actor(Role::Doctor);
        let mut done = case(ServiceType::VitalsCheck, CaseStatus::DoctorCompleted, &patient, None);
        done.doctor_id = Some(doctor.user_id);

        let err = decide_transition(&doctor, &done, CaseStatus::Completed, 1, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "domain_guard_failed");

        let decision = decide_transition(&doctor, &done, CaseStatus::Completed, 0, Utc::now()).unwrap();
        assert_eq!(decision.case().unwrap().status, CaseStatus::Completed);
        assert_eq!(decision.changes.audit.len(), 1);
    }

    #[test]
    fn test_dedicated_targets_are_not_generic_transitions() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let visiting = case(ServiceType::VitalsCheck, CaseStatus::NurseOnTheWay, &patient, Some(&nurse));
        let err = decide_transition(&nurse, &visiting, CaseStatus::VitalsRecorded, 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn test_case_access_matches_membership() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        for &status in <CaseStatus as StateMachine>::ALL {
            for unassigned in [true, false] {
                let review = case(ServiceType::VitalsCheck, status, &patient, (!unassigned).then_some(&nurse));
                for visitor in [patient, nurse, actor(Role::Nurse), actor(Role::Doctor), actor(Role::Admin)] {
                    assert_eq!(
                        authorize_case_access(&visitor, &review).is_ok(),
                        review.membership().admits(&visitor),
                        "{status} {:?}",
                        visitor.role
                    );
                }
            }
        }
    }

    #[test]
    fn test_unclaimed_cases_open_only_to_claims() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let doctor = actor(Role::Doctor);

        let pending = case(ServiceType::VitalsCheck, CaseStatus::PendingNurseAssignment, &patient, None);
        assert!(authorize_case_access(&nurse, &pending).is_err());
        assert!(decide_assign_nurse(&nurse, &pending, nurse.user_id, Utc::now()).is_ok());

        let review = case(ServiceType::VitalsCheck, CaseStatus::AwaitingDoctorReview, &patient, Some(&nurse));
        assert_eq!(
            authorize_case_access(&doctor, &review).unwrap_err().code(),
            "not_a_participant"
        );
        let err = decide_transition(&doctor, &review, CaseStatus::Cancelled, 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "not_a_participant");

        let mut auto_closed = review.clone();
        auto_closed.status = CaseStatus::DoctorCompleted;
        let err = decide_transition(&doctor, &auto_closed, CaseStatus::Completed, 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "not_a_participant");
        let admin = actor(Role::Admin);
        assert!(decide_transition(&admin, &auto_closed, CaseStatus::Completed, 0, Utc::now()).is_ok());
    }

    #[test]
    fn test_outsiders_cannot_touch_case() {
        let patient = actor(Role::Patient);
        let nurse = actor(Role::Nurse);
        let assigned = case(ServiceType::VitalsCheck, CaseStatus::NurseAssigned, &patient, Some(&nurse));

        let other_patient = actor(Role::Patient);
        let err = decide_transition(&other_patient, &assigned, CaseStatus::Cancelled, 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "not_a_participant");

        assert!(decide_transition(&patient, &assigned, CaseStatus::Cancelled, 0, Utc::now()).is_ok());
    }
}
