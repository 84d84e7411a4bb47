#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use audit_engine::{AuditAction, EntityType};
use auth_identity::{Actor, IdentityConfig, Role, TokenService};
use chrono::Utc;
use database_layer::{CareStore, InMemoryCareStore};
use events_bus::{names, BusError, EventReceiver, InMemoryWindowStore, RateLimiterConfig, SignalKind};
use homecare_server::{ApiError, AppConfig, HomeCareServer};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use workflow_engine::{
    Attachment, CaseStatus, ClinicalSubmission, DoctorActionRequest, LabOperation, LabOrderStatus, NewCaseRequest,
    SampleCollectionChecklist, TriageSeverity, Urgency, WorkflowError,
};

struct Harness {
    server: HomeCareServer,
    store: Arc<InMemoryCareStore>,
}

fn harness_with_limit(max_events: u32) -> Harness {
    let store = Arc::new(InMemoryCareStore::new());
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();

    let tokens = TokenService::new(IdentityConfig::new("integration-test-secret")).unwrap();
    let limiter = RateLimiterConfig {
        max_events,
        window: Duration::from_secs(60),
        enabled: true,
    };
    let server = HomeCareServer::from_parts(
        config,
        Arc::clone(&store) as Arc<dyn CareStore>,
        tokens,
        limiter,
        Arc::new(InMemoryWindowStore::new()),
    );
    Harness { server, store }
}

fn harness() -> Harness {
    harness_with_limit(100)
}

fn actor(role: Role) -> Actor {
    Actor::new(Uuid::new_v4(), role)
}

fn vitals(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn request(service_type: &str) -> NewCaseRequest {
    NewCaseRequest {
        service_type: service_type.to_string(),
        is_immediate: true,
        scheduled_time: None,
        patient_id: None,
    }
}

fn wound_submission() -> ClinicalSubmission {
    ClinicalSubmission {
        vitals: vitals(json!({
            "woundLocation": "left shin",
            "woundSize": "3x2cm",
            "exudateLevel": "low",
            "signsOfInfection": false,
            "dressingType": "foam"
        })),
        triage_severity: TriageSeverity::Moderate,
        attachments: vec![Attachment::new("wound-before.jpg"), Attachment::new("wound-after.jpg")],
    }
}

fn injection_submission() -> ClinicalSubmission {
    ClinicalSubmission {
        vitals: vitals(json!({
            "medicationName": "Ceftriaxone",
            "dose": "1g",
            "route": "intramuscular",
            "injectionSite": "left deltoid",
            "prescriptionVerified": true,
            "reactionStatus": "none",
            "administeredAt": "2026-10-16T10:00:00Z"
        })),
        triage_severity: TriageSeverity::Low,
        attachments: vec![Attachment::for_field("rx-photo.jpg", "prescriptionPhoto")],
    }
}

fn doctor_action(lab_tests: &[&str]) -> DoctorActionRequest {
    DoctorActionRequest {
        diagnosis: "Healing wound, no infection".to_string(),
        notes: None,
        referral: None,
        follow_up_date: None,
        lab_tests: lab_tests.iter().map(|t| t.to_string()).collect(),
        lab_urgency: Urgency::Routine,
        requires_fasting: false,
    }
}

fn drain_names(rx: &mut EventReceiver) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.name);
    }
    seen
}

/// Case created, accepted and visited; ready for the clinical report
async fn visited_case(h: &Harness, service_type: &str, patient: &Actor, nurse: &Actor) -> Uuid {
    let cases = h.server.cases();
    let case = cases.create_case(patient, &request(service_type)).await.unwrap();
    cases.assign_nurse(nurse, case.id, nurse.user_id).await.unwrap();
    cases
        .transition_case(nurse, case.id, CaseStatus::NurseOnTheWay)
        .await
        .unwrap();
    case.id
}

#[tokio::test]
async fn test_wound_dressing_happy_path() {
    let h = harness();
    let cases = h.server.cases();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let doctor = actor(Role::Doctor);

    let (_nurse_conn, mut nurse_rx) = h.server.bus.connect(nurse);
    let (_doctor_conn, mut doctor_rx) = h.server.bus.connect(doctor);

    let case = cases.create_case(&patient, &request("wound_dressing")).await.unwrap();
    assert_eq!(case.status, CaseStatus::PendingNurseAssignment);
    assert_eq!(case.patient_id, patient.user_id);
    assert!(drain_names(&mut nurse_rx).contains(&names::CASE_OPEN_FOR_ASSIGNMENT.to_string()));

    let case = cases.assign_nurse(&nurse, case.id, nurse.user_id).await.unwrap();
    assert_eq!(case.status, CaseStatus::NurseAssigned);
    assert_eq!(case.nurse_id, Some(nurse.user_id));

    cases
        .transition_case(&nurse, case.id, CaseStatus::NurseOnTheWay)
        .await
        .unwrap();
    let case = cases
        .submit_clinical_report(&nurse, case.id, &wound_submission())
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::AwaitingDoctorReview);
    assert!(drain_names(&mut doctor_rx).contains(&names::CASE_REVIEW_REQUESTED.to_string()));

    let outcome = cases
        .record_doctor_action(&doctor, case.id, &doctor_action(&[]))
        .await
        .unwrap();
    assert_eq!(outcome.case.status, CaseStatus::DoctorCompleted);
    assert_eq!(outcome.case.doctor_id, Some(doctor.user_id));
    assert!(outcome.lab_order.is_none());

    let case = cases
        .transition_case(&doctor, case.id, CaseStatus::Completed)
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::Completed);

    let history = h
        .server
        .audit_log()
        .for_entity(&patient, EntityType::Case, case.id)
        .await
        .unwrap();
    let actions: Vec<AuditAction> = history.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::CaseCreated,
            AuditAction::NurseAssigned,
            AuditAction::CaseTransitioned,
            AuditAction::ClinicalReportSubmitted,
            AuditAction::CaseTransitioned,
            AuditAction::DoctorActionRecorded,
            AuditAction::CaseTransitioned,
        ]
    );
    assert!(history.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
    assert_eq!(history.last().unwrap().to_state.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_injection_with_no_reaction_auto_closes() {
    let h = harness();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let case_id = visited_case(&h, "injection", &patient, &nurse).await;

    let case = h
        .server
        .cases()
        .submit_clinical_report(&nurse, case_id, &injection_submission())
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::DoctorCompleted);
    assert_eq!(case.doctor_id, None);

    let history = h.store.audit_for_entity(EntityType::Case, case_id).await.unwrap();
    let auto = history
        .iter()
        .find(|entry| entry.action == AuditAction::CaseAutoAdvanced)
        .unwrap();
    assert_eq!(auto.actor_id, nurse.user_id);
    assert_eq!(auto.from_state.as_deref(), Some("awaiting_doctor_review"));
    assert_eq!(auto.to_state.as_deref(), Some("doctor_completed"));
}

#[tokio::test]
async fn test_injection_with_reaction_waits_for_doctor() {
    let h = harness();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let case_id = visited_case(&h, "injection", &patient, &nurse).await;

    let mut submission = injection_submission();
    submission.vitals.insert("reactionStatus".to_string(), json!("mild"));
    let case = h
        .server
        .cases()
        .submit_clinical_report(&nurse, case_id, &submission)
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::AwaitingDoctorReview);
}

#[tokio::test]
async fn test_rejected_attempts_leave_no_audit_trace() {
    let h = harness();
    let cases = h.server.cases();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let case_id = visited_case(&h, "wound_dressing", &patient, &nurse).await;
    cases
        .submit_clinical_report(&nurse, case_id, &wound_submission())
        .await
        .unwrap();
    let before = h.store.audit_len().await;

    let duplicate = cases
        .submit_clinical_report(&nurse, case_id, &wound_submission())
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), "duplicate_submission");

    let skipped = cases
        .transition_case(&nurse, case_id, CaseStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(skipped.code(), "invalid_transition");

    let wrong_role = cases
        .transition_case(&patient, case_id, CaseStatus::Cancelled)
        .await
        .unwrap_err();
    assert_eq!(wrong_role.code(), "unauthorized_role");

    assert_eq!(h.store.audit_len().await, before);
}

#[tokio::test]
async fn test_invalid_report_lists_every_violation() {
    let h = harness();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let case_id = visited_case(&h, "wound_dressing", &patient, &nurse).await;

    let submission = ClinicalSubmission {
        vitals: vitals(json!({ "woundLocation": "left shin", "exudateLevel": "extreme" })),
        triage_severity: TriageSeverity::Low,
        attachments: vec![Attachment::new("only-one.jpg")],
    };
    let err = h
        .server
        .cases()
        .submit_clinical_report(&nurse, case_id, &submission)
        .await
        .unwrap_err();

    match err {
        ApiError::Workflow(WorkflowError::ValidationFailed(violations)) => assert!(violations.len() >= 4),
        other => panic!("expected validation failure, got {other:?}"),
    }
    let case = h.store.get_case(case_id).await.unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::NurseOnTheWay);
}

#[tokio::test]
async fn test_reassignment_revokes_former_nurse() {
    let h = harness();
    let bus = &h.server.bus;
    let patient = actor(Role::Patient);
    let admin = actor(Role::Admin);
    let first = actor(Role::Nurse);
    let second = actor(Role::Nurse);

    let case = h.server.cases().create_case(&patient, &request("vitals_check")).await.unwrap();
    h.server.cases().assign_nurse(&first, case.id, first.user_id).await.unwrap();

    let (first_conn, mut first_rx) = bus.connect(first);
    bus.join_case(first_conn, case.id).await.unwrap();

    h.server
        .cases()
        .reassign_nurse(&admin, case.id, second.user_id)
        .await
        .unwrap();

    let seen = drain_names(&mut first_rx);
    assert!(seen.contains(&names::CASE_NURSE_REASSIGNED.to_string()));

    let denied = bus.join_case(first_conn, case.id).await.unwrap_err();
    assert!(matches!(denied, BusError::NotAParticipant { .. }));

    let err = h.server.cases().get_case(&first, case.id).await.unwrap_err();
    assert_eq!(err.code(), "not_a_participant");

    let (second_conn, _second_rx) = bus.connect(second);
    bus.join_case(second_conn, case.id).await.unwrap();

    h.server
        .cases()
        .transition_case(&second, case.id, CaseStatus::NurseOnTheWay)
        .await
        .unwrap();
    assert!(drain_names(&mut first_rx).is_empty());
}

#[tokio::test]
async fn test_case_reads_follow_join_membership() {
    let h = harness();
    let bus = &h.server.bus;
    let cases = h.server.cases();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let doctor = actor(Role::Doctor);
    let bystander = actor(Role::Nurse);

    let pending = cases.create_case(&patient, &request("vitals_check")).await.unwrap();
    let (bystander_conn, _bystander_rx) = bus.connect(bystander);
    assert!(bus.join_case(bystander_conn, pending.id).await.is_err());
    let err = cases.get_case(&bystander, pending.id).await.unwrap_err();
    assert_eq!(err.code(), "not_a_participant");

    let case_id = visited_case(&h, "wound_dressing", &patient, &nurse).await;
    cases
        .submit_clinical_report(&nurse, case_id, &wound_submission())
        .await
        .unwrap();

    let (doctor_conn, _doctor_rx) = bus.connect(doctor);
    assert!(bus.join_case(doctor_conn, case_id).await.is_err());
    for err in [
        cases.get_case(&doctor, case_id).await.unwrap_err(),
        cases.get_clinical_report(&doctor, case_id).await.unwrap_err(),
        cases.list_lab_orders(&doctor, case_id).await.unwrap_err(),
        h.server
            .audit_log()
            .for_entity(&doctor, EntityType::Case, case_id)
            .await
            .unwrap_err(),
    ] {
        assert_eq!(err.code(), "not_a_participant");
    }

    cases
        .record_doctor_action(&doctor, case_id, &doctor_action(&[]))
        .await
        .unwrap();
    bus.join_case(doctor_conn, case_id).await.unwrap();
    assert_eq!(cases.get_case(&doctor, case_id).await.unwrap().doctor_id, Some(doctor.user_id));
    assert!(h
        .server
        .audit_log()
        .for_entity(&doctor, EntityType::Case, case_id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_rate_limit_is_per_connection() {
    let h = harness_with_limit(2);
    let bus = &h.server.bus;
    let doctor = actor(Role::Doctor);
    let target = Uuid::new_v4();

    let (busy, _busy_rx) = bus.connect(doctor);
    let (quiet, _quiet_rx) = bus.connect(doctor);

    bus.signal(busy, target, SignalKind::Offer, json!({})).await.unwrap();
    bus.signal(busy, target, SignalKind::IceCandidate, json!({})).await.unwrap();
    let limited = bus
        .signal(busy, target, SignalKind::IceCandidate, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(limited, BusError::RateLimited { .. }));

    bus.signal(quiet, target, SignalKind::Offer, json!({})).await.unwrap();
}

#[tokio::test]
async fn test_open_lab_order_blocks_completion_until_closed() {
    let h = harness();
    let cases = h.server.cases();
    let labs = h.server.lab_orders();
    let patient = actor(Role::Patient);
    let nurse = actor(Role::Nurse);
    let doctor = actor(Role::Doctor);
    let admin = actor(Role::Admin);

    let case_id = visited_case(&h, "wound_dressing", &patient, &nurse).await;
    cases
        .submit_clinical_report(&nurse, case_id, &wound_submission())
        .await
        .unwrap();
    let outcome = cases
        .record_doctor_action(&doctor, case_id, &doctor_action(&["cbc", "crp"]))
        .await
        .unwrap();
    let order = outcome.lab_order.unwrap();
    assert_eq!(order.status, LabOrderStatus::PendingPatientConfirmation);

    let blocked = cases
        .transition_case(&doctor, case_id, CaseStatus::Completed)
        .await
        .unwrap_err();
    match &blocked {
        ApiError::Workflow(WorkflowError::DomainGuardFailed { reason, .. }) => assert_eq!(*reason, "lab_pending"),
        other => panic!("expected lab_pending, got {other:?}"),
    }
    assert_eq!(blocked.status_code().as_u16(), 409);

    labs.perform(&patient, order.id, LabOperation::Confirm).await.unwrap();
    labs.perform(
        &nurse,
        order.id,
        LabOperation::ScheduleCollection {
            collector_id: nurse.user_id,
            scheduled_at: Utc::now(),
        },
    )
    .await
    .unwrap();

    let incomplete = SampleCollectionChecklist {
        identity_confirmed: true,
        sample_collected: true,
        ..SampleCollectionChecklist::default()
    };
    let err = labs
        .perform(&nurse, order.id, LabOperation::RecordCollection { checklist: incomplete })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "incomplete_checklist");

    labs.perform(
        &nurse,
        order.id,
        LabOperation::RecordCollection {
            checklist: SampleCollectionChecklist::complete(),
        },
    )
    .await
    .unwrap();
    labs.perform(&nurse, order.id, LabOperation::SendToLab).await.unwrap();
    labs.perform(
        &admin,
        order.id,
        LabOperation::UploadReport {
            artifact_ref: "reports/cbc-crp.pdf".to_string(),
        },
    )
    .await
    .unwrap();
    labs.perform(&doctor, order.id, LabOperation::BeginReview).await.unwrap();
    let closed = labs
        .perform(
            &doctor,
            order.id,
            LabOperation::CloseReview {
                notes: "Inflammatory markers normal".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(closed.status, LabOrderStatus::LabClosed);

    let report = labs.get_lab_report(&patient, order.id).await.unwrap();
    assert_eq!(report.reviewed_by, Some(doctor.user_id));

    let case = cases
        .transition_case(&doctor, case_id, CaseStatus::Completed)
        .await
        .unwrap();
    assert_eq!(case.status, CaseStatus::Completed);

    let lab_history = h
        .server
        .audit_log()
        .for_entity(&doctor, EntityType::LabOrder, order.id)
        .await
        .unwrap();
    assert_eq!(lab_history.first().unwrap().action, AuditAction::LabOrderCreated);
    assert_eq!(lab_history.last().unwrap().action, AuditAction::LabReportReviewed);
}

#[tokio::test]
async fn test_audit_by_actor_is_self_or_admin() {
    let h = harness();
    let patient = actor(Role::Patient);
    let other = actor(Role::Patient);
    let admin = actor(Role::Admin);
    h.server.cases().create_case(&patient, &request("elderly_care")).await.unwrap();

    let own = h.server.audit_log().for_actor(&patient, patient.user_id).await.unwrap();
    assert_eq!(own.len(), 1);
    let via_admin = h.server.audit_log().for_actor(&admin, patient.user_id).await.unwrap();
    assert_eq!(via_admin, own);

    let err = h.server.audit_log().for_actor(&other, patient.user_id).await.unwrap_err();
    assert_eq!(err.code(), "access_denied");
}
