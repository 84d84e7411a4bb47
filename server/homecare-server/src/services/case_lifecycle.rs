// Case lifecycle: load, decide, commit, notify
use auth_identity::Actor;
use chrono::Utc;
use database_layer::CareStore;
use events_bus::EventBus;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use workflow_engine::{
    authorize_case_access, decide_assign_nurse, decide_clinical_report, decide_create_case, decide_doctor_action,
    decide_reassign_nurse, decide_transition, Case, CaseStatus, ClinicalReport, ClinicalSubmission, Decision,
    DoctorAction, DoctorActionRequest, FlowRuleRegistry, LabOrder, NewCaseRequest, StateMachine, WorkflowError,
};

use crate::error::ApiError;
use crate::services::commit_decision;

/// Result of a doctor's review
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorActionOutcome {
    pub case: Case,
    pub doctor_action: DoctorAction,
    pub lab_order: Option<LabOrder>,
}

#[derive(Clone)]
pub struct CaseLifecycleService {
    store: Arc<dyn CareStore>,
    bus: EventBus,
    registry: Arc<FlowRuleRegistry>,
}

impl CaseLifecycleService {
    pub fn new(store: Arc<dyn CareStore>, bus: EventBus, registry: Arc<FlowRuleRegistry>) -> Self {
        Self { store, bus, registry }
    }

    async fn load_case(&self, case_id: Uuid) -> Result<Case, ApiError> {
        self.store
            .get_case(case_id)
            .await?
            .ok_or_else(|| ApiError::not_found("case", case_id))
    }

    async fn open_lab_orders(&self, case_id: Uuid) -> Result<usize, ApiError> {
        let orders = self.store.lab_orders_for_case(case_id).await?;
        Ok(orders.iter().filter(|order| !order.status.is_terminal()).count())
    }

    /// Commit and hand back the case as decided
    async fn apply(&self, decision: Decision) -> Result<Case, ApiError> {
        let case = decision
            .case()
            .cloned()
            .ok_or_else(|| ApiError::internal("case decision carries no case write"))?;
        commit_decision(self.store.as_ref(), &self.bus, decision).await?;
        Ok(case)
    }

    pub async fn create_case(&self, actor: &Actor, request: &NewCaseRequest) -> Result<Case, ApiError> {
        let decision = decide_create_case(actor, request, Utc::now())?;
        let case = self.apply(decision).await?;
        info!(
            case_id = %case.id,
            service_type = %case.service_type,
            patient_id = %case.patient_id,
            "Case created"
        );
        Ok(case)
    }

    pub async fn get_case(&self, actor: &Actor, case_id: Uuid) -> Result<Case, ApiError> {
        let case = self.load_case(case_id).await?;
        authorize_case_access(actor, &case)?;
        Ok(case)
    }

    pub async fn assign_nurse(&self, actor: &Actor, case_id: Uuid, nurse_id: Uuid) -> Result<Case, ApiError> {
        let case = self.load_case(case_id).await?;
        let updated = self
            .apply(decide_assign_nurse(actor, &case, nurse_id, Utc::now())?)
            .await?;
        info!(case_id = %case_id, nurse_id = %nurse_id, actor = %actor, "Nurse assigned");
        Ok(updated)
    }

    pub async fn reassign_nurse(&self, actor: &Actor, case_id: Uuid, nurse_id: Uuid) -> Result<Case, ApiError> {
        let case = self.load_case(case_id).await?;
        let updated = self
            .apply(decide_reassign_nurse(actor, &case, nurse_id, Utc::now())?)
            .await?;
        info!(
            case_id = %case_id,
            from = ?case.nurse_id,
            to = %nurse_id,
            "Nurse reassigned"
        );
        Ok(updated)
    }

    pub async fn transition_case(&self, actor: &Actor, case_id: Uuid, target: CaseStatus) -> Result<Case, ApiError> {
        let case = self.load_case(case_id).await?;
        let open = self.open_lab_orders(case_id).await?;
        let updated = self
            .apply(decide_transition(actor, &case, target, open, Utc::now())?)
            .await?;
        info!(case_id = %case_id, from = %case.status, to = %target, actor = %actor, "Case transitioned");
        Ok(updated)
    }

    pub async fn submit_clinical_report(
        &self,
        actor: &Actor,
        case_id: Uuid,
        submission: &ClinicalSubmission,
    ) -> Result<Case, ApiError> {
        let case = self.load_case(case_id).await?;
        let rules = self
            .registry
            .get(case.service_type)
            .ok_or_else(|| WorkflowError::UnknownServiceType(case.service_type.to_string()))?;
        let report_exists = self.store.get_clinical_report(case_id).await?.is_some();

        let decision = decide_clinical_report(actor, &case, report_exists, submission, rules, Utc::now())?;
        let updated = self.apply(decision).await?;
        info!(
            case_id = %case_id,
            status = %updated.status,
            triage = ?submission.triage_severity,
            "Clinical report submitted"
        );
        Ok(updated)
    }

    pub async fn record_doctor_action(
        &self,
        actor: &Actor,
        case_id: Uuid,
        request: &DoctorActionRequest,
    ) -> Result<DoctorActionOutcome, ApiError> {
        let case = self.load_case(case_id).await?;
        let report_exists = self.store.get_clinical_report(case_id).await?.is_some();
        let action_exists = self.store.get_doctor_action(case_id).await?.is_some();

        let decision = decide_doctor_action(actor, &case, report_exists, action_exists, request, Utc::now())?;
        let doctor_action = decision
            .changes
            .doctor_action
            .clone()
            .ok_or_else(|| ApiError::internal("doctor action decision carries no record"))?;
        let lab_order = decision.lab_order().cloned();
        let updated = self.apply(decision).await?;

        info!(
            case_id = %case_id,
            doctor_id = %actor.user_id,
            lab_order = ?lab_order.as_ref().map(|order| order.id),
            "Doctor action recorded"
        );
        Ok(DoctorActionOutcome {
            case: updated,
            doctor_action,
            lab_order,
        })
    }

    pub async fn get_clinical_report(&self, actor: &Actor, case_id: Uuid) -> Result<ClinicalReport, ApiError> {
        self.get_case(actor, case_id).await?;
        self.store
            .get_clinical_report(case_id)
            .await?
            .ok_or_else(|| ApiError::not_found("clinical_report", case_id))
    }

    pub async fn get_doctor_action(&self, actor: &Actor, case_id: Uuid) -> Result<DoctorAction, ApiError> {
        self.get_case(actor, case_id).await?;
        self.store
            .get_doctor_action(case_id)
            .await?
            .ok_or_else(|| ApiError::not_found("doctor_action", case_id))
    }

    pub async fn list_lab_orders(&self, actor: &Actor, case_id: Uuid) -> Result<Vec<LabOrder>, ApiError> {
        self.get_case(actor, case_id).await?;
        Ok(self.store.lab_orders_for_case(case_id).await?)
    }
}
