use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use workflow_engine::{Case, CaseStatus, ClinicalReport, ClinicalSubmission, DoctorAction, DoctorActionRequest, LabOrder, NewCaseRequest};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::AuthContext;
use crate::server::HomeCareServer;
use crate::services::DoctorActionOutcome;

/// Body of `POST /cases/:id/assign` and `/reassign`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurseAssignment {
    pub nurse_id: Uuid,
}

/// Body of `POST /cases/:id/transition`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub target: String,
}

pub async fn create_case(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Json(request): Json<NewCaseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Case>>), ApiError> {
    let case = server.cases().create_case(&auth.actor, &request).await?;
    Ok((StatusCode::CREATED, Json(api_success(case))))
}

pub async fn get_case(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Case>>, ApiError> {
    let case = server.cases().get_case(&auth.actor, case_id).await?;
    Ok(Json(api_success(case)))
}

pub async fn assign_nurse(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(body): Json<NurseAssignment>,
) -> Result<Json<ApiResponse<Case>>, ApiError> {
    let case = server.cases().assign_nurse(&auth.actor, case_id, body.nurse_id).await?;
    Ok(Json(api_success(case)))
}

pub async fn reassign_nurse(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(body): Json<NurseAssignment>,
) -> Result<Json<ApiResponse<Case>>, ApiError> {
    let case = server.cases().reassign_nurse(&auth.actor, case_id, body.nurse_id).await?;
    Ok(Json(api_success(case)))
}

/// Generic edge; an unknown target name is an `invalid_transition`
pub async fn transition_case(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<Case>>, ApiError> {
    let service = server.cases();
    let target: CaseStatus = match body.target.parse() {
        Ok(target) => target,
        Err(_) => {
            let case = service.get_case(&auth.actor, case_id).await?;
            return Err(workflow_engine::WorkflowError::invalid_transition(case.status, body.target).into());
        }
    };
    let case = service.transition_case(&auth.actor, case_id, target).await?;
    Ok(Json(api_success(case)))
}

pub async fn submit_clinical_report(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(submission): Json<ClinicalSubmission>,
) -> Result<Json<ApiResponse<Case>>, ApiError> {
    let case = server
        .cases()
        .submit_clinical_report(&auth.actor, case_id, &submission)
        .await?;
    Ok(Json(api_success(case)))
}

pub async fn get_clinical_report(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ClinicalReport>>, ApiError> {
    let report = server.cases().get_clinical_report(&auth.actor, case_id).await?;
    Ok(Json(api_success(report)))
}

pub async fn record_doctor_action(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(request): Json<DoctorActionRequest>,
) -> Result<Json<ApiResponse<DoctorActionOutcome>>, ApiError> {
    let outcome = server
        .cases()
        .record_doctor_action(&auth.actor, case_id, &request)
        .await?;
    Ok(Json(api_success(outcome)))
}

pub async fn get_doctor_action(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiResponse<DoctorAction>>, ApiError> {
    let action = server.cases().get_doctor_action(&auth.actor, case_id).await?;
    Ok(Json(api_success(action)))
}

pub async fn list_lab_orders(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<LabOrder>>>, ApiError> {
    let orders = server.cases().list_lab_orders(&auth.actor, case_id).await?;
    Ok(Json(api_success(orders)))
}
