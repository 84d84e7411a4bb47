use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use workflow_engine::{LabOperation, LabOrder, LabReport, SampleCollectionChecklist};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::AuthContext;
use crate::server::HomeCareServer;

#[derive(Debug, Default, Deserialize)]
pub struct DeclineBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBody {
    pub collector_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CollectBody {
    pub checklist: SampleCollectionChecklist,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub artifact_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct CloseBody {
    pub notes: String,
}

async fn perform(server: &HomeCareServer, auth: &AuthContext, id: Uuid, operation: LabOperation) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    let order = server.lab_orders().perform(&auth.actor, id, operation).await?;
    Ok(Json(api_success(order)))
}

pub async fn get_lab_order(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    let order = server.lab_orders().get_lab_order(&auth.actor, id).await?;
    Ok(Json(api_success(order)))
}

pub async fn get_lab_report(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LabReport>>, ApiError> {
    let report = server.lab_orders().get_lab_report(&auth.actor, id).await?;
    Ok(Json(api_success(report)))
}

pub async fn confirm(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::Confirm).await
}

pub async fn decline(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    body: Option<Json<DeclineBody>>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    perform(&server, &auth, id, LabOperation::Decline { reason: body.reason }).await
}

pub async fn schedule_collection(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleBody>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    let operation = LabOperation::ScheduleCollection {
        collector_id: body.collector_id,
        scheduled_at: body.scheduled_at,
    };
    perform(&server, &auth, id, operation).await
}

pub async fn record_collection(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<CollectBody>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::RecordCollection { checklist: body.checklist }).await
}

pub async fn send_to_lab(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::SendToLab).await
}

pub async fn upload_report(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ReportBody>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::UploadReport { artifact_ref: body.artifact_ref }).await
}

pub async fn begin_review(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::BeginReview).await
}

pub async fn close_review(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<CloseBody>,
) -> Result<Json<ApiResponse<LabOrder>>, ApiError> {
    perform(&server, &auth, id, LabOperation::CloseReview { notes: body.notes }).await
}
