use axum::{
    extract::{Path, State},
    Json,
};
use workflow_engine::{FlowRuleSet, WorkflowError};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::AuthContext;
use crate::server::HomeCareServer;

/// Catalog of service types with their capture rules
pub async fn list_service_types(
    State(server): State<HomeCareServer>,
    _auth: AuthContext,
) -> Json<ApiResponse<Vec<FlowRuleSet>>> {
    let catalog = server.registry.catalog().into_iter().cloned().collect();
    Json(api_success(catalog))
}

pub async fn get_service_type(
    State(server): State<HomeCareServer>,
    _auth: AuthContext,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<FlowRuleSet>>, ApiError> {
    let rules = server
        .registry
        .lookup(&name)
        .cloned()
        .ok_or(WorkflowError::UnknownServiceType(name))?;
    Ok(Json(api_success(rules)))
}
