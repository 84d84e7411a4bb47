use audit_engine::{AuditEntry, EntityType};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::AuthContext;
use crate::server::HomeCareServer;

/// `GET /audit/entities/:entity_type/:id`, in commit order
pub async fn entity_history(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    let entries = server.audit_log().for_entity(&auth.actor, entity_type, entity_id).await?;
    Ok(Json(api_success(entries)))
}

/// `GET /audit/actors/:id`
pub async fn actor_history(
    State(server): State<HomeCareServer>,
    auth: AuthContext,
    Path(actor_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let entries = server.audit_log().for_actor(&auth.actor, actor_id).await?;
    Ok(Json(api_success(entries)))
}
