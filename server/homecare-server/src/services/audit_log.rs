// Audit queries with participant scoping
use audit_engine::{AuditEntry, EntityType};
use auth_identity::Actor;
use database_layer::CareStore;
use std::sync::Arc;
use uuid::Uuid;
use workflow_engine::{authorize_case_access, can_view_lab_order, WorkflowError};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AuditLogService {
    store: Arc<dyn CareStore>,
}

impl AuditLogService {
    pub fn new(store: Arc<dyn CareStore>) -> Self {
        Self { store }
    }

    /// Admins see everything; case participants see their case and its lab orders
    pub async fn for_entity(&self, actor: &Actor, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditEntry>, ApiError> {
        if !actor.is_admin() {
            self.authorize_entity(actor, entity_type, entity_id).await?;
        }
        Ok(self.store.audit_for_entity(entity_type, entity_id).await?)
    }

    /// Admins, or actors reading their own trail
    pub async fn for_actor(&self, actor: &Actor, actor_id: Uuid) -> Result<Vec<AuditEntry>, ApiError> {
        if !actor.is_admin() && actor.user_id != actor_id {
            return Err(WorkflowError::AccessDenied("audit trail of another user".to_string()).into());
        }
        Ok(self.store.audit_for_actor(actor_id).await?)
    }

    async fn authorize_entity(&self, actor: &Actor, entity_type: EntityType, entity_id: Uuid) -> Result<(), ApiError> {
        match entity_type {
            EntityType::Case => {
                let case = self
                    .store
                    .get_case(entity_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("case", entity_id))?;
                authorize_case_access(actor, &case)?;
                Ok(())
            }
            EntityType::LabOrder => {
                let order = self
                    .store
                    .get_lab_order(entity_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("lab_order", entity_id))?;
                let case = self
                    .store
                    .get_case(order.case_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("case", order.case_id))?;
                if can_view_lab_order(actor, &case, &order) {
                    Ok(())
                } else {
                    Err(WorkflowError::NotAParticipant { case_id: case.id }.into())
                }
            }
            other => Err(WorkflowError::AccessDenied(format!("audit of {other} records is admin only")).into()),
        }
    }
}
