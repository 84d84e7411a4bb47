// Lab order operations
use auth_identity::Actor;
use chrono::Utc;
use database_layer::CareStore;
use events_bus::EventBus;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use workflow_engine::{can_view_lab_order, decide_lab_operation, Case, LabOperation, LabOrder, LabReport, WorkflowError};

use crate::error::ApiError;
use crate::services::commit_decision;

#[derive(Clone)]
pub struct LabOrderService {
    store: Arc<dyn CareStore>,
    bus: EventBus,
}

impl LabOrderService {
    pub fn new(store: Arc<dyn CareStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// The order together with its owning case
    async fn load(&self, lab_order_id: Uuid) -> Result<(LabOrder, Case), ApiError> {
        let order = self
            .store
            .get_lab_order(lab_order_id)
            .await?
            .ok_or_else(|| ApiError::not_found("lab_order", lab_order_id))?;
        let case = self
            .store
            .get_case(order.case_id)
            .await?
            .ok_or_else(|| ApiError::not_found("case", order.case_id))?;
        Ok((order, case))
    }

    pub async fn get_lab_order(&self, actor: &Actor, lab_order_id: Uuid) -> Result<LabOrder, ApiError> {
        let (order, case) = self.load(lab_order_id).await?;
        if !can_view_lab_order(actor, &case, &order) {
            return Err(WorkflowError::NotAParticipant { case_id: case.id }.into());
        }
        Ok(order)
    }

    pub async fn get_lab_report(&self, actor: &Actor, lab_order_id: Uuid) -> Result<LabReport, ApiError> {
        self.get_lab_order(actor, lab_order_id).await?;
        self.store
            .get_lab_report(lab_order_id)
            .await?
            .ok_or_else(|| ApiError::not_found("lab_report", lab_order_id))
    }

    pub async fn perform(&self, actor: &Actor, lab_order_id: Uuid, operation: LabOperation) -> Result<LabOrder, ApiError> {
        let (order, case) = self.load(lab_order_id).await?;
        let report = self.store.get_lab_report(lab_order_id).await?;

        let decision = decide_lab_operation(actor, &case, &order, report.as_ref(), operation, Utc::now())?;
        let updated = decision
            .lab_order()
            .cloned()
            .ok_or_else(|| ApiError::internal("lab order decision carries no order write"))?;
        commit_decision(self.store.as_ref(), &self.bus, decision).await?;

        info!(
            lab_order_id = %lab_order_id,
            case_id = %case.id,
            from = %order.status,
            to = %updated.status,
            actor = %actor,
            "Lab order transitioned"
        );
        Ok(updated)
    }
}
