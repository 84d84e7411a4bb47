// Persistence seam for the care workflow
use async_trait::async_trait;
use audit_engine::{AuditEntry, EntityType};
use uuid::Uuid;
use workflow_engine::{Case, ChangeSet, ClinicalReport, DoctorAction, LabOrder, LabReport};

use crate::error::DatabaseResult;

/// Point lookups plus one atomic write path
///
/// `commit` applies an entire `ChangeSet`, entity writes and audit records
/// together, or nothing:
/// - `CaseWrite::Update`/`LabOrderWrite::Update` fail with `Conflict` when
///   the stored status no longer equals the expected one
/// - a second clinical report, doctor action or lab report fails with `Duplicate`
/// - audit records get the next values of a single, monotonically increasing sequence
#[async_trait]
pub trait CareStore: Send + Sync {
    async fn get_case(&self, id: Uuid) -> DatabaseResult<Option<Case>>;

    async fn get_clinical_report(&self, case_id: Uuid) -> DatabaseResult<Option<ClinicalReport>>;

    async fn get_doctor_action(&self, case_id: Uuid) -> DatabaseResult<Option<DoctorAction>>;

    async fn get_lab_order(&self, id: Uuid) -> DatabaseResult<Option<LabOrder>>;

    async fn lab_orders_for_case(&self, case_id: Uuid) -> DatabaseResult<Vec<LabOrder>>;

    async fn get_lab_report(&self, lab_order_id: Uuid) -> DatabaseResult<Option<LabReport>>;

    /// Returns the committed audit records, in sequence order
    async fn commit(&self, changes: ChangeSet) -> DatabaseResult<Vec<AuditEntry>>;

    async fn audit_for_entity(&self, entity_type: EntityType, entity_id: Uuid) -> DatabaseResult<Vec<AuditEntry>>;

    async fn audit_for_actor(&self, actor_id: Uuid) -> DatabaseResult<Vec<AuditEntry>>;

    async fn is_healthy(&self) -> bool;
}
