// Decided state deltas
use audit_engine::NewAuditEntry;
use events_bus::Notification;
use uuid::Uuid;

use crate::case_state::CaseStatus;
use crate::lab_state::LabOrderStatus;
use crate::models::{Case, ClinicalReport, DoctorAction, LabOrder, LabReport};

#[derive(Debug, Clone, PartialEq)]
pub enum CaseWrite {
    Insert(Case),
    /// Applied only if the stored status still equals `expected`
    Update { case: Case, expected: CaseStatus },
}

impl CaseWrite {
    pub fn case(&self) -> &Case {
        match self {
            CaseWrite::Insert(case) | CaseWrite::Update { case, .. } => case,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabOrderWrite {
    Insert(LabOrder),
    Update { order: LabOrder, expected: LabOrderStatus },
}

impl LabOrderWrite {
    pub fn order(&self) -> &LabOrder {
        match self {
            LabOrderWrite::Insert(order) | LabOrderWrite::Update { order, .. } => order,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabReportWrite {
    Insert(LabReport),
    Update(LabReport),
}

/// Everything one operation writes; committed atomically or not at all
///
/// Clinical reports and doctor actions are create-once: the store rejects a
/// second insert for the same case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub case: Option<CaseWrite>,
    pub clinical_report: Option<ClinicalReport>,
    pub doctor_action: Option<DoctorAction>,
    pub lab_orders: Vec<LabOrderWrite>,
    pub lab_report: Option<LabReportWrite>,
    pub audit: Vec<NewAuditEntry>,
}

/// Case-topic subscriptions to drop after commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revocation {
    pub case_id: Uuid,
    pub user_id: Uuid,
}

/// Output of the pure decide phase
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub changes: ChangeSet,
    /// Dispatched only after `changes` commit
    pub notifications: Vec<Notification>,
    pub revocations: Vec<Revocation>,
}

impl Decision {
    pub fn case(&self) -> Option<&Case> {
        self.changes.case.as_ref().map(CaseWrite::case)
    }

    pub fn lab_order(&self) -> Option<&LabOrder> {
        self.changes.lab_orders.first().map(LabOrderWrite::order)
    }
}
