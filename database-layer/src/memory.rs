// In-process CareStore
use async_trait::async_trait;
use audit_engine::{AuditEntry, AuditQuery, EntityType};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use workflow_engine::{
    Case, CaseWrite, ChangeSet, ClinicalReport, DoctorAction, LabOrder, LabOrderWrite, LabReport,
    LabReportWrite,
};

use crate::error::{DatabaseError, DatabaseResult};
use crate::store::CareStore;

#[derive(Default)]
struct State {
    cases: HashMap<Uuid, Case>,
    // keyed by case id
    clinical_reports: HashMap<Uuid, ClinicalReport>,
    doctor_actions: HashMap<Uuid, DoctorAction>,
    lab_orders: HashMap<Uuid, LabOrder>,
    // keyed by lab order id
    lab_reports: HashMap<Uuid, LabReport>,
    audit: Vec<AuditEntry>,
    last_sequence: i64,
}

impl State {
    /// Every precondition of a change set, checked before anything is written
    fn check(&self, changes: &ChangeSet) -> DatabaseResult<()> {
        match &changes.case {
            Some(CaseWrite::Insert(case)) if self.cases.contains_key(&case.id) => {
                return Err(DatabaseError::Duplicate { entity: "case", id: case.id });
            }
            Some(CaseWrite::Update { case, expected }) => {
                let stored = self
                    .cases
                    .get(&case.id)
                    .ok_or(DatabaseError::NotFound { entity: "case", id: case.id })?;
                if stored.status != *expected {
                    return Err(DatabaseError::Conflict {
                        entity: "case",
                        id: case.id,
                        expected: expected.to_string(),
                        actual: stored.status.to_string(),
                    });
                }
            }
            _ => {}
        }

        if let Some(report) = &changes.clinical_report {
            if self.clinical_reports.contains_key(&report.case_id) {
                return Err(DatabaseError::Duplicate {
                    entity: "clinical_report",
                    id: report.case_id,
                });
            }
        }

        if let Some(action) = &changes.doctor_action {
            if self.doctor_actions.contains_key(&action.case_id) {
                return Err(DatabaseError::Duplicate {
                    entity: "doctor_action",
                    id: action.case_id,
                });
            }
        }

        for write in &changes.lab_orders {
            match write {
                LabOrderWrite::Insert(order) if self.lab_orders.contains_key(&order.id) => {
                    return Err(DatabaseError::Duplicate { entity: "lab_order", id: order.id });
                }
                LabOrderWrite::Update { order, expected } => {
                    let stored = self
                        .lab_orders
                        .get(&order.id)
                        .ok_or(DatabaseError::NotFound { entity: "lab_order", id: order.id })?;
                    if stored.status != *expected {
                        return Err(DatabaseError::Conflict {
                            entity: "lab_order",
                            id: order.id,
                            expected: expected.to_string(),
                            actual: stored.status.to_string(),
                        });
                    }
                }
                LabOrderWrite::Insert(_) => {}
            }
        }

        match &changes.lab_report {
            Some(LabReportWrite::Insert(report)) if self.lab_reports.contains_key(&report.lab_order_id) => {
                Err(DatabaseError::Duplicate {
                    entity: "lab_report",
                    id: report.lab_order_id,
                })
            }
            Some(LabReportWrite::Update(report)) if !self.lab_reports.contains_key(&report.lab_order_id) => {
                Err(DatabaseError::NotFound {
                    entity: "lab_report",
                    id: report.lab_order_id,
                })
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, changes: ChangeSet) -> Vec<AuditEntry> {
        if let Some(write) = changes.case {
            let case = match write {
                CaseWrite::Insert(case) | CaseWrite::Update { case, .. } => case,
            };
            self.cases.insert(case.id, case);
        }
        if let Some(report) = changes.clinical_report {
            self.clinical_reports.insert(report.case_id, report);
        }
        if let Some(action) = changes.doctor_action {
            self.doctor_actions.insert(action.case_id, action);
        }
        for write in changes.lab_orders {
            let order = match write {
                LabOrderWrite::Insert(order) | LabOrderWrite::Update { order, .. } => order,
            };
            self.lab_orders.insert(order.id, order);
        }
        if let Some(write) = changes.lab_report {
            let report = match write {
                LabReportWrite::Insert(report) | LabReportWrite::Update(report) => report,
            };
            self.lab_reports.insert(report.lab_order_id, report);
        }

        let mut committed = Vec::with_capacity(changes.audit.len());
        for draft in changes.audit {
            self.last_sequence += 1;
            let entry = draft.commit(self.last_sequence);
            self.audit.push(entry.clone());
            committed.push(entry);
        }
        committed
    }
}

/// CareStore backed by process memory
///
/// A single lock guards every table, so `commit` is trivially atomic and
/// the audit sequence has no gaps. Used by tests and by the server when no
/// database URL is configured.
#[derive(Default)]
pub struct InMemoryCareStore {
    state: RwLock<State>,
}

impl InMemoryCareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit records written so far
    pub async fn audit_len(&self) -> usize {
        self.state.read().await.audit.len()
    }
}

#[async_trait]
impl CareStore for InMemoryCareStore {
    async fn get_case(&self, id: Uuid) -> DatabaseResult<Option<Case>> {
        Ok(self.state.read().await.cases.get(&id).cloned())
    }

    async fn get_clinical_report(&self, case_id: Uuid) -> DatabaseResult<Option<ClinicalReport>> {
        Ok(self.state.read().await.clinical_reports.get(&case_id).cloned())
    }

    async fn get_doctor_action(&self, case_id: Uuid) -> DatabaseResult<Option<DoctorAction>> {
        Ok(self.state.read().await.doctor_actions.get(&case_id).cloned())
    }

    async fn get_lab_order(&self, id: Uuid) -> DatabaseResult<Option<LabOrder>> {
        Ok(self.state.read().await.lab_orders.get(&id).cloned())
    }

    async fn lab_orders_for_case(&self, case_id: Uuid) -> DatabaseResult<Vec<LabOrder>> {
        let state = self.state.read().await;
        let mut orders: Vec<LabOrder> = state
            .lab_orders
            .values()
            .filter(|order| order.case_id == case_id)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn get_lab_report(&self, lab_order_id: Uuid) -> DatabaseResult<Option<LabReport>> {
        Ok(self.state.read().await.lab_reports.get(&lab_order_id).cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> DatabaseResult<Vec<AuditEntry>> {
        let mut state = self.state.write().await;
        state.check(&changes)?;
        let committed = state.apply(changes);
        debug!(audit_records = committed.len(), "Change set committed");
        Ok(committed)
    }

    async fn audit_for_entity(&self, entity_type: EntityType, entity_id: Uuid) -> DatabaseResult<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(AuditQuery::entity(entity_type, entity_id).apply(&state.audit))
    }

    async fn audit_for_actor(&self, actor_id: Uuid) -> DatabaseResult<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(AuditQuery::actor(actor_id).apply(&state.audit))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
