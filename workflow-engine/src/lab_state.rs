// Lab order state machine
use std::fmt;
use std::str::FromStr;

use auth_identity::Role;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::state_machine::{EdgeRule, Guard, StateMachine};

/// Linear lab order lifecycle; the only branch is declining before confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabOrderStatus {
    PendingPatientConfirmation,
    PendingSampleCollection,
    SampleCollectionScheduled,
    SampleCollected,
    SentToLab,
    ReportReady,
    DoctorReviewPending,
    LabClosed,
}

impl LabOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LabOrderStatus::PendingPatientConfirmation => "pending_patient_confirmation",
            LabOrderStatus::PendingSampleCollection => "pending_sample_collection",
            LabOrderStatus::SampleCollectionScheduled => "sample_collection_scheduled",
            LabOrderStatus::SampleCollected => "sample_collected",
            LabOrderStatus::SentToLab => "sent_to_lab",
            LabOrderStatus::ReportReady => "report_ready",
            LabOrderStatus::DoctorReviewPending => "doctor_review_pending",
            LabOrderStatus::LabClosed => "lab_closed",
        }
    }
}

impl fmt::Display for LabOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabOrderStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LabOrderStatus as StateMachine>::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("unknown lab order status: {s}")))
    }
}

impl StateMachine for LabOrderStatus {
    const ALL: &'static [Self] = &[
        LabOrderStatus::PendingPatientConfirmation,
        LabOrderStatus::PendingSampleCollection,
        LabOrderStatus::SampleCollectionScheduled,
        LabOrderStatus::SampleCollected,
        LabOrderStatus::SentToLab,
        LabOrderStatus::ReportReady,
        LabOrderStatus::DoctorReviewPending,
        LabOrderStatus::LabClosed,
    ];

    fn edge(self, to: Self) -> Option<EdgeRule> {
        use LabOrderStatus::*;

        let rule = match (self, to) {
            (PendingPatientConfirmation, PendingSampleCollection) => {
                EdgeRule::open(&[Role::Patient, Role::Admin])
            }
            (PendingPatientConfirmation, LabClosed) => {
                EdgeRule::open(&[Role::Patient, Role::Doctor, Role::Admin])
            }
            (PendingSampleCollection, SampleCollectionScheduled) => {
                EdgeRule::open(&[Role::Nurse, Role::Admin])
            }
            (SampleCollectionScheduled, SampleCollected) => {
                EdgeRule::guarded(&[Role::Nurse], Guard::ChecklistComplete)
            }
            (SampleCollected, SentToLab) => EdgeRule::open(&[Role::Nurse, Role::Admin]),
            (SentToLab, ReportReady) => EdgeRule::open(&[Role::Admin]),
            (ReportReady, DoctorReviewPending) => EdgeRule::open(&[Role::Doctor, Role::Admin]),
            (DoctorReviewPending, LabClosed) => EdgeRule::open(&[Role::Doctor]),
            _ => return None,
        };
        Some(rule)
    }

    fn is_terminal(self) -> bool {
        self == LabOrderStatus::LabClosed
    }
}
