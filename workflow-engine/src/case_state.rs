// Case state machine
use std::fmt;
use std::str::FromStr;

use auth_identity::Role;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::state_machine::{EdgeRule, Guard, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    PendingNurseAssignment,
    NurseAssigned,
    NurseOnTheWay,
    VitalsRecorded,
    AwaitingDoctorReview,
    DoctorCompleted,
    Completed,
    Cancelled,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::PendingNurseAssignment => "pending_nurse_assignment",
            CaseStatus::NurseAssigned => "nurse_assigned",
            CaseStatus::NurseOnTheWay => "nurse_on_the_way",
            CaseStatus::VitalsRecorded => "vitals_recorded",
            CaseStatus::AwaitingDoctorReview => "awaiting_doctor_review",
            CaseStatus::DoctorCompleted => "doctor_completed",
            CaseStatus::Completed => "completed",
            CaseStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <CaseStatus as StateMachine>::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("unknown case status: {s}")))
    }
}

const ADMIN: &[Role] = &[Role::Admin];
const NURSE: &[Role] = &[Role::Nurse];
const DOCTOR: &[Role] = &[Role::Doctor];
const NURSE_OR_ADMIN: &[Role] = &[Role::Nurse, Role::Admin];
const DOCTOR_OR_ADMIN: &[Role] = &[Role::Doctor, Role::Admin];
const PATIENT_OR_ADMIN: &[Role] = &[Role::Patient, Role::Admin];

impl StateMachine for CaseStatus {
    const ALL: &'static [Self] = &[
        CaseStatus::PendingNurseAssignment,
        CaseStatus::NurseAssigned,
        CaseStatus::NurseOnTheWay,
        CaseStatus::VitalsRecorded,
        CaseStatus::AwaitingDoctorReview,
        CaseStatus::DoctorCompleted,
        CaseStatus::Completed,
        CaseStatus::Cancelled,
    ];

    fn edge(self, to: Self) -> Option<EdgeRule> {
        use CaseStatus::*;

        let rule = match (self, to) {
            (PendingNurseAssignment, NurseAssigned) => EdgeRule::open(NURSE_OR_ADMIN),
            (NurseAssigned, NurseOnTheWay) => EdgeRule::open(NURSE),
            (NurseOnTheWay, VitalsRecorded) => EdgeRule::open(NURSE),
            (VitalsRecorded, AwaitingDoctorReview) => EdgeRule::open(NURSE_OR_ADMIN),
            (AwaitingDoctorReview, DoctorCompleted) => EdgeRule::open(DOCTOR).with_auto_close(NURSE),
            (DoctorCompleted, Completed) => EdgeRule::guarded(DOCTOR_OR_ADMIN, Guard::NoOpenLabOrders),
            (PendingNurseAssignment | NurseAssigned, Cancelled) => EdgeRule::open(PATIENT_OR_ADMIN),
            (NurseOnTheWay | VitalsRecorded | AwaitingDoctorReview | DoctorCompleted, Cancelled) => {
                EdgeRule::open(ADMIN)
            }
            _ => return None,
        };
        Some(rule)
    }

    fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{attempt_transition, GuardContext};
    use proptest::prelude::*;

    fn status() -> impl Strategy<Value = CaseStatus> {
        prop::sample::select(<CaseStatus as StateMachine>::ALL.to_vec())
    }

    fn role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn missing_edges_reject_every_role(from in status(), to in status(), role in role()) {
            prop_assume!(from.edge(to).is_none());
            let err = attempt_transition(from, to, role, &GuardContext::default().auto_close()).unwrap_err();
            prop_assert_eq!(err.code(), "invalid_transition");
        }

        #[test]
        fn roles_outside_the_table_are_rejected(from in status(), to in status(), role in role()) {
            let Some(rule) = from.edge(to) else { return Ok(()); };
            let result = attempt_transition(from, to, role, &GuardContext::default());
            if rule.roles.contains(&role) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result.unwrap_err().code(), "unauthorized_role");
            }
        }

        #[test]
        fn open_lab_orders_block_completion_after_role_check(role in role(), open in 1usize..5) {
            let ctx = GuardContext::default().with_open_lab_orders(open);
            let err = attempt_transition(CaseStatus::DoctorCompleted, CaseStatus::Completed, role, &ctx).unwrap_err();
            let expected = if matches!(role, Role::Doctor | Role::Admin) {
                "domain_guard_failed"
            } else {
                "unauthorized_role"
            };
            prop_assert_eq!(err.code(), expected);
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for &from in <CaseStatus as StateMachine>::ALL {
            if from.is_terminal() {
                for &to in <CaseStatus as StateMachine>::ALL {
                    assert!(from.edge(to).is_none(), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn test_admin_can_cancel_every_open_case() {
        for &from in <CaseStatus as StateMachine>::ALL {
            if !from.is_terminal() {
                assert!(
                    attempt_transition(from, CaseStatus::Cancelled, Role::Admin, &GuardContext::default()).is_ok(),
                    "admin cancel from {from}"
                );
            }
        }
    }

    #[test]
    fn test_patient_may_only_cancel_early() {
        let ctx = GuardContext::default();
        assert!(attempt_transition(CaseStatus::NurseAssigned, CaseStatus::Cancelled, Role::Patient, &ctx).is_ok());
        let err = attempt_transition(CaseStatus::NurseOnTheWay, CaseStatus::Cancelled, Role::Patient, &ctx)
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized_role");
    }

    #[test]
    fn test_nurse_closes_review_only_with_auto_close() {
        let err = attempt_transition(
            CaseStatus::AwaitingDoctorReview,
            CaseStatus::DoctorCompleted,
            Role::Nurse,
            &GuardContext::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "unauthorized_role");

        assert!(attempt_transition(
            CaseStatus::AwaitingDoctorReview,
            CaseStatus::DoctorCompleted,
            Role::Nurse,
            &GuardContext::default().auto_close(),
        )
        .is_ok());
    }

    #[test]
    fn test_completion_with_closed_labs() {
        let ctx = GuardContext::default().with_open_lab_orders(0);
        assert!(attempt_transition(CaseStatus::DoctorCompleted, CaseStatus::Completed, Role::Doctor, &ctx).is_ok());
        let err = attempt_transition(
            CaseStatus::DoctorCompleted,
            CaseStatus::Completed,
            Role::Admin,
            &GuardContext::default().with_open_lab_orders(1),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::DomainGuardFailed { reason: "lab_pending", .. }));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("doctor_completed".parse::<CaseStatus>().unwrap(), CaseStatus::DoctorCompleted);
        assert!("awaiting_doctor_approval".parse::<CaseStatus>().is_err());
    }
}
