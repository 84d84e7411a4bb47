use auth_identity::Role;
use error_common::codes;
use thiserror::Error;
use uuid::Uuid;

use crate::checklist::ChecklistItem;
use crate::validation::Violation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("No transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Role {role} may not move {from} to {to}")]
    UnauthorizedRole { role: Role, from: String, to: String },

    #[error("{message}")]
    DomainGuardFailed { reason: &'static str, message: String },

    #[error("Submission failed validation with {} violation(s)", .0.len())]
    ValidationFailed(Vec<Violation>),

    #[error("Sample collection checklist incomplete: {}", missing_list(.missing))]
    IncompleteChecklist { missing: Vec<ChecklistItem> },

    #[error("{entity} already exists for case {case_id}")]
    DuplicateSubmission { entity: &'static str, case_id: Uuid },

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("Not a participant of case {case_id}")]
    NotAParticipant { case_id: Uuid },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn missing_list(missing: &[ChecklistItem]) -> String {
    missing
        .iter()
        .map(|item| item.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidTransition { .. } => codes::workflow::INVALID_TRANSITION,
            WorkflowError::UnauthorizedRole { .. } => codes::workflow::UNAUTHORIZED_ROLE,
            WorkflowError::DomainGuardFailed { .. } => codes::workflow::DOMAIN_GUARD_FAILED,
            WorkflowError::ValidationFailed(_) => codes::validation::VALIDATION_FAILED,
            WorkflowError::IncompleteChecklist { .. } => codes::workflow::INCOMPLETE_CHECKLIST,
            WorkflowError::DuplicateSubmission { .. } => codes::workflow::DUPLICATE_SUBMISSION,
            WorkflowError::UnknownServiceType(_) => codes::validation::UNKNOWN_SERVICE_TYPE,
            WorkflowError::NotAParticipant { .. } => codes::authorization::NOT_A_PARTICIPANT,
            WorkflowError::AccessDenied(_) => codes::authorization::ACCESS_DENIED,
            WorkflowError::NotFound { .. } => codes::resource::NOT_FOUND,
            WorkflowError::InvalidInput(_) => codes::validation::INVALID_INPUT,
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        WorkflowError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
