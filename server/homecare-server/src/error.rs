use audit_engine::AuditError;
use auth_identity::IdentityError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use database_layer::DatabaseError;
use error_common::{codes, log_error, ErrorContext, Severity};
use events_bus::BusError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;
use workflow_engine::{Violation, WorkflowError};

/// Standard API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Taxonomy code, e.g. `invalid_transition`
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Every violation of a rejected submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Standard API success response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Helper function to create successful API responses
pub fn api_success<T>(data: T) -> ApiResponse<T> {
    ApiResponse { success: true, data }
}

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Realtime(#[from] BusError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::StorageError(message) => ApiError::Internal { message },
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl ApiError {
    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::Workflow(WorkflowError::NotFound { entity, id })
    }

    /// Taxonomy code, also used as `error_type` in the body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Workflow(err) => err.code(),
            ApiError::Realtime(err) => err.code(),
            ApiError::Identity(err) => err.code(),
            ApiError::Database(err) => err.code(),
            ApiError::Authentication { .. } => codes::authentication::INVALID_TOKEN,
            ApiError::BadRequest { .. } => codes::validation::INVALID_INPUT,
            ApiError::Internal { .. } => codes::system::INTERNAL,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ApiError::Database(err) if err.is_fatal() => Severity::Fatal,
            ApiError::Realtime(
                BusError::MembershipLookup(_) | BusError::WindowStore(_) | BusError::Backplane(_),
            )
            | ApiError::Identity(IdentityError::MissingSecret | IdentityError::InvalidTokenTtl(_))
            | ApiError::Internal { .. } => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        if self.severity() == Severity::Fatal {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        status_for_code(self.code())
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Workflow(WorkflowError::DomainGuardFailed { reason, .. }) => {
                Some(json!({ "reason": reason }))
            }
            ApiError::Workflow(WorkflowError::IncompleteChecklist { missing }) => Some(json!({
                "missing": missing.iter().map(|item| item.as_str()).collect::<Vec<_>>()
            })),
            ApiError::Workflow(WorkflowError::InvalidTransition { from, to })
            | ApiError::Workflow(WorkflowError::UnauthorizedRole { from, to, .. }) => {
                Some(json!({ "from": from, "to": to }))
            }
            ApiError::Realtime(BusError::RateLimited { retry_after }) => {
                Some(json!({ "retryAfterMs": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX) }))
            }
            _ => None,
        }
    }

    /// Case or entity the failure is about, when the error names one
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            ApiError::Workflow(
                WorkflowError::NotAParticipant { case_id }
                | WorkflowError::DuplicateSubmission { case_id, .. },
            )
            | ApiError::Realtime(BusError::NotAParticipant { case_id }) => Some(*case_id),
            ApiError::Workflow(WorkflowError::NotFound { id, .. }) => Some(*id),
            _ => None,
        }
    }

    /// Logging context keyed by the `error_id` returned to the caller
    pub fn log_context(&self, error_id: &str) -> ErrorContext {
        let context = ErrorContext::new().with_request_id(error_id);
        match self.entity_id() {
            Some(id) => context.with_entity_id(id.to_string()),
            None => context,
        }
    }

    /// Render the JSON body, hiding the cause of fatal errors
    pub fn to_response_body(&self) -> ApiErrorResponse {
        let fatal = self.severity() == Severity::Fatal;
        let violations = match self {
            ApiError::Workflow(WorkflowError::ValidationFailed(violations)) => Some(violations.clone()),
            _ => None,
        };

        ApiErrorResponse {
            error_id: Uuid::new_v4().to_string(),
            error_type: if fatal { codes::system::INTERNAL } else { self.code() }.to_string(),
            message: if fatal {
                "Internal server error".to_string()
            } else {
                self.to_string()
            },
            details: if fatal { None } else { self.details() },
            violations,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Status per taxonomy entry
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        codes::workflow::INVALID_TRANSITION
        | codes::workflow::DOMAIN_GUARD_FAILED
        | codes::workflow::LAB_PENDING
        | codes::workflow::DUPLICATE_SUBMISSION => StatusCode::CONFLICT,
        codes::workflow::UNAUTHORIZED_ROLE
        | codes::authorization::NOT_A_PARTICIPANT
        | codes::authorization::ACCESS_DENIED => StatusCode::FORBIDDEN,
        codes::validation::VALIDATION_FAILED
        | codes::workflow::INCOMPLETE_CHECKLIST
        | codes::validation::UNKNOWN_SERVICE_TYPE => StatusCode::UNPROCESSABLE_ENTITY,
        codes::validation::INVALID_INPUT => StatusCode::BAD_REQUEST,
        codes::realtime::RATE_LIMITED => StatusCode::TOO_MANY_REQUESTS,
        codes::resource::NOT_FOUND => StatusCode::NOT_FOUND,
        codes::authentication::INVALID_TOKEN | codes::authentication::TOKEN_EXPIRED => {
            StatusCode::UNAUTHORIZED
        }
        codes::realtime::CONNECTION_CLOSED => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let body = self.to_response_body();
        let context = self
            .log_context(&body.error_id)
            .add_context("status_code", status_code.as_u16().to_string());
        log_error(&self, self.code(), self.severity(), &context);

        (status_code, Json(body)).into_response()
    }
}

/// Startup failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Realtime(#[from] BusError),
}
