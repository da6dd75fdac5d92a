use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::{balance::ResourceKind, leave_request::RequestState};

/// Every failure the leave engine can report.
///
/// Business outcomes (`Validation`, `InsufficientBalance`, `NotFound`, `Forbidden`,
/// `AlreadyDecided`) are reported verbatim to the caller. `DataIntegrity` and `Storage`
/// are server faults and never leak details over HTTP.
#[derive(Debug, Display)]
pub enum LeaveError {
    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(
        fmt = "Insufficient {} balance. Available: {}, requested: {}",
        kind,
        available,
        requested
    )]
    InsufficientBalance {
        kind: ResourceKind,
        available: i32,
        requested: i32,
    },

    #[display(fmt = "{} not found", _0)]
    NotFound(String),

    #[display(fmt = "You are not allowed to access this resource")]
    Forbidden,

    #[display(fmt = "Leave request {} has already been {}", request_id, state)]
    AlreadyDecided { request_id: u64, state: RequestState },

    #[display(fmt = "Data integrity violation: {}", _0)]
    DataIntegrity(String),

    /// Lock conflict in the store; the whole unit was rolled back and may be retried.
    #[display(fmt = "Storage contention, retry the operation")]
    Contention,

    #[display(fmt = "Storage failure: {}", _0)]
    Storage(anyhow::Error),
}

impl std::error::Error for LeaveError {}

impl LeaveError {
    pub fn validation(message: impl Into<String>) -> Self {
        LeaveError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        LeaveError::NotFound(what.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        LeaveError::DataIntegrity(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaveError::Contention)
    }
}

impl ResponseError for LeaveError {
    fn status_code(&self) -> StatusCode {
        match self {
            LeaveError::Validation(_) | LeaveError::InsufficientBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            LeaveError::NotFound(_) => StatusCode::NOT_FOUND,
            LeaveError::Forbidden => StatusCode::FORBIDDEN,
            LeaveError::AlreadyDecided { .. } => StatusCode::CONFLICT,
            LeaveError::Contention => StatusCode::SERVICE_UNAVAILABLE,
            LeaveError::DataIntegrity(_) | LeaveError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            LeaveError::DataIntegrity(_) | LeaveError::Storage(_) => {
                tracing::error!(error = %self, "Leave operation failed");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
