//! Per-request failures and the statuses they map to

use crate::http::{HttpError, HttpResponse, StatusCode};
use crate::security::{SecurityDecision, TraversalKind};

/// Dispatch result type
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Everything that can go wrong while answering a single request
///
/// None of these ever escape the connection handler; each becomes a response
/// on the same connection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Bad request: {0}")]
    Protocol(String),
    #[error("Path traversal detected: {0}")]
    PathTraversal(TraversalKind),
    #[error("Host header does not match this server")]
    HostMismatch,
    #[error("Missing Host header")]
    HostMissing,
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid JSON: {0}")]
    Payload(String),
    #[error("Server busy, retry in {retry_after_secs}s")]
    Capacity { retry_after_secs: u64 },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DispatchError {
    /// Status code sent for this error
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Protocol(_) | DispatchError::HostMissing | DispatchError::Payload(_) => {
                StatusCode::BadRequest
            }
            DispatchError::PathTraversal(_) | DispatchError::HostMismatch => StatusCode::Forbidden,
            DispatchError::UnsupportedMedia(_) => StatusCode::UnsupportedMediaType,
            DispatchError::NotFound(_) => StatusCode::NotFound,
            DispatchError::Capacity { .. } => StatusCode::ServiceUnavailable,
            DispatchError::Storage(_) => StatusCode::InternalServerError,
        }
    }

    /// Whether the connection must be closed after the error response
    ///
    /// Protocol and security failures end the connection; 404, 415 and bad
    /// payloads leave it open for the next request.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            DispatchError::Protocol(_)
                | DispatchError::PathTraversal(_)
                | DispatchError::HostMismatch
                | DispatchError::HostMissing
                | DispatchError::Capacity { .. }
        )
    }

    /// Map a rejecting security decision to its error; `None` for `Allow`
    pub fn from_decision(decision: &SecurityDecision) -> Option<Self> {
        match decision {
            SecurityDecision::Allow { .. } => None,
            SecurityDecision::RejectPathTraversal(kind) => Some(DispatchError::PathTraversal(*kind)),
            SecurityDecision::RejectHostMismatch => Some(DispatchError::HostMismatch),
            SecurityDecision::RejectHostMissing => Some(DispatchError::HostMissing),
        }
    }

    /// Build the error response
    pub fn to_response(&self) -> HttpResponse {
        let detail = match self {
            DispatchError::PathTraversal(_) => "Path traversal detected".to_string(),
            DispatchError::HostMismatch => "Host header does not match this server".to_string(),
            DispatchError::HostMissing => "Missing Host header".to_string(),
            DispatchError::Storage(_) => "Could not complete the request".to_string(),
            DispatchError::Capacity { retry_after_secs } => {
                return HttpResponse::service_unavailable(*retry_after_secs);
            }
            other => other.to_string(),
        };

        let response = HttpResponse::error(self.status(), &detail);
        if self.closes_connection() {
            response.closing()
        } else {
            response
        }
    }
}

impl From<HttpError> for DispatchError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::UnsupportedMethod(method) => {
                DispatchError::Protocol(format!("Method {} not supported", method))
            }
            other => DispatchError::Protocol(other.to_string()),
        }
    }
}
