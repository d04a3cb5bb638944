//! API error handling.
//!
//! Maps `CatalogError` kinds onto HTTP status codes with a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mc_core::{CatalogError, CorrelationId};
use serde::Serialize;

/// Error wrapper carrying the request's correlation id.
#[derive(Debug)]
pub struct ApiError {
    pub error: CatalogError,
    pub correlation_id: CorrelationId,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(error: CatalogError, correlation_id: CorrelationId) -> Self {
        Self { error, correlation_id }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::Validation { .. } | CatalogError::UrnConstruction { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CatalogError::StoreConflict { .. } | CatalogError::DependencyViolation { .. } => {
                StatusCode::CONFLICT
            }
            CatalogError::StoreUnavailable { transient: true, .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CatalogError::StoreUnavailable { .. } => StatusCode::GATEWAY_TIMEOUT,
            CatalogError::RuleEvaluation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CatalogError::Registry(_) | CatalogError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
    correlation_id: CorrelationId,
    transient: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(correlation_id = %self.correlation_id, error = %self.error, "request failed");
        } else {
            tracing::debug!(correlation_id = %self.correlation_id, error = %self.error, "request rejected");
        }
        let body = ErrorBody {
            error: self.error.to_string(),
            kind: self.error.kind(),
            correlation_id: self.correlation_id,
            transient: self.error.is_transient(),
        };
        (status, Json(body)).into_response()
    }
}
