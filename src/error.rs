//! Error taxonomy
//! Mission: one error type for the whole trading core, one wire shape for every failure.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::risk::RiskFactor;

/// Every error the core can surface, tagged with the taxonomy from the error design.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ValidationFields(String, Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Precondition(&'static str, String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{reason}")]
    RuleBlock {
        reason: String,
        factors: Vec<RiskFactor>,
    },

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    factors: Option<Vec<RiskFactor>>,
    #[serde(rename = "correlationId")]
    correlation_id: String,
}

impl AppError {
    pub fn precondition(code: &'static str, detail: impl Into<String>) -> Self {
        AppError::Precondition(code, detail.into())
    }

    /// Engine layers (negotiation, trade) return `anyhow::Result` and signal
    /// domain failures by `bail!`-ing an `AppError`. Recover the original
    /// variant instead of flattening every failure into a 500.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app_err) => app_err,
            Err(err) => AppError::Internal(err),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::ValidationFields(_, _) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Authorization(_) => "authorization",
            AppError::NotFound(_) => "not_found",
            AppError::Precondition(code, _) => code,
            AppError::RateLimited { .. } => "rate_limited",
            AppError::RuleBlock { .. } => "rule_block",
            AppError::DependencyUnavailable(_) => "dependency_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::ValidationFields(_, _) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Precondition(_, _) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::RuleBlock { .. } => StatusCode::BAD_REQUEST,
            AppError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status();

        if matches!(self, AppError::Internal(_)) {
            tracing::error!(correlation_id = %correlation_id, error = %self, "internal error");
        }

        let (fields, factors) = match &self {
            AppError::ValidationFields(_, fields) => (Some(fields.clone()), None),
            AppError::RuleBlock { factors, .. } => (None, Some(factors.clone())),
            _ => (None, None),
        };

        let detail = if matches!(self, AppError::Internal(_)) {
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: self.code(),
            detail,
            fields,
            factors,
            correlation_id,
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
