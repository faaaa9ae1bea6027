//! # Error Handling
//!
//! Unified error handling for the Rolodink API. Every failure leaves the
//! service as an `application/problem+json` body carrying the request's
//! trace id.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::supabase::AuthProviderError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Field-level details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the request being served, or a short correlation id when
    /// called outside the trace middleware.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

/// Errors raised by the repositories, before they are mapped to HTTP.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Missing, or owned by somebody else.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("referenced row does not exist")]
    MissingReference,
    #[error(transparent)]
    Database(DbErr),
}

impl From<DbErr> for RepositoryError {
    fn from(error: DbErr) -> Self {
        match classify(&error) {
            Some(ConstraintKind::Unique) => {
                tracing::debug!(?error, "unique constraint violation");
                RepositoryError::Conflict("Resource already exists".to_string())
            }
            Some(ConstraintKind::ForeignKey) => {
                tracing::debug!(?error, "foreign key violation");
                RepositoryError::MissingReference
            }
            None => RepositoryError::Database(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    Unique,
    ForeignKey,
}

fn classify(error: &DbErr) -> Option<ConstraintKind> {
    const PG_UNIQUE: &str = "23505";
    const PG_FOREIGN_KEY: &str = "23503";
    const SQLITE_UNIQUE: &[&str] = &["1555", "2067"];
    const SQLITE_FOREIGN_KEY: &str = "787";

    match error.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => return Some(ConstraintKind::Unique),
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => return Some(ConstraintKind::ForeignKey),
        _ => {}
    }

    let runtime_err = match error {
        DbErr::Query(sea_orm::RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(sea_orm::RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };
    let code = runtime_err.as_database_error()?.code()?;
    let code = code.as_ref();

    if code == PG_UNIQUE || SQLITE_UNIQUE.contains(&code) {
        Some(ConstraintKind::Unique)
    } else if code == PG_FOREIGN_KEY || code == SQLITE_FOREIGN_KEY {
        Some(ConstraintKind::ForeignKey)
    } else {
        None
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => not_found(what),
            RepositoryError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            RepositoryError::MissingReference => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "Referenced record does not exist",
            ),
            RepositoryError::Database(error) => error.into(),
        }
    }
}

impl From<DbErr> for ApiError {
    fn from(error: DbErr) -> Self {
        if classify(&error).is_some() {
            return RepositoryError::from(error).into();
        }

        match error {
            DbErr::RecordNotFound(record) => {
                tracing::debug!(%record, "record not found");
                not_found("Record")
            }
            DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                internal_error()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);
        internal_error()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err.body_text()),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }
}

impl From<AuthProviderError> for ApiError {
    fn from(error: AuthProviderError) -> Self {
        match error {
            AuthProviderError::InvalidCredentials(message) => unauthorized(Some(&message)),
            AuthProviderError::Rejected { status, message } => {
                tracing::info!(status, %message, "auth provider rejected request");
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
            }
            other => {
                tracing::error!(error = %other, "auth provider unavailable");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "Authentication service unavailable",
                )
            }
        }
    }
}

/// 500 with a generic message; the cause is logged by the caller.
pub fn internal_error() -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        "An internal error occurred",
    )
}

/// 404 with the same wording for missing and foreign records.
pub fn not_found(what: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

pub fn rate_limited(retry_after: u64) -> ApiError {
    ApiError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "RATE_LIMITED",
        "Too many requests, please try again later",
    )
    .with_retry_after(retry_after)
}
