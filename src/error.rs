use crate::models::child::Gender;
use crate::models::subscription::QuotaAction;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Coarse error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Validation,
    InternalInconsistency,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::InternalInconsistency => "INTERNAL_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum GrowthError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("tier limit exceeded: {used}/{limit} {action} actions used in window ending {window_end}")]
    QuotaExceeded {
        action: QuotaAction,
        used: u32,
        limit: u32,
        window_end: DateTime<Utc>,
    },

    #[error("subscription expired at {0}")]
    SubscriptionExpired(DateTime<Utc>),

    #[error("Validation error: {}", summarize_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("subscription cross-check failed: {0}")]
    SubscriptionMismatch(String),

    #[error("inconsistent subscription record: {0}")]
    TierInconsistent(String),

    #[error("missing reference row for {metric} ({gender}) at {key}")]
    MissingReference {
        metric: String,
        gender: Gender,
        key: String,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl GrowthError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        GrowthError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        GrowthError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GrowthError::NotFound { .. } => ErrorKind::NotFound,
            GrowthError::Conflict(_) => ErrorKind::Conflict,
            GrowthError::Forbidden(_)
            | GrowthError::QuotaExceeded { .. }
            | GrowthError::SubscriptionExpired(_) => ErrorKind::Forbidden,
            GrowthError::Validation(_) => ErrorKind::Validation,
            GrowthError::SubscriptionMismatch(_)
            | GrowthError::TierInconsistent(_)
            | GrowthError::MissingReference { .. }
            | GrowthError::Store(_) => ErrorKind::InternalInconsistency,
        }
    }

    /// Caller-facing shape. Internal errors are logged here and their text withheld.
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        let (error, details) = match self {
            GrowthError::Validation(fields) => ("Validation failed".to_string(), fields.clone()),
            GrowthError::NotFound { entity, key } => (
                format!("{entity} not found"),
                vec![FieldError::new(*entity, format!("no {entity} with id '{key}'"))],
            ),
            GrowthError::QuotaExceeded { .. } => ("tier limit exceeded".to_string(), Vec::new()),
            _ if kind == ErrorKind::InternalInconsistency => return ErrorResponse::internal(self),
            _ => (self.to_string(), Vec::new()),
        };

        ErrorResponse {
            code: kind.code().to_string(),
            error,
            details,
        }
    }
}

impl From<StoreError> for GrowthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) => GrowthError::Conflict(msg),
            other => GrowthError::Store(other),
        }
    }
}

/// Error body returned by the async commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ErrorResponse {
    /// Logs `context` and returns a body that does not reveal it.
    pub fn internal(context: impl std::fmt::Display) -> Self {
        log::error!("internal error: {context}");
        ErrorResponse {
            code: ErrorKind::InternalInconsistency.code().to_string(),
            error: "internal error".to_string(),
            details: Vec::new(),
        }
    }
}

impl From<GrowthError> for ErrorResponse {
    fn from(err: GrowthError) -> Self {
        err.to_response()
    }
}

fn summarize_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
