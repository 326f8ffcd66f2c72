//! Infrastructure error taxonomy and the caller-facing result envelope.

use serde::Serialize;
use thiserror::Error;

use merchkit_core::DomainError;

/// Every failure a command or query can surface, keyed by `kind` for callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Command/query payload failed schema validation. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Target aggregate snapshot does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency check failed; caller may reload and retry.
    #[error("expected version {expected} but found version {found}")]
    ConcurrencyConflict { expected: u64, found: u64 },

    /// An aggregate rule rejected the mutation. Not retriable.
    #[error("{0}")]
    DomainRule(String),

    /// Batcher queue saturated; retriable after a delay.
    #[error("transaction batcher queue is full")]
    BackPressure,

    /// Physical commit or read failed; the whole logical transaction failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Outbox delivery failed; handled internally by retry/DLQ machinery.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Query envelope named a type the router does not know.
    #[error("unknown query type: {0}")]
    UnknownQueryType(String),
}

impl CoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// The stable error kind callers dispatch on.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationError",
            CoreError::NotFound(_) => "NotFound",
            CoreError::ConcurrencyConflict { .. } => "ConcurrencyConflict",
            CoreError::DomainRule(_) => "DomainRuleViolation",
            CoreError::BackPressure => "BackPressure",
            CoreError::Storage(_) => "StorageError",
            CoreError::Delivery(_) => "ExternalDeliveryError",
            CoreError::UnknownQueryType(_) => "UnknownQueryType",
        }
    }

    /// Whether a caller could reasonably retry the same request.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::BackPressure | CoreError::Storage(_) | CoreError::ConcurrencyConflict { .. }
        )
    }
}

impl From<DomainError> for CoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CoreError::Validation(msg),
            DomainError::RuleViolation(msg) => CoreError::DomainRule(msg),
            DomainError::InvalidId(msg) => CoreError::Validation(msg),
            DomainError::NotFound => CoreError::NotFound("aggregate not found".to_string()),
            DomainError::Conflict(msg) => CoreError::DomainRule(msg),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(value: sqlx::Error) -> Self {
        CoreError::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        CoreError::Storage(format!("serialisation failed: {value}"))
    }
}

/// Wire shape of an error: `{kind, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Caller-facing result envelope: `{ok: T}` or `{err: {kind, message}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResultEnvelope<T> {
    Ok { ok: T },
    Err { err: ErrorBody },
}

impl<T> ResultEnvelope<T> {
    pub fn from_result(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(value) => ResultEnvelope::Ok { ok: value },
            Err(e) => ResultEnvelope::Err { err: ErrorBody::from(&e) },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultEnvelope::Ok { .. })
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            ResultEnvelope::Ok { ok } => Some(ok),
            ResultEnvelope::Err { .. } => None,
        }
    }

    pub fn err(&self) -> Option<&ErrorBody> {
        match self {
            ResultEnvelope::Ok { .. } => None,
            ResultEnvelope::Err { err } => Some(err),
        }
    }
}
