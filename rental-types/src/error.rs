//! Error types for the booking service.

use crate::domain::{BookingStatus, EventKind, VehicleId};

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Cannot apply {event} to a booking in status {from}")]
    InvalidTransition { from: BookingStatus, event: EventKind },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Amount mismatch: expected {expected}, got {got}")]
    AmountMismatch { expected: i64, got: i64 },

    #[error("Vehicle {0} is not available")]
    VehicleUnavailable(VehicleId),

    #[error("The vehicle is already booked for an overlapping period")]
    OverlappingBooking,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// The booking changed since it was read; the write was not applied.
    #[error("Booking was modified concurrently")]
    VersionConflict,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Payment gateway protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid gateway signature")]
    InvalidSignature,

    #[error("Missing gateway field: {0}")]
    MissingField(&'static str),

    #[error("Invalid gateway field {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Gateway configuration error: {0}")]
    Config(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Precondition and conflict kinds raised by the state machine.
    #[error(transparent)]
    Rejected(DomainError),

    /// Lost an optimistic-concurrency race even after retrying.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            DomainError::NegativeAmount => AppError::BadRequest(err.to_string()),
            other => AppError::Rejected(other),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::VersionConflict => AppError::Conflict(err.to_string()),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature => AppError::InvalidSignature,
            GatewayError::MissingField(_) | GatewayError::InvalidField { .. } => {
                AppError::BadRequest(err.to_string())
            }
            GatewayError::Config(msg) => AppError::Gateway(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err: AppError = DomainError::ValidationError("bad window".into()).into();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "bad window"));
    }

    #[test]
    fn test_transition_errors_stay_typed() {
        let err: AppError = RepoError::Domain(DomainError::InvalidTransition {
            from: BookingStatus::Completed,
            event: EventKind::RenterConfirmsReceipt,
        })
        .into();
        assert!(matches!(
            err,
            AppError::Rejected(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_version_conflict_maps_to_conflict() {
        let err: AppError = RepoError::VersionConflict.into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
