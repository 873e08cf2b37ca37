use serde::Serialize;
use ulid::Ulid;

use crate::model::ReservationStatus;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Coarse classification used by the API layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    LimitExceeded,
    UpstreamUnavailable,
}

#[derive(Debug)]
pub enum EngineError {
    Validation(Vec<FieldError>),
    TableNotFound(Ulid),
    ReservationNotFound(Ulid),
    TableNotFoundOrInactive(u32),
    TableUnavailable(u32),
    InvalidReservationTime(String),
    GuestCountExceedsCapacity { guest_count: u32, capacity: u32 },
    SchedulingConflict { table_number: u32, conflicting: Ulid },
    DuplicateTableNumber(u32),
    InvalidTransition { from: ReservationStatus, to: ReservationStatus },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::InvalidReservationTime(_) => ErrorKind::Validation,
            EngineError::TableNotFound(_) | EngineError::ReservationNotFound(_) => ErrorKind::NotFound,
            EngineError::TableNotFoundOrInactive(_)
            | EngineError::TableUnavailable(_)
            | EngineError::GuestCountExceedsCapacity { .. }
            | EngineError::SchedulingConflict { .. }
            | EngineError::DuplicateTableNumber(_)
            | EngineError::InvalidTransition { .. } => ErrorKind::Conflict,
            EngineError::LimitExceeded(_) => ErrorKind::LimitExceeded,
            EngineError::WalError(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Stable machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::TableNotFound(_) => "TABLE_NOT_FOUND",
            EngineError::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            EngineError::TableNotFoundOrInactive(_) => "TABLE_NOT_FOUND_OR_INACTIVE",
            EngineError::TableUnavailable(_) => "TABLE_UNAVAILABLE",
            EngineError::InvalidReservationTime(_) => "INVALID_RESERVATION_TIME",
            EngineError::GuestCountExceedsCapacity { .. } => "GUEST_COUNT_EXCEEDS_CAPACITY",
            EngineError::SchedulingConflict { .. } => "SCHEDULING_CONFLICT",
            EngineError::DuplicateTableNumber(_) => "DUPLICATE_TABLE_NUMBER",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::WalError(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation(vec![FieldError::new(field, message)])
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(errors) => {
                write!(f, "validation failed")?;
                for (i, e) in errors.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{} {}", e.field, e.message)?;
                }
                Ok(())
            }
            EngineError::TableNotFound(id) => write!(f, "table not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::TableNotFoundOrInactive(n) => {
                write!(f, "table {n} does not exist or is inactive")
            }
            EngineError::TableUnavailable(n) => write!(f, "table {n} is currently occupied"),
            EngineError::InvalidReservationTime(reason) => {
                write!(f, "invalid reservation time: {reason}")
            }
            EngineError::GuestCountExceedsCapacity { guest_count, capacity } => {
                write!(f, "{guest_count} guests exceed table capacity of {capacity}")
            }
            EngineError::SchedulingConflict { table_number, conflicting } => write!(
                f,
                "table {table_number} is already reserved within 2 hours of that time (reservation {conflicting})"
            ),
            EngineError::DuplicateTableNumber(n) => write!(f, "table number {n} already exists"),
            EngineError::InvalidTransition { from, to } => write!(
                f,
                "cannot change reservation status from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_lists_fields() {
        let err = EngineError::Validation(vec![
            FieldError::new("clientName", "is required"),
            FieldError::new("guestCount", "must be a positive integer"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: clientName is required; guestCount must be a positive integer"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn business_rejections_are_conflicts() {
        let id = Ulid::new();
        for err in [
            EngineError::TableUnavailable(1),
            EngineError::SchedulingConflict { table_number: 1, conflicting: id },
            EngineError::DuplicateTableNumber(1),
            EngineError::GuestCountExceedsCapacity { guest_count: 9, capacity: 4 },
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
        }
        assert_eq!(EngineError::WalError("closed".into()).kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(EngineError::ReservationNotFound(id).kind(), ErrorKind::NotFound);
    }
}
