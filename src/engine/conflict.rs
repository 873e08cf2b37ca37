use ulid::Ulid;

use crate::model::*;

use super::store::{Collection, Filter, Sort};
use super::{Engine, EngineError};

/// Two active reservations on one table must be more than this far apart.
pub const CONFLICT_WINDOW_MS: Ms = 2 * 3_600_000;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// `|a - b| <= 2h`, inclusive at both ends.
pub fn within_window(a: Ms, b: Ms) -> bool {
    a.abs_diff(b) <= CONFLICT_WINDOW_MS as u64
}

pub(crate) fn validate_time(t: Ms) -> Result<(), EngineError> {
    use crate::limits::*;
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(EngineError::InvalidReservationTime("timestamp out of range".into()));
    }
    Ok(())
}

/// Active reservations for a table, optionally skipping one (the reservation
/// being edited).
pub(crate) fn active_filter(table_number: u32, exclude: Option<Ulid>) -> Filter {
    let f = Filter::new()
        .eq("tableNumber", table_number)
        .is_in("status", ReservationStatus::ACTIVE.map(|s| s.as_str()));
    match exclude {
        Some(id) => f.ne("id", id),
        None => f,
    }
}

/// Earliest active reservation on `table_number` within the window around
/// `proposed`.
pub(crate) fn find_conflict(
    reservations: &Collection<Reservation>,
    table_number: u32,
    proposed: Ms,
    exclude: Option<Ulid>,
) -> Option<Reservation> {
    let filter = active_filter(table_number, exclude)
        .gte("reservationTime", proposed.saturating_sub(CONFLICT_WINDOW_MS))
        .lte("reservationTime", proposed.saturating_add(CONFLICT_WINDOW_MS));
    reservations
        .find(&filter, Some(Sort::asc("reservationTime")))
        .into_iter()
        .next()
}

pub(crate) fn check_no_conflict(
    reservations: &Collection<Reservation>,
    table_number: u32,
    proposed: Ms,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(reservations, table_number, proposed, exclude) {
        Some(existing) => Err(EngineError::SchedulingConflict {
            table_number,
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

impl Engine {
    /// True iff an active reservation on the table lies within ±2h of `proposed`.
    pub fn has_conflict(&self, table_number: u32, proposed: Ms) -> bool {
        find_conflict(&self.reservations, table_number, proposed, None).is_some()
    }
}
