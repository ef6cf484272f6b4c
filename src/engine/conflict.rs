use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// First active row of `user_id` overlapping `candidate`, on any desk in
/// the office. Released rows, rows missing a boundary, and the row named
/// by `exclude` are skipped.
pub fn find_user_conflict<'a>(
    book: &'a OfficeBook,
    user_id: Ulid,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    book.overlapping(candidate)
        .find(|r| r.user_id == user_id && r.is_active() && exclude != Some(r.id))
}

/// First active row on `desk_id` overlapping `candidate`, regardless of
/// who holds it. Same skip rules as [`find_user_conflict`].
pub fn find_desk_conflict<'a>(
    book: &'a OfficeBook,
    desk_id: Ulid,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    book.overlapping(candidate)
        .find(|r| r.desk_id == desk_id && r.is_active() && exclude != Some(r.id))
}

/// One desk per user, one user per desk: reject the candidate when the desk
/// is taken or the user already holds an overlapping reservation anywhere
/// in the office. Caller must hold the office book lock across this check
/// and the subsequent insert.
pub(super) fn check_exclusive(
    book: &OfficeBook,
    desk_id: Ulid,
    user_id: Ulid,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if let Some(hit) = find_desk_conflict(book, desk_id, candidate, exclude) {
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        return Err(EngineError::DeskConflict(hit.id));
    }
    if let Some(hit) = find_user_conflict(book, user_id, candidate, exclude) {
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        return Err(EngineError::UserConflict(hit.id));
    }
    Ok(())
}
