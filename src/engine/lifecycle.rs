use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::calendar::{CalendarError, is_on_civil_day, local_instant};
use crate::model::{MINUTE_MS, Ms, Reservation, ReservationStatus};

use super::EngineError;

/// Grace period granted after the nominal check-in point.
pub const CHECK_IN_GRACE_MS: Ms = 15 * MINUTE_MS;

/// Local hour at which whole-day reservations must be claimed.
pub const WHOLE_DAY_CHECK_IN_HOUR: u32 = 9;

/// Deadline by which a reservation must be checked in before the sweep
/// releases it.
///
/// Whole-day rows default to 09:00 office-local on the reservation day;
/// hourly rows get the start instant plus the grace period. When the
/// booking happens on the reservation day itself and that nominal point is
/// already behind `now`, the deadline moves to `now` plus the grace period,
/// so a late booking is never born expired. Bookings for future days keep
/// the nominal deadline untouched.
pub(super) fn compute_check_in_deadline(
    whole_day: bool,
    day: NaiveDate,
    start_at: Ms,
    tz: &Tz,
    now: Ms,
) -> Result<Ms, CalendarError> {
    let base = if whole_day {
        local_instant(day, WHOLE_DAY_CHECK_IN_HOUR, 0, tz)?
    } else {
        start_at + CHECK_IN_GRACE_MS
    };
    if now > base && is_on_civil_day(now, day, tz)? {
        return Ok(now + CHECK_IN_GRACE_MS);
    }
    Ok(base)
}

/// Gate a check-in attempt against the stored row.
///
/// `Ok(true)` means the row is already checked in and the call is a no-op.
/// `Ok(false)` means the transition may proceed. The caller has already
/// matched the row to the requesting user.
pub(super) fn check_in_gate(r: &Reservation, now: Ms, tz: &Tz) -> Result<bool, EngineError> {
    match r.status {
        ReservationStatus::CheckedIn => return Ok(true),
        ReservationStatus::Released => {
            return Err(EngineError::Forbidden("reservation was released"));
        }
        ReservationStatus::Booked => {}
    }
    let deadline = r
        .check_in_deadline
        .ok_or_else(|| EngineError::BadRequest("reservation has no check-in deadline".into()))?;
    if now > deadline {
        return Err(EngineError::Forbidden("check-in deadline has passed"));
    }
    if !is_on_civil_day(now, r.day, tz)? {
        return Err(EngineError::Forbidden(
            "check-in is only allowed on the reservation day",
        ));
    }
    Ok(false)
}
