//! Civil-day and clock-time resolution against IANA time zones.
//!
//! Interval arithmetic everywhere else runs on plain unix milliseconds; this
//! module is the only place local dates and zone offsets are interpreted.

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::{DAY_MS, MINUTE_MS, Ms, Span};

pub const MINUTES_PER_DAY: i64 = 1440;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    UnknownTimezone(String),
    /// The requested local time does not exist in the zone and no later
    /// time on the same civil day does either (a skipped calendar day).
    UnresolvableLocalTime { day: NaiveDate, zone: String },
    InstantOutOfRange(Ms),
    InvalidClockTime { hour: u32, minute: u32 },
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::UnknownTimezone(name) => write!(f, "unknown IANA timezone: {name}"),
            CalendarError::UnresolvableLocalTime { day, zone } => {
                write!(f, "no resolvable local time on {day} in {zone}")
            }
            CalendarError::InstantOutOfRange(ms) => {
                write!(f, "instant {ms}ms is outside the representable range")
            }
            CalendarError::InvalidClockTime { hour, minute } => {
                write!(f, "invalid clock time {hour:02}:{minute:02}")
            }
        }
    }
}

impl std::error::Error for CalendarError {}

/// Parse an IANA zone name as captured on offices and reservations.
pub fn parse_timezone(name: &str) -> Result<Tz, CalendarError> {
    name.parse::<Tz>()
        .map_err(|_| CalendarError::UnknownTimezone(name.to_string()))
}

/// Resolve a local wall-clock time on a civil day to an absolute instant.
///
/// Gap handling follows the usual forward-shift convention: a time skipped
/// by a DST transition resolves to the first valid time after the gap, and
/// an ambiguous (repeated) time resolves to its earlier occurrence.
fn resolve_local(day: NaiveDate, time: NaiveTime, tz: &Tz) -> Result<DateTime<Tz>, CalendarError> {
    let naive = day.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earlier, _) => Ok(earlier),
        LocalResult::None => {
            // Probe forward in 15-minute steps until the gap ends. Only a
            // zone that skipped the entire calendar day exhausts the loop.
            let mut probe = naive + Duration::minutes(15);
            while probe.date() == day {
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return Ok(dt);
                }
                probe += Duration::minutes(15);
            }
            Err(CalendarError::UnresolvableLocalTime {
                day,
                zone: tz.name().to_string(),
            })
        }
    }
}

/// Resolve local `hour:minute` on `day` to unix milliseconds.
pub fn local_instant(day: NaiveDate, hour: u32, minute: u32, tz: &Tz) -> Result<Ms, CalendarError> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or(CalendarError::InvalidClockTime { hour, minute })?;
    Ok(resolve_local(day, time, tz)?.timestamp_millis())
}

/// The absolute window of one civil day: local midnight resolved in `tz`
/// (DST-correct for that specific date), then a flat 24 hours.
pub fn day_window(day: NaiveDate, tz: &Tz) -> Result<Span, CalendarError> {
    let start = resolve_local(day, NaiveTime::MIN, tz)?.timestamp_millis();
    Ok(Span::new(start, start + DAY_MS))
}

/// `day_start + hour` whole hours. Callers validate `hour <= 24`.
pub fn hour_to_instant(day_start: Ms, hour: u32) -> Ms {
    day_start + Ms::from(hour) * crate::model::HOUR_MS
}

/// Whole minutes from the window start, clamped to `[0, 1440]` so instants
/// outside the day still land on a display boundary.
pub fn clamp_to_day(instant: Ms, window: &Span) -> i64 {
    ((instant - window.start) / MINUTE_MS).clamp(0, MINUTES_PER_DAY)
}

/// The civil date `instant` falls on in `tz`.
pub fn civil_day_of(instant: Ms, tz: &Tz) -> Result<NaiveDate, CalendarError> {
    let utc = DateTime::<Utc>::from_timestamp_millis(instant)
        .ok_or(CalendarError::InstantOutOfRange(instant))?;
    Ok(utc.with_timezone(tz).date_naive())
}

/// True when `instant` falls on `day` as observed in `tz`.
pub fn is_on_civil_day(instant: Ms, day: NaiveDate, tz: &Tz) -> Result<bool, CalendarError> {
    Ok(civil_day_of(instant, tz)? == day)
}
