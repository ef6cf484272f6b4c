use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix epoch milliseconds, the engine's only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Intersect with `window`; `None` when nothing remains.
    pub fn clip(&self, window: &Span) -> Option<Span> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        if start < end { Some(Span { start, end }) } else { None }
    }
}

/// Reservation lifecycle. `CheckedIn` and `Released` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Booked,
    CheckedIn,
    Released,
}

/// One claim on one desk for one user, confined to a single civil day.
///
/// Rows written by this engine always carry both boundaries; imported rows
/// may lack one, and every scan tolerates that by skipping the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub office_id: Ulid,
    pub desk_id: Ulid,
    pub user_id: Ulid,
    /// Office-local date the reservation belongs to.
    pub day: NaiveDate,
    pub start_at: Option<Ms>,
    pub end_at: Option<Ms>,
    /// Intent marker, redundant with the span covering the full day window.
    pub whole_day: bool,
    /// IANA zone captured at creation, used for deadline and day math later.
    pub timezone: String,
    pub status: ReservationStatus,
    pub check_in_deadline: Option<Ms>,
    pub checked_in_at: Option<Ms>,
    pub auto_released_at: Option<Ms>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Released
    }

    /// Both boundaries, or `None` for a malformed row.
    pub fn span(&self) -> Option<Span> {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) if start < end => Some(Span { start, end }),
            _ => None,
        }
    }

    fn sort_key(&self) -> Ms {
        self.start_at.unwrap_or(Ms::MIN)
    }
}

/// Requested shape of a booking within the day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingInterval {
    WholeDay,
    /// Whole hours from day start, `0 <= start_hour < end_hour <= 24`.
    Hours { start_hour: u32, end_hour: u32 },
}

/// Admin edit: unset fields keep the stored value.
#[derive(Debug, Clone, Default)]
pub struct ReservationPatch {
    pub desk_id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub day: Option<NaiveDate>,
    pub interval: Option<BookingInterval>,
}

/// All reservations of one office, sorted by start instant. Rows missing a
/// start sort first so a windowed scan still visits them.
#[derive(Debug, Clone, Default)]
pub struct OfficeBook {
    pub reservations: Vec<Reservation>,
}

impl OfficeBook {
    /// Insert maintaining sort order by start instant.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.sort_key(), |r| r.sort_key())
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose span overlaps the query window. Uses binary search
    /// to skip rows starting at or after `query.end`; rows with no span are
    /// inside the scanned prefix and get filtered out.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.sort_key() < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span().is_some_and(|s| s.overlaps(query)))
    }
}

/// The event types, flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Booked {
        reservation: Reservation,
    },
    /// Full-row replacement from an admin edit.
    Edited {
        reservation: Reservation,
    },
    CheckedIn {
        office_id: Ulid,
        id: Ulid,
        at: Ms,
    },
    Released {
        office_id: Ulid,
        id: Ulid,
        at: Ms,
    },
    Cancelled {
        office_id: Ulid,
        id: Ulid,
    },
}

impl Event {
    pub fn office_id(&self) -> Ulid {
        match self {
            Event::Booked { reservation } | Event::Edited { reservation } => reservation.office_id,
            Event::CheckedIn { office_id, .. }
            | Event::Released { office_id, .. }
            | Event::Cancelled { office_id, .. } => *office_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Display data for the user occupying a used period, resolved from the
/// directory on every query. Absent fields mean the directory had no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub user_id: Ulid,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedPeriod {
    pub span: Span,
    pub reservation_id: Ulid,
    pub occupant: Occupant,
    pub whole_day: bool,
    pub status: ReservationStatus,
    pub check_in_deadline: Option<Ms>,
    pub checked_in_at: Option<Ms>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreePeriod {
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskAvailability {
    pub desk_id: Ulid,
    /// Zero-padded public identifier, best-effort when the desk is unknown.
    pub desk_label: String,
    pub floor_name: Option<String>,
    pub whole_day_free: bool,
    pub used_periods: Vec<UsedPeriod>,
    pub free_periods: Vec<FreePeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub office_id: Ulid,
    pub day: NaiveDate,
    pub timezone: String,
    pub window: Span,
    pub desks: Vec<DeskAvailability>,
}
