use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::calendar::{day_window, hour_to_instant, parse_timezone};
use crate::directory::Role;
use crate::limits::*;
use crate::model::{
    BookingInterval, Event, Ms, OfficeBook, Reservation, ReservationPatch, ReservationStatus,
    Span, HOUR_MS,
};

use super::conflict::{check_exclusive, validate_window};
use super::lifecycle::{check_in_gate, compute_check_in_deadline};
use super::{Engine, EngineError, WalCommand};

/// Turn the requested shape into a concrete span inside the day window.
fn resolve_candidate(
    window: &Span,
    interval: BookingInterval,
) -> Result<(Span, bool), EngineError> {
    match interval {
        BookingInterval::WholeDay => Ok((*window, true)),
        BookingInterval::Hours {
            start_hour,
            end_hour,
        } => {
            if end_hour <= start_hour || end_hour > 24 {
                return Err(EngineError::BadRequest(format!(
                    "invalid hour range {start_hour}..{end_hour}"
                )));
            }
            let span = Span::new(
                hour_to_instant(window.start, start_hour),
                hour_to_instant(window.start, end_hour),
            );
            Ok((span, false))
        }
    }
}

impl Engine {
    fn require_admin(&self, actor_id: Ulid) -> Result<(), EngineError> {
        let actor = self.directory.user(actor_id).ok_or(EngineError::NotFound {
            what: "user",
            id: actor_id,
        })?;
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden("admin role required"));
        }
        Ok(())
    }

    /// Book a desk for a user. Overdue rows in the office are released
    /// first, so a desk blocked only by a missed check-in frees up within
    /// the same call.
    pub async fn book(
        &self,
        user_id: Ulid,
        desk_id: Ulid,
        day: NaiveDate,
        interval: BookingInterval,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        if self.directory.user(user_id).is_none() {
            return Err(EngineError::NotFound {
                what: "user",
                id: user_id,
            });
        }
        let office = self
            .directory
            .office_of_desk(desk_id)
            .ok_or(EngineError::NotFound {
                what: "desk",
                id: desk_id,
            })?;
        let office_id = office.id;
        let timezone = office.timezone.clone();
        let tz = parse_timezone(&timezone)?;
        let window = day_window(day, &tz)?;
        validate_window(&window)?;

        let book = self.office_book(office_id);
        let mut guard = book.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_OFFICE {
            return Err(EngineError::LimitExceeded(
                "too many reservations in office",
            ));
        }
        self.sweep_book(&mut guard, office_id, now).await;

        let (candidate, whole_day) = resolve_candidate(&window, interval)?;
        check_exclusive(&guard, desk_id, user_id, &candidate, None)?;
        let deadline = compute_check_in_deadline(whole_day, day, candidate.start, &tz, now)?;

        let reservation = Reservation {
            id: Ulid::new(),
            office_id,
            desk_id,
            user_id,
            day,
            start_at: Some(candidate.start),
            end_at: Some(candidate.end),
            whole_day,
            timezone,
            status: ReservationStatus::Booked,
            check_in_deadline: Some(deadline),
            checked_in_at: None,
            auto_released_at: None,
        };
        let event = Event::Booked {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::RESERVATIONS_BOOKED_TOTAL).increment(1);
        debug!("booked desk {desk_id} for {user_id} on {day}");
        Ok(reservation)
    }

    /// Book on behalf of another user. The actor must be an admin; the
    /// reservation itself is validated exactly like a self-service booking.
    pub async fn admin_book(
        &self,
        actor_id: Ulid,
        user_id: Ulid,
        desk_id: Ulid,
        day: NaiveDate,
        interval: BookingInterval,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        self.require_admin(actor_id)?;
        self.book(user_id, desk_id, day, interval, now).await
    }

    /// Rewrite an existing reservation. Admin only. Unset patch fields keep
    /// their stored values; the row is re-validated against the book with
    /// itself excluded, and its check-in lifecycle starts over.
    pub async fn edit_reservation(
        &self,
        actor_id: Ulid,
        reservation_id: Ulid,
        patch: ReservationPatch,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        self.require_admin(actor_id)?;
        let (office_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let existing = guard
            .get(reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                what: "reservation",
                id: reservation_id,
            })?;

        let desk_id = patch.desk_id.unwrap_or(existing.desk_id);
        let user_id = patch.user_id.unwrap_or(existing.user_id);
        let day = patch.day.unwrap_or(existing.day);

        let office = self
            .directory
            .office_of_desk(desk_id)
            .ok_or(EngineError::NotFound {
                what: "desk",
                id: desk_id,
            })?;
        if office.id != office_id {
            return Err(EngineError::BadRequest(
                "desk belongs to a different office".into(),
            ));
        }
        if self.directory.user(user_id).is_none() {
            return Err(EngineError::NotFound {
                what: "user",
                id: user_id,
            });
        }

        let interval = match patch.interval {
            Some(interval) => interval,
            None if existing.whole_day => BookingInterval::WholeDay,
            None => {
                let span = existing.span().ok_or_else(|| {
                    EngineError::BadRequest(
                        "stored reservation has no usable interval, supply one".into(),
                    )
                })?;
                let old_tz = parse_timezone(&existing.timezone)?;
                let old_window = day_window(existing.day, &old_tz)?;
                // Widen odd spans to whole hours.
                let start_hour = ((span.start - old_window.start) / HOUR_MS) as u32;
                let end_hour = ((span.end - old_window.start) as u64).div_ceil(HOUR_MS as u64) as u32;
                BookingInterval::Hours {
                    start_hour,
                    end_hour,
                }
            }
        };

        let tz = parse_timezone(&office.timezone)?;
        let window = day_window(day, &tz)?;
        validate_window(&window)?;

        self.sweep_book(&mut guard, office_id, now).await;

        let (candidate, whole_day) = resolve_candidate(&window, interval)?;
        check_exclusive(&guard, desk_id, user_id, &candidate, Some(reservation_id))?;
        let deadline = compute_check_in_deadline(whole_day, day, candidate.start, &tz, now)?;

        let updated = Reservation {
            id: reservation_id,
            office_id,
            desk_id,
            user_id,
            day,
            start_at: Some(candidate.start),
            end_at: Some(candidate.end),
            whole_day,
            timezone: office.timezone.clone(),
            status: ReservationStatus::Booked,
            check_in_deadline: Some(deadline),
            checked_in_at: None,
            auto_released_at: None,
        };
        let event = Event::Edited {
            reservation: updated.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("edited reservation {reservation_id}");
        Ok(updated)
    }

    /// Delete a reservation outright. Owners may cancel their own rows at
    /// any point in the lifecycle; admins may cancel anything. No conflict
    /// checks apply.
    pub async fn cancel(&self, actor_id: Ulid, reservation_id: Ulid) -> Result<(), EngineError> {
        let actor_role = self
            .directory
            .user(actor_id)
            .map(|u| u.role)
            .ok_or(EngineError::NotFound {
                what: "user",
                id: actor_id,
            })?;
        let (office_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let row = guard.get(reservation_id).ok_or(EngineError::NotFound {
            what: "reservation",
            id: reservation_id,
        })?;
        if row.user_id != actor_id && actor_role != Role::Admin {
            return Err(EngineError::Forbidden(
                "only the owner or an admin may cancel",
            ));
        }
        let event = Event::Cancelled {
            office_id,
            id: reservation_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        debug!("cancelled reservation {reservation_id}");
        Ok(())
    }

    /// Confirm that the desk is actually in use. A reservation someone else
    /// owns is reported as missing rather than forbidden, so ids cannot be
    /// probed across users. Checking in twice is a no-op.
    pub async fn check_in(
        &self,
        reservation_id: Ulid,
        user_id: Ulid,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let (office_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let row = guard
            .get(reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                what: "reservation",
                id: reservation_id,
            })?;
        if row.user_id != user_id {
            return Err(EngineError::NotFound {
                what: "reservation",
                id: reservation_id,
            });
        }
        let tz = parse_timezone(&row.timezone)?;
        if check_in_gate(&row, now, &tz)? {
            return Ok(row);
        }
        let event = Event::CheckedIn {
            office_id,
            id: reservation_id,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::CHECKINS_TOTAL).increment(1);
        let mut updated = row;
        updated.status = ReservationStatus::CheckedIn;
        updated.checked_in_at = Some(now);
        Ok(updated)
    }

    /// Release every overdue row across all offices. Returns how many rows
    /// flipped. Safe to call concurrently and from timers; a second pass
    /// over the same state releases nothing.
    pub async fn release_expired(&self, now: Ms) -> u64 {
        let mut released = 0;
        for (office_id, book) in self.all_books() {
            let mut guard = book.write().await;
            released += self.sweep_book(&mut guard, office_id, now).await;
        }
        released
    }

    /// Release overdue rows in one book. The caller holds the write lock.
    /// A row whose release fails to persist is logged and skipped; it stays
    /// eligible for the next sweep.
    pub(super) async fn sweep_book(
        &self,
        book: &mut OfficeBook,
        office_id: Ulid,
        now: Ms,
    ) -> u64 {
        let due: Vec<Ulid> = book
            .reservations
            .iter()
            .filter(|r| {
                r.status == ReservationStatus::Booked
                    && r.check_in_deadline.is_some_and(|d| d < now)
            })
            .map(|r| r.id)
            .collect();
        let mut released = 0u64;
        for id in due {
            let event = Event::Released {
                office_id,
                id,
                at: now,
            };
            match self.persist_and_apply(book, &event).await {
                Ok(()) => {
                    debug!("released overdue reservation {id}");
                    released += 1;
                }
                Err(e) => warn!("sweep skipped {id}: {e}"),
            }
        }
        if released > 0 {
            metrics::counter!(crate::observability::RESERVATIONS_RELEASED_TOTAL)
                .increment(released);
        }
        released
    }

    /// Count reservations on the given desks that are still active, i.e.
    /// not released and not yet past their end.
    pub async fn count_active_for_desks(&self, desk_ids: &[Ulid], now: Ms) -> u64 {
        let mut by_office: HashMap<Ulid, HashSet<Ulid>> = HashMap::new();
        for &desk_id in desk_ids {
            if let Some(office) = self.directory.office_of_desk(desk_id) {
                by_office.entry(office.id).or_default().insert(desk_id);
            }
        }
        let mut count = 0;
        for (office_id, desks) in by_office {
            let Some(book) = self.existing_book(office_id) else {
                continue;
            };
            let guard = book.read().await;
            count += guard
                .reservations
                .iter()
                .filter(|r| {
                    desks.contains(&r.desk_id)
                        && r.is_active()
                        && r.end_at.is_some_and(|end| end > now)
                })
                .count() as u64;
        }
        count
    }

    /// Rewrite the WAL with one Booked event per surviving row. The row
    /// carries its full state (status, stamps), so replay rebuilds the
    /// books exactly.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for (_, book) in self.all_books() {
            let guard = book.read().await;
            for r in &guard.reservations {
                events.push(Event::Booked {
                    reservation: r.clone(),
                });
            }
        }
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
