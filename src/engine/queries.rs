use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::{day_window, parse_timezone};
use crate::model::{AvailabilitySnapshot, Ms, Reservation};

use super::availability::desk_availability;
use super::conflict::validate_window;
use super::{Engine, EngineError};

impl Engine {
    /// Availability for every desk in an office on one civil day. Overdue
    /// rows are released first, so a desk freed by a missed check-in shows
    /// up as free in the same response.
    pub async fn get_availability(
        &self,
        office_id: Ulid,
        day: NaiveDate,
        now: Ms,
    ) -> Result<AvailabilitySnapshot, EngineError> {
        let office = self
            .directory
            .office(office_id)
            .ok_or(EngineError::NotFound {
                what: "office",
                id: office_id,
            })?;
        let tz = parse_timezone(&office.timezone)?;
        let window = day_window(day, &tz)?;
        validate_window(&window)?;

        // The write lock covers the sweep and the snapshot, so the desks
        // are tiled against one consistent view of the book.
        let book = self.office_book(office_id);
        let mut guard = book.write().await;
        self.sweep_book(&mut guard, office_id, now).await;

        let desks = self
            .directory
            .desks_in_office(office_id)
            .into_iter()
            .map(|desk| desk_availability(desk, &guard, &window, &self.directory))
            .collect();

        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        Ok(AvailabilitySnapshot {
            office_id,
            day,
            timezone: office.timezone.clone(),
            window,
            desks,
        })
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let office_id = self
            .reservation_office
            .get(&reservation_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound {
                what: "reservation",
                id: reservation_id,
            })?;
        let book = self
            .existing_book(office_id)
            .ok_or(EngineError::NotFound {
                what: "office",
                id: office_id,
            })?;
        let guard = book.read().await;
        guard
            .get(reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                what: "reservation",
                id: reservation_id,
            })
    }

    /// Every reservation a user holds, across offices, ordered by day then
    /// start. Released rows are included; callers filter by status.
    pub async fn reservations_for_user(&self, user_id: Ulid) -> Vec<Reservation> {
        let mut rows = Vec::new();
        for (_, book) in self.all_books() {
            let guard = book.read().await;
            rows.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.user_id == user_id)
                    .cloned(),
            );
        }
        rows.sort_by_key(|r| (r.day, r.start_at.unwrap_or(Ms::MIN)));
        rows
    }
}
