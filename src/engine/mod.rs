mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;

pub use availability::{desk_availability, merge_overlapping, subtract_intervals};
pub use conflict::{find_desk_conflict, find_user_conflict};
pub use error::EngineError;
pub use lifecycle::{CHECK_IN_GRACE_MS, WHOLE_DAY_CHECK_IN_HOUR};

pub(crate) use conflict::now_ms;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::directory::Directory;
use crate::model::*;
use crate::wal::Wal;

pub type SharedOfficeBook = Arc<RwLock<OfficeBook>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One organization's reservation engine: the directory it serves, one
/// book of reservations per office, and a WAL for durability.
///
/// Every mutation of an office goes through that office's write lock, so
/// the conflict scan and the insert it guards are a single atomic step.
/// Two racers for the same slot serialize on the lock and the loser sees
/// the winner's row.
pub struct Engine {
    pub directory: Arc<Directory>,
    books: DashMap<Ulid, SharedOfficeBook>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: reservation id → office id.
    pub(super) reservation_office: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to an OfficeBook (no locking — caller holds the lock).
fn apply_to_book(book: &mut OfficeBook, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::Booked { reservation } => {
            index.insert(reservation.id, reservation.office_id);
            book.insert(reservation.clone());
        }
        Event::Edited { reservation } => {
            // Remove + insert keeps the book sorted when the start moved.
            book.remove(reservation.id);
            index.insert(reservation.id, reservation.office_id);
            book.insert(reservation.clone());
        }
        Event::CheckedIn { id, at, .. } => {
            if let Some(r) = book.get_mut(*id) {
                r.status = ReservationStatus::CheckedIn;
                r.checked_in_at = Some(*at);
            }
        }
        Event::Released { id, at, .. } => {
            if let Some(r) = book.get_mut(*id) {
                r.status = ReservationStatus::Released;
                r.auto_released_at = Some(*at);
            }
        }
        Event::Cancelled { id, .. } => {
            book.remove(*id);
            index.remove(id);
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, directory: Arc<Directory>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            directory,
            books: DashMap::new(),
            wal_tx,
            reservation_office: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy org
        // creation).
        for event in &events {
            let book = engine.office_book(event.office_id());
            let mut guard = book.try_write().expect("replay: uncontended write");
            apply_to_book(&mut guard, event, &engine.reservation_office);
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// The book holding one office's reservations, created on first touch.
    pub(super) fn office_book(&self, office_id: Ulid) -> SharedOfficeBook {
        self.books
            .entry(office_id)
            .or_insert_with(|| Arc::new(RwLock::new(OfficeBook::default())))
            .clone()
    }

    pub(super) fn existing_book(&self, office_id: Ulid) -> Option<SharedOfficeBook> {
        self.books.get(&office_id).map(|e| e.value().clone())
    }

    pub(super) fn all_books(&self) -> Vec<(Ulid, SharedOfficeBook)> {
        self.books
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Lookup reservation → office, get the book, acquire its write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<OfficeBook>), EngineError> {
        let office_id = self
            .reservation_office
            .get(reservation_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound {
                what: "reservation",
                id: *reservation_id,
            })?;
        let book = self
            .existing_book(office_id)
            .ok_or(EngineError::NotFound {
                what: "office",
                id: office_id,
            })?;
        let guard = book.write_owned().await;
        Ok((office_id, guard))
    }

    /// WAL-append + apply in one call. The WAL ack comes back only after
    /// the event is fsynced, so a row is never visible without being durable.
    pub(super) async fn persist_and_apply(
        &self,
        book: &mut OfficeBook,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_book(book, event, &self.reservation_office);
        Ok(())
    }
}
