//! deskd: an embedded desk-reservation engine.
//!
//! Each organization gets its own [`engine::Engine`] backed by a write-ahead
//! log. Reservations are kept in per-office books; every mutation resolves
//! the office's civil-day window, releases overdue rows, and checks desk and
//! user exclusivity before it is persisted.

pub mod calendar;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod orgs;
pub mod sweeper;
pub mod wal;
