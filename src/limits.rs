//! Hard ceilings. Everything here exists to bound memory and reject
//! obviously corrupt input, not to enforce product rules.

use crate::model::Ms;

/// 2000-01-01T00:00:00Z. Instants before this are treated as corrupt.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// 2100-01-01T00:00:00Z. Instants past this are treated as corrupt.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Largest WAL record length accepted during replay. A length prefix above
/// this is read as corruption, not as a real record.
pub const MAX_WAL_RECORD_BYTES: u32 = 1024 * 1024;

/// Reservation rows held in one office book.
pub const MAX_RESERVATIONS_PER_OFFICE: usize = 100_000;

/// Organizations served by one process.
pub const MAX_ORGS: usize = 64;

/// Organization names longer than this are rejected before sanitization.
pub const MAX_ORG_NAME_LEN: usize = 256;
