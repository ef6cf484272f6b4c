use ulid::Ulid;

use crate::calendar::CalendarError;

#[derive(Debug)]
pub enum EngineError {
    BadRequest(String),
    NotFound { what: &'static str, id: Ulid },
    /// The desk is already reserved; payload is the standing reservation.
    DeskConflict(Ulid),
    /// The user already sits somewhere else in the office; payload is the
    /// standing reservation.
    UserConflict(Ulid),
    Forbidden(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            EngineError::NotFound { what, id } => write!(f, "{what} not found: {id}"),
            EngineError::DeskConflict(id) => {
                write!(f, "desk already reserved, conflicts with: {id}")
            }
            EngineError::UserConflict(id) => {
                write!(f, "user already has a reservation, conflicts with: {id}")
            }
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CalendarError> for EngineError {
    fn from(e: CalendarError) -> Self {
        EngineError::BadRequest(e.to_string())
    }
}
