use ulid::Ulid;

use crate::model::{BookingStatus, ResourceId, Span};

#[derive(Debug)]
pub enum EngineError {
    NotFound(ResourceId),
    BookingNotFound(Ulid),
    HallExists(ResourceId),
    BookingExists(Ulid),
    Conflict(Ulid),
    PastTimeSlot(Span),
    InvalidSpan(Span),
    InvalidRequest(&'static str),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    HasBookings(ResourceId),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(code) => write!(f, "hall not found: {code}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::HallExists(code) => write!(f, "hall already exists: {code}"),
            EngineError::BookingExists(id) => write!(f, "booking already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::PastTimeSlot(span) => {
                write!(f, "time slot {span} has already passed")
            }
            EngineError::InvalidSpan(span) => {
                write!(f, "invalid time range {span}: end must be after start")
            }
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "booking {id} is {from}, cannot become {to}")
            }
            EngineError::HasBookings(code) => {
                write!(f, "cannot delete hall {code}: has active bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
