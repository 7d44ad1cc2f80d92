//! Hard caps enforced by the engine. Requests beyond these fail with
//! `EngineError::LimitExceeded` instead of growing state without bound.

/// Max halls in the registry.
pub const MAX_HALLS: usize = 10_000;

/// Max reservations (any status) kept per hall.
pub const MAX_BOOKINGS_PER_HALL: usize = 100_000;

/// Max byte length of a hall code.
pub const MAX_CODE_LEN: usize = 64;

/// Max byte length of free-text fields (titles, names, descriptions, reasons).
pub const MAX_TEXT_LEN: usize = 1024;

/// Max byte length of a session user name.
pub const MAX_USER_LEN: usize = 256;

/// Largest WAL payload accepted on replay; a bigger length prefix means corruption.
pub const MAX_WAL_RECORD_LEN: usize = 1 << 20;
