use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open interval `[start, end)` over naive wall-clock instants.
///
/// All times are time-zone-naive and compared as local wall-clock values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Combine a calendar day with two wall-clock times on that day.
    pub fn on_date(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: date.and_time(start),
            end: date.and_time(end),
        }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// `false` when `end <= start`.
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// Both ends strictly before `now`. A window that is still running is not elapsed.
    pub fn is_elapsed(&self, now: NaiveDateTime) -> bool {
        self.start < now && self.end < now
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(DATETIME_DISPLAY),
            self.end.format(DATETIME_DISPLAY)
        )
    }
}

pub const DATETIME_DISPLAY: &str = "%Y-%m-%d %H:%M";

/// Normalized hall code, e.g. `A-205`.
///
/// Surrounding whitespace is trimmed on construction. Comparison is exact and
/// case-sensitive: `a-205` and `A-205` are different halls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
}

impl BookingStatus {
    /// Pending and approved reservations occupy the hall; rejected ones never do.
    pub fn is_blocking(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// Who the booking is for and what it is about. Display-only for availability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub event_title: String,
    pub event_description: Option<String>,
    pub faculty_name: String,
    pub faculty_department: Option<String>,
    pub faculty_designation: Option<String>,
    pub faculty_email: Option<String>,
}

/// A booking record: a hall, a time window and a lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub span: Span,
    pub status: BookingStatus,
    pub details: BookingDetails,
    /// Session user that submitted the request.
    pub requested_by: Option<String>,
    /// Session user that approved or rejected it.
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hall {
    pub code: ResourceId,
    /// Seat count; informational only.
    pub capacity: Option<u32>,
}

/// The caller on whose behalf an engine operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

/// A coordinator's request for a new booking, as submitted by the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub details: BookingDetails,
}

impl BookingRequest {
    pub fn span(&self) -> Span {
        Span::on_date(self.date, self.start_time, self.end_time)
    }
}

/// Per-hall state: the hall plus its reservations sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct HallState {
    pub hall: Hall,
    pub reservations: Vec<Reservation>,
}

impl HallState {
    pub fn new(hall: Hall) -> Self {
        Self {
            hall,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations of any status whose span overlaps `query`.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    pub fn has_blocking(&self) -> bool {
        self.reservations.iter().any(|r| r.status.is_blocking())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HallCreated {
        code: ResourceId,
        capacity: Option<u32>,
    },
    HallDeleted {
        code: ResourceId,
    },
    /// Carries the full reservation so compaction can restate any status with one event.
    BookingRequested {
        reservation: Reservation,
    },
    BookingApproved {
        id: Ulid,
        resource_id: ResourceId,
        decided_by: Option<String>,
    },
    BookingRejected {
        id: Ulid,
        resource_id: ResourceId,
        decided_by: Option<String>,
        reason: Option<String>,
    },
    BookingCancelled {
        id: Ulid,
        resource_id: ResourceId,
    },
}

// ── Text parsing ─────────────────────────────────────────────────

pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

/// Accepts `HH:MM` (HTML time inputs) and `HH:MM:SS`.
pub fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` and the same with a space separator.
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
}
