use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::model::*;

// ── Availability Evaluator ────────────────────────────────────────
//
// Pure functions over an already-fetched reservation list. Results are
// advisory: two callers can both see `Available` for the same slot. The
// engine re-checks overlap under the hall's write lock when a booking is
// actually created.

/// "Is this hall free on this day between these two times?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl AvailabilityQuery {
    pub fn new(
        resource_id: ResourceId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            resource_id,
            date,
            start_time,
            end_time,
        }
    }

    /// The requested window as absolute instants on `date`.
    pub fn requested_span(&self) -> Span {
        Span::on_date(self.date, self.start_time, self.end_time)
    }

    /// Build a query from raw form fields. Every field is required.
    pub fn from_parts(parts: &QueryParts) -> Result<Self, InvalidQuery> {
        let resource_id = ResourceId::new(required(&parts.hall, "hall")?);
        let date = required(&parts.date, "date")?;
        let start = required(&parts.start_time, "start_time")?;
        let end = required(&parts.end_time, "end_time")?;

        let date = parse_date(date).map_err(|_| InvalidQuery::BadDate(date.to_string()))?;
        let start_time =
            parse_time(start).map_err(|_| InvalidQuery::BadTime("start_time", start.to_string()))?;
        let end_time =
            parse_time(end).map_err(|_| InvalidQuery::BadTime("end_time", end.to_string()))?;

        Ok(Self::new(resource_id, date, start_time, end_time))
    }
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, InvalidQuery> {
    match field.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(InvalidQuery::MissingField(name)),
    }
}

/// Unvalidated query fields as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParts {
    pub hall: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidQuery {
    MissingField(&'static str),
    BadDate(String),
    BadTime(&'static str, String),
}

impl fmt::Display for InvalidQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidQuery::MissingField(name) => write!(f, "missing field: {name}"),
            InvalidQuery::BadDate(v) => write!(f, "bad date {v:?}, expected YYYY-MM-DD"),
            InvalidQuery::BadTime(name, v) => write!(f, "bad {name} {v:?}, expected HH:MM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityResult {
    Available,
    /// Conflicting reservations, in input order.
    Unavailable(Vec<Reservation>),
    /// The whole window is already over.
    PastTimeSlot,
    InvalidQuery(InvalidQuery),
}

impl AvailabilityResult {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityResult::Available)
    }

    pub fn conflicts(&self) -> &[Reservation] {
        match self {
            AvailabilityResult::Unavailable(conflicts) => conflicts,
            _ => &[],
        }
    }

    /// Short verdict for rows and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            AvailabilityResult::Available => "available",
            AvailabilityResult::Unavailable(_) => "unavailable",
            AvailabilityResult::PastTimeSlot => "past",
            AvailabilityResult::InvalidQuery(_) => "invalid",
        }
    }
}

/// Decide whether `query.resource_id` is free for the requested window.
///
/// 1. A window whose start and end are both before `now` is `PastTimeSlot`,
///    whatever the reservations say. A window that is still running is not.
/// 2. Rejected reservations and other halls are ignored.
/// 3. Overlap is strict: `r.start < req.end && r.end > req.start`, so a
///    reservation ending exactly when the request starts does not conflict.
///
/// `end_time <= start_time` is not rejected here. The overlap formula is
/// applied to such a window as given, so a reservation enclosing both ends
/// still conflicts.
pub fn evaluate(
    query: &AvailabilityQuery,
    all_reservations: &[Reservation],
    now: NaiveDateTime,
) -> AvailabilityResult {
    let requested = query.requested_span();
    if requested.is_elapsed(now) {
        return AvailabilityResult::PastTimeSlot;
    }

    let conflicts: Vec<Reservation> = conflicting(all_reservations, &query.resource_id, &requested)
        .cloned()
        .collect();

    if conflicts.is_empty() {
        AvailabilityResult::Available
    } else {
        AvailabilityResult::Unavailable(conflicts)
    }
}

/// Total front door: raw fields in, verdict out. Never fails.
pub fn check(
    parts: &QueryParts,
    all_reservations: &[Reservation],
    now: NaiveDateTime,
) -> AvailabilityResult {
    match AvailabilityQuery::from_parts(parts) {
        Ok(query) => evaluate(&query, all_reservations, now),
        Err(invalid) => AvailabilityResult::InvalidQuery(invalid),
    }
}

/// Blocking reservations of `resource_id` that overlap `window`.
pub fn conflicting<'a>(
    all_reservations: &'a [Reservation],
    resource_id: &'a ResourceId,
    window: &'a Span,
) -> impl Iterator<Item = &'a Reservation> + 'a {
    all_reservations.iter().filter(move |r| {
        r.resource_id == *resource_id && r.status.is_blocking() && r.span.overlaps(window)
    })
}

/// Day view: pending/approved reservations starting on `date` that have not
/// fully elapsed (`end >= now`). Sorted by start, then hall.
pub fn bookings_for_date(
    all_reservations: &[Reservation],
    date: NaiveDate,
    now: NaiveDateTime,
) -> Vec<Reservation> {
    let mut day: Vec<Reservation> = all_reservations
        .iter()
        .filter(|r| r.span.start.date() == date && r.status.is_blocking() && r.span.end >= now)
        .cloned()
        .collect();
    day.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    day
}

/// One hall's slice of the day view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallDay {
    pub hall: Hall,
    pub bookings: Vec<Reservation>,
}

impl HallDay {
    pub fn is_available(&self) -> bool {
        self.bookings.is_empty()
    }
}

/// "All halls for a date": every hall in the given order with its day-view bookings.
pub fn hall_day_summary(
    halls: &[Hall],
    all_reservations: &[Reservation],
    date: NaiveDate,
    now: NaiveDateTime,
) -> Vec<HallDay> {
    let day = bookings_for_date(all_reservations, date, now);
    halls
        .iter()
        .map(|hall| HallDay {
            hall: hall.clone(),
            bookings: day
                .iter()
                .filter(|r| r.resource_id == hall.code)
                .cloned()
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn at(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn reservation(hall: &str, start: &str, end: &str, status: BookingStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            resource_id: ResourceId::new(hall),
            span: Span::new(at(start), at(end)),
            status,
            details: BookingDetails {
                event_title: "Guest lecture".into(),
                faculty_name: "Dr. Rao".into(),
                ..Default::default()
            },
            requested_by: Some("coordinator".into()),
            decided_by: None,
            rejection_reason: None,
        }
    }

    fn query(hall: &str, date: &str, start: &str, end: &str) -> AvailabilityQuery {
        AvailabilityQuery::new(ResourceId::new(hall), day(date), time(start), time(end))
    }

    fn long_ago() -> NaiveDateTime {
        at("2024-02-01T00:00")
    }

    // ── evaluate ────────────────────────────────────────

    #[test]
    fn worked_example_overlap_then_touch() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T10:00",
            "2024-03-01T11:00",
            BookingStatus::Approved,
        )];

        let overlap = evaluate(&query("A-205", "2024-03-01", "10:30", "11:30"), &existing, long_ago());
        assert_eq!(overlap.conflicts().len(), 1);
        assert_eq!(overlap.conflicts()[0].id, existing[0].id);
        assert_eq!(overlap.label(), "unavailable");

        let touch = evaluate(&query("A-205", "2024-03-01", "11:00", "12:00"), &existing, long_ago());
        assert_eq!(touch, AvailabilityResult::Available);
    }

    #[test]
    fn no_reservations_is_available() {
        let result = evaluate(&query("A-205", "2024-03-01", "09:00", "10:00"), &[], long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn disjoint_reservations_are_available() {
        let existing = vec![
            reservation("A-205", "2024-03-01T08:00", "2024-03-01T09:00", BookingStatus::Approved),
            reservation("A-205", "2024-03-01T13:00", "2024-03-01T14:00", BookingStatus::Pending),
            reservation("A-205", "2024-03-02T10:00", "2024-03-02T11:00", BookingStatus::Approved),
        ];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "12:00"), &existing, long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn reservation_ending_at_query_start_does_not_conflict() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T10:00",
            BookingStatus::Pending,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn reservation_starting_at_query_end_does_not_conflict() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T11:00",
            "2024-03-01T12:00",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn one_minute_overlap_conflicts() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T10:01",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        assert_eq!(result.conflicts().len(), 1);
    }

    #[test]
    fn reservation_enclosing_query_conflicts() {
        let existing = vec![reservation(
            "Auditorium",
            "2024-03-01T08:00",
            "2024-03-01T18:00",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("Auditorium", "2024-03-01", "12:00", "12:30"), &existing, long_ago());
        assert!(!result.is_available());
    }

    #[test]
    fn pending_blocks_like_approved() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T10:00",
            "2024-03-01T11:00",
            BookingStatus::Pending,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "10:15", "10:45"), &existing, long_ago());
        assert_eq!(result.conflicts()[0].status, BookingStatus::Pending);
    }

    #[test]
    fn rejected_never_blocks() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T12:00",
            BookingStatus::Rejected,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn conflicts_listed_in_input_order_without_rejected() {
        let existing = vec![
            reservation("A-205", "2024-03-01T10:30", "2024-03-01T11:30", BookingStatus::Pending),
            reservation("A-205", "2024-03-01T09:30", "2024-03-01T10:30", BookingStatus::Approved),
            reservation("A-205", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Rejected),
        ];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        let ids: Vec<_> = result.conflicts().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![existing[0].id, existing[1].id]);
    }

    #[test]
    fn other_halls_never_affect_result() {
        let existing = vec![
            reservation("A-206", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Approved),
            reservation("a-205", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Approved),
        ];
        let result = evaluate(&query("A-205", "2024-03-01", "10:00", "11:00"), &existing, long_ago());
        assert!(result.is_available());
    }

    #[test]
    fn fully_elapsed_window_is_past_even_with_conflicts() {
        let now = at("2024-03-02T08:00");
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T10:00",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "09:00", "10:00"), &existing, now);
        assert_eq!(result, AvailabilityResult::PastTimeSlot);

        let empty = evaluate(&query("A-205", "2024-03-01", "09:00", "10:00"), &[], now);
        assert_eq!(empty, AvailabilityResult::PastTimeSlot);
    }

    #[test]
    fn partially_elapsed_window_uses_normal_rules() {
        let now = at("2024-03-01T10:00");
        let q = query("A-205", "2024-03-01", "09:00", "11:00");

        assert_eq!(evaluate(&q, &[], now), AvailabilityResult::Available);

        let existing = vec![reservation(
            "A-205",
            "2024-03-01T10:30",
            "2024-03-01T11:30",
            BookingStatus::Approved,
        )];
        assert_eq!(evaluate(&q, &existing, now).label(), "unavailable");
    }

    #[test]
    fn window_ending_exactly_now_is_not_past() {
        let now = at("2024-03-01T10:00");
        let result = evaluate(&query("A-205", "2024-03-01", "09:00", "10:00"), &[], now);
        assert!(result.is_available());
    }

    #[test]
    fn inverted_window_runs_through_the_overlap_formula_as_given() {
        let inner = vec![reservation(
            "A-205",
            "2024-03-01T10:00",
            "2024-03-01T11:00",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "11:00", "10:00"), &inner, long_ago());
        assert!(result.is_available());

        // 09:00 < 10:00 and 12:00 > 11:00
        let enclosing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T12:00",
            BookingStatus::Approved,
        )];
        let result = evaluate(&query("A-205", "2024-03-01", "11:00", "10:00"), &enclosing, long_ago());
        assert_eq!(result.conflicts().len(), 1);
    }

    // ── check (raw fields) ──────────────────────────────

    fn parts(hall: Option<&str>, date: Option<&str>, start: Option<&str>, end: Option<&str>) -> QueryParts {
        QueryParts {
            hall: hall.map(String::from),
            date: date.map(String::from),
            start_time: start.map(String::from),
            end_time: end.map(String::from),
        }
    }

    #[test]
    fn check_reports_missing_fields() {
        let result = check(&parts(Some("A-205"), Some("2024-03-01"), Some("10:00"), None), &[], long_ago());
        assert_eq!(
            result,
            AvailabilityResult::InvalidQuery(InvalidQuery::MissingField("end_time"))
        );

        let blank_hall = check(&parts(Some("   "), Some("2024-03-01"), Some("10:00"), Some("11:00")), &[], long_ago());
        assert_eq!(
            blank_hall,
            AvailabilityResult::InvalidQuery(InvalidQuery::MissingField("hall"))
        );
    }

    #[test]
    fn check_reports_unparsable_fields() {
        let bad_date = check(&parts(Some("A-205"), Some("01/03/2024"), Some("10:00"), Some("11:00")), &[], long_ago());
        assert!(matches!(
            bad_date,
            AvailabilityResult::InvalidQuery(InvalidQuery::BadDate(_))
        ));

        let bad_time = check(&parts(Some("A-205"), Some("2024-03-01"), Some("ten"), Some("11:00")), &[], long_ago());
        assert!(matches!(
            bad_time,
            AvailabilityResult::InvalidQuery(InvalidQuery::BadTime("start_time", _))
        ));
        assert_eq!(bad_time.label(), "invalid");
    }

    #[test]
    fn check_evaluates_valid_fields() {
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T10:00",
            "2024-03-01T11:00",
            BookingStatus::Approved,
        )];
        let result = check(
            &parts(Some(" A-205 "), Some("2024-03-01"), Some("10:30"), Some("11:30")),
            &existing,
            long_ago(),
        );
        assert_eq!(result.conflicts().len(), 1);
    }

    // ── bookings_for_date ───────────────────────────────

    #[test]
    fn day_view_filters_date_status_and_elapsed() {
        let now = at("2024-03-01T12:00");
        let existing = vec![
            // elapsed same-day: dropped
            reservation("A-205", "2024-03-01T09:00", "2024-03-01T10:00", BookingStatus::Approved),
            // running: kept
            reservation("A-206", "2024-03-01T11:00", "2024-03-01T13:00", BookingStatus::Pending),
            // later today: kept
            reservation("A-205", "2024-03-01T14:00", "2024-03-01T15:00", BookingStatus::Approved),
            // rejected: dropped
            reservation("A-205", "2024-03-01T16:00", "2024-03-01T17:00", BookingStatus::Rejected),
            // other day: dropped
            reservation("A-205", "2024-03-02T09:00", "2024-03-02T10:00", BookingStatus::Approved),
        ];

        let day_view = bookings_for_date(&existing, day("2024-03-01"), now);
        let ids: Vec<_> = day_view.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![existing[1].id, existing[2].id]);
    }

    #[test]
    fn day_view_keeps_booking_ending_exactly_now() {
        let now = at("2024-03-01T10:00");
        let existing = vec![reservation(
            "A-205",
            "2024-03-01T09:00",
            "2024-03-01T10:00",
            BookingStatus::Approved,
        )];
        assert_eq!(bookings_for_date(&existing, day("2024-03-01"), now).len(), 1);
    }

    #[test]
    fn day_view_sorted_by_start_then_hall() {
        let existing = vec![
            reservation("B-101", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Approved),
            reservation("A-205", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Pending),
            reservation("A-205", "2024-03-01T08:00", "2024-03-01T09:00", BookingStatus::Approved),
        ];
        let halls: Vec<_> = bookings_for_date(&existing, day("2024-03-01"), long_ago())
            .into_iter()
            .map(|r| (r.span.start, r.resource_id))
            .collect();
        assert_eq!(
            halls,
            vec![
                (at("2024-03-01T08:00"), ResourceId::new("A-205")),
                (at("2024-03-01T10:00"), ResourceId::new("A-205")),
                (at("2024-03-01T10:00"), ResourceId::new("B-101")),
            ]
        );
    }

    #[test]
    fn day_view_of_empty_set_is_empty() {
        assert!(bookings_for_date(&[], day("2024-03-01"), long_ago()).is_empty());
    }

    // ── hall_day_summary ────────────────────────────────

    #[test]
    fn summary_lists_every_hall_in_order() {
        let halls = vec![
            Hall { code: ResourceId::new("A-205"), capacity: Some(60) },
            Hall { code: ResourceId::new("Seminar Hall"), capacity: None },
        ];
        let existing = vec![
            reservation("A-205", "2024-03-01T10:00", "2024-03-01T11:00", BookingStatus::Approved),
            reservation("A-205", "2024-03-01T13:00", "2024-03-01T14:00", BookingStatus::Pending),
            // not a registered hall: not reported
            reservation("Other", "2024-03-01T13:00", "2024-03-01T14:00", BookingStatus::Pending),
        ];

        let summary = hall_day_summary(&halls, &existing, day("2024-03-01"), long_ago());
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].hall.code, ResourceId::new("A-205"));
        assert_eq!(summary[0].bookings.len(), 2);
        assert!(!summary[0].is_available());
        assert_eq!(summary[1].hall.code, ResourceId::new("Seminar Hall"));
        assert!(summary[1].is_available());
    }
}
