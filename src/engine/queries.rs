use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::{
    bookings_for_date, check, evaluate, hall_day_summary, AvailabilityQuery, AvailabilityResult,
    HallDay, QueryParts,
};
use super::{Engine, EngineError};

/// Optional equality filters for `list_bookings`. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub requested_by: Option<String>,
    pub hall: Option<ResourceId>,
}

impl BookingFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.status.is_none_or(|s| r.status == s)
            && self
                .requested_by
                .as_deref()
                .is_none_or(|u| r.requested_by.as_deref() == Some(u))
            && self.hall.as_ref().is_none_or(|h| r.resource_id == *h)
    }
}

impl Engine {
    pub async fn get_hall(&self, code: &ResourceId) -> Result<Hall, EngineError> {
        let hs = self
            .get_hall_state(code)
            .ok_or_else(|| EngineError::NotFound(code.clone()))?;
        let guard = hs.read().await;
        Ok(guard.hall.clone())
    }

    /// Every registered hall, sorted by code.
    pub async fn list_halls(&self) -> Vec<Hall> {
        let mut halls = Vec::with_capacity(self.state.len());
        for hs in self.hall_handles() {
            halls.push(hs.read().await.hall.clone());
        }
        halls.sort_by(|a, b| a.code.cmp(&b.code));
        halls
    }

    /// Every reservation of every hall, any status.
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        let mut all = Vec::new();
        for hs in self.hall_handles() {
            all.extend(hs.read().await.reservations.iter().cloned());
        }
        all
    }

    /// Reservations matching `filter`, sorted by start then hall.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Vec<Reservation> {
        let handles = match &filter.hall {
            Some(code) => self.get_hall_state(code).into_iter().collect(),
            None => self.hall_handles(),
        };
        let mut out = Vec::new();
        for hs in handles {
            let guard = hs.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        out
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let code = self
            .get_hall_for_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let hs = self
            .get_hall_state(&code)
            .ok_or(EngineError::BookingNotFound(id))?;
        let guard = hs.read().await;
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Advisory availability for one hall at the engine's current time.
    pub async fn check_availability(&self, query: &AvailabilityQuery) -> AvailabilityResult {
        let reservations = self.hall_reservations(&query.resource_id).await;
        let result = evaluate(query, &reservations, self.clock.now());
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "verdict" => result.label())
            .increment(1);
        result
    }

    /// Like `check_availability`, from raw text fields. Never fails.
    pub async fn check_parts(&self, parts: &QueryParts) -> AvailabilityResult {
        let reservations = match parts.hall.as_deref() {
            Some(h) => self.hall_reservations(&ResourceId::new(h)).await,
            None => Vec::new(),
        };
        let result = check(parts, &reservations, self.clock.now());
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "verdict" => result.label())
            .increment(1);
        result
    }

    /// Pending and approved bookings on `date` that have not yet ended.
    pub async fn day_view(&self, date: NaiveDate) -> Vec<Reservation> {
        let all = self.list_reservations().await;
        bookings_for_date(&all, date, self.clock.now())
    }

    /// Every hall with its bookings on `date`.
    pub async fn hall_overview(&self, date: NaiveDate) -> Vec<HallDay> {
        let halls = self.list_halls().await;
        let all = self.list_reservations().await;
        hall_day_summary(&halls, &all, date, self.clock.now())
    }

    async fn hall_reservations(&self, code: &ResourceId) -> Vec<Reservation> {
        match self.get_hall_state(code) {
            Some(hs) => hs.read().await.reservations.clone(),
            None => Vec::new(),
        }
    }
}
