use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_approved_conflict, check_no_conflict, validate_request, validate_user};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_hall(
        &self,
        code: ResourceId,
        capacity: Option<u32>,
    ) -> Result<Hall, EngineError> {
        if code.is_empty() {
            return Err(EngineError::InvalidRequest("hall code is required"));
        }
        if code.as_str().len() > MAX_CODE_LEN {
            return Err(EngineError::LimitExceeded("hall code too long"));
        }
        // Exclusive: the existence check and the insert must not interleave
        // with another create of the same code.
        let _registry = self.registry.write().await;
        if self.state.len() >= MAX_HALLS {
            return Err(EngineError::LimitExceeded("too many halls"));
        }
        if self.state.contains_key(&code) {
            return Err(EngineError::HallExists(code));
        }

        let event = Event::HallCreated {
            code: code.clone(),
            capacity,
        };
        self.wal_append(&event).await?;
        let hall = Hall { code, capacity };
        self.state
            .insert(hall.code.clone(), Arc::new(RwLock::new(HallState::new(hall.clone()))));
        tracing::info!("hall created: {}", hall.code);
        Ok(hall)
    }

    /// Remove a hall. Refused while it still holds pending or approved bookings;
    /// rejected history goes with it.
    pub async fn delete_hall(&self, code: &ResourceId) -> Result<(), EngineError> {
        let _registry = self.registry.read().await;
        let hs = self
            .get_hall_state(code)
            .ok_or_else(|| EngineError::NotFound(code.clone()))?;
        let guard = hs.write().await;
        if !self.is_registered(code, &hs) {
            return Err(EngineError::NotFound(code.clone()));
        }
        if guard.has_blocking() {
            return Err(EngineError::HasBookings(code.clone()));
        }

        let event = Event::HallDeleted { code: code.clone() };
        self.wal_append(&event).await?;
        for r in &guard.reservations {
            self.booking_to_hall.remove(&r.id);
        }
        self.state.remove_if(code, |_, current| Arc::ptr_eq(current, &hs));
        tracing::info!("hall deleted: {code}");
        Ok(())
    }

    /// Submit a booking request on behalf of `session`.
    ///
    /// The overlap check here is authoritative: it runs under the hall's write
    /// lock, so of two concurrent requests for the same slot exactly one is
    /// stored and the other gets `Conflict`.
    pub async fn create_booking(
        &self,
        session: &Session,
        request: BookingRequest,
    ) -> Result<Reservation, EngineError> {
        validate_user(session)?;
        let span = validate_request(&request)?;
        if span.is_elapsed(self.clock.now()) {
            return Err(EngineError::PastTimeSlot(span));
        }
        let hs = self
            .get_hall_state(&request.resource_id)
            .ok_or_else(|| EngineError::NotFound(request.resource_id.clone()))?;
        let mut guard = hs.write().await;
        if !self.is_registered(&request.resource_id, &hs) {
            return Err(EngineError::NotFound(request.resource_id.clone()));
        }
        if guard.reservations.len() >= MAX_BOOKINGS_PER_HALL {
            return Err(EngineError::LimitExceeded("too many bookings on hall"));
        }
        if self.booking_to_hall.contains_key(&request.id) {
            return Err(EngineError::BookingExists(request.id));
        }
        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let reservation = Reservation {
            id: request.id,
            resource_id: request.resource_id,
            span,
            status: BookingStatus::Pending,
            details: request.details,
            requested_by: Some(session.user.clone()),
            decided_by: None,
            rejection_reason: None,
        };
        let event = Event::BookingRequested {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_REQUESTED_TOTAL).increment(1);
        tracing::debug!(
            "booking {} requested by {} for {} {}",
            reservation.id,
            session.user,
            reservation.resource_id,
            reservation.span
        );
        Ok(reservation)
    }

    /// Pending → Approved. Fails if another approved booking already holds the slot.
    pub async fn approve_booking(
        &self,
        session: &Session,
        id: Ulid,
    ) -> Result<Reservation, EngineError> {
        validate_user(session)?;
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))?;
        if current.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: BookingStatus::Approved,
            });
        }
        check_no_approved_conflict(&guard, &current)?;

        let event = Event::BookingApproved {
            id,
            resource_id,
            decided_by: Some(session.user.clone()),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Pending → Rejected. The slot becomes free for new requests.
    pub async fn reject_booking(
        &self,
        session: &Session,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_user(session)?;
        if let Some(r) = &reason
            && r.len() > MAX_TEXT_LEN
        {
            return Err(EngineError::LimitExceeded("rejection reason too long"));
        }
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        let current = guard
            .get(id)
            .map(|r| r.status)
            .ok_or(EngineError::BookingNotFound(id))?;
        if current != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                from: current,
                to: BookingStatus::Rejected,
            });
        }

        let event = Event::BookingRejected {
            id,
            resource_id,
            decided_by: Some(session.user.clone()),
            reason,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Withdraw a booking of any status. Returns the hall it was on.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<ResourceId, EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        let event = Event::BookingCancelled {
            id,
            resource_id: resource_id.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(resource_id)
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // The registry lock keeps halls from appearing or vanishing, and the
        // hall read guards keep bookings still, until the swap is done.
        let _registry = self.registry.write().await;
        let mut events = Vec::new();
        let mut guards = Vec::new();
        for hs in self.hall_handles() {
            let guard = hs.read_owned().await;
            events.push(Event::HallCreated {
                code: guard.hall.code.clone(),
                capacity: guard.hall.capacity,
            });
            for r in &guard.reservations {
                events.push(Event::BookingRequested {
                    reservation: r.clone(),
                });
            }
            guards.push(guard);
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(guards);
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
