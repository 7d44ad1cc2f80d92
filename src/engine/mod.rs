mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{
    bookings_for_date, check, conflicting, evaluate, hall_day_summary, AvailabilityQuery,
    AvailabilityResult, HallDay, InvalidQuery, QueryParts,
};
pub use error::EngineError;
pub use queries::BookingFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedHallState = Arc<RwLock<HallState>>;

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
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so a partial batch never bleeds into the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
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
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// In-memory booking state for every hall, backed by the WAL.
pub struct Engine {
    pub state: DashMap<ResourceId, SharedHallState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → hall code
    pub(super) booking_to_hall: DashMap<Ulid, ResourceId>,
    pub(super) clock: Arc<dyn Clock>,
    /// Held by hall creation (exclusive), deletion (shared) and compaction
    /// (exclusive), so the compacted snapshot covers every registered hall.
    pub(super) registry: RwLock<()>,
}

/// Apply a booking event to a HallState (no locking — caller holds the lock).
fn apply_to_hall(hs: &mut HallState, event: &Event, index: &DashMap<Ulid, ResourceId>) {
    match event {
        Event::BookingRequested { reservation } => {
            hs.remove_reservation(reservation.id);
            index.insert(reservation.id, reservation.resource_id.clone());
            hs.insert_reservation(reservation.clone());
        }
        Event::BookingApproved { id, decided_by, .. } => {
            if let Some(r) = hs.get_mut(*id) {
                r.status = BookingStatus::Approved;
                r.decided_by = decided_by.clone();
            }
        }
        Event::BookingRejected {
            id,
            decided_by,
            reason,
            ..
        } => {
            if let Some(r) = hs.get_mut(*id) {
                r.status = BookingStatus::Rejected;
                r.decided_by = decided_by.clone();
                r.rejection_reason = reason.clone();
            }
        }
        Event::BookingCancelled { id, .. } => {
            hs.remove_reservation(*id);
            index.remove(id);
        }
        // HallCreated/Deleted are handled at the DashMap level, not here
        Event::HallCreated { .. } | Event::HallDeleted { .. } => {}
    }
}

/// The hall a booking event belongs to (None for hall-level events).
fn event_hall(event: &Event) -> Option<&ResourceId> {
    match event {
        Event::BookingRequested { reservation } => Some(&reservation.resource_id),
        Event::BookingApproved { resource_id, .. }
        | Event::BookingRejected { resource_id, .. }
        | Event::BookingCancelled { resource_id, .. } => Some(resource_id),
        Event::HallCreated { .. } | Event::HallDeleted { .. } => None,
    }
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the group-commit writer.
    /// Must be called from inside a tokio runtime.
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (wal, events) = Wal::open_after_replay(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            booking_to_hall: DashMap::new(),
            clock,
            registry: RwLock::new(()),
        };

        // Replay runs before the engine is shared, so every HallState is owned
        // here and can be rebuilt without locks, then wrapped.
        let mut halls: std::collections::HashMap<ResourceId, HallState> =
            std::collections::HashMap::new();
        for event in &events {
            match event {
                Event::HallCreated { code, capacity } => {
                    if halls.contains_key(code) {
                        tracing::warn!("duplicate HallCreated for {code} in WAL, keeping the first");
                        continue;
                    }
                    halls.insert(
                        code.clone(),
                        HallState::new(Hall {
                            code: code.clone(),
                            capacity: *capacity,
                        }),
                    );
                }
                Event::HallDeleted { code } => {
                    if let Some(hs) = halls.remove(code) {
                        for r in &hs.reservations {
                            engine.booking_to_hall.remove(&r.id);
                        }
                    }
                }
                other => {
                    if let Some(code) = event_hall(other)
                        && let Some(hs) = halls.get_mut(code)
                    {
                        apply_to_hall(hs, other, &engine.booking_to_hall);
                    }
                }
            }
        }
        for (code, hs) in halls {
            engine.state.insert(code, Arc::new(RwLock::new(hs)));
        }

        tracing::info!(
            "replayed {} WAL events: {} halls, {} bookings",
            events.len(),
            engine.state.len(),
            engine.booking_to_hall.len()
        );
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

    pub fn get_hall_state(&self, code: &ResourceId) -> Option<SharedHallState> {
        self.state.get(code).map(|e| e.value().clone())
    }

    /// Whether `hs` is still the registered state for `code`. A caller that
    /// waited on the hall lock may find the hall deleted (or recreated) meanwhile.
    pub(super) fn is_registered(&self, code: &ResourceId, hs: &SharedHallState) -> bool {
        self.get_hall_state(code)
            .is_some_and(|current| Arc::ptr_eq(&current, hs))
    }

    pub fn get_hall_for_booking(&self, id: &Ulid) -> Option<ResourceId> {
        self.booking_to_hall.get(id).map(|e| e.value().clone())
    }

    /// Wall-clock "now" used for past-slot checks and the day view.
    pub fn now(&self) -> chrono::NaiveDateTime {
        self.clock.now()
    }

    /// Snapshot of every hall's shared state, taken without holding DashMap
    /// shard locks across an await.
    pub(super) fn hall_handles(&self) -> Vec<SharedHallState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }

    /// WAL-append then apply, under the caller's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        hs: &mut HallState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_hall(hs, event, &self.booking_to_hall);
        Ok(())
    }

    /// Lookup booking → hall, get hall, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        id: &Ulid,
    ) -> Result<(ResourceId, tokio::sync::OwnedRwLockWriteGuard<HallState>), EngineError> {
        let code = self
            .get_hall_for_booking(id)
            .ok_or(EngineError::BookingNotFound(*id))?;
        let hs = self
            .get_hall_state(&code)
            .ok_or(EngineError::BookingNotFound(*id))?;
        let guard = hs.clone().write_owned().await;
        if !self.is_registered(&code, &hs) || guard.get(*id).is_none() {
            return Err(EngineError::BookingNotFound(*id));
        }
        Ok((code, guard))
    }
}
