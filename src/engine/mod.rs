mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
pub mod store;

pub use availability::{authoritative, effective_status, effective_status_at};
pub use conflict::{within_window, CONFLICT_WINDOW_MS};
pub use error::{EngineError, ErrorKind, FieldError};
pub use mutations::{BulkFailure, BulkOutcome};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{NotifyHub, Topic};
use crate::wal::Wal;

use store::{Collection, Filter};

// ── WAL writer task ──────────────────────────────────────

type Ack = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the log. Appends that queue up while a flush is in progress are
/// written together and share one fsync; every waiter gets the batch result.
/// A compaction request seen mid-drain runs right after that batch lands.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(first) = rx.recv().await {
        let mut batch: Vec<(Event, Ack)> = Vec::new();
        let mut next = Some(first);
        while let Some(cmd) = next.take() {
            match cmd {
                WalCommand::Append { event, response } => {
                    batch.push((event, response));
                    next = rx.try_recv().ok();
                }
                other => {
                    group_commit(&mut wal, &mut batch);
                    run_maintenance(&mut wal, other);
                }
            }
        }
        group_commit(&mut wal, &mut batch);
    }
    tracing::info!("WAL writer stopped");
}

fn group_commit(wal: &mut Wal, batch: &mut Vec<(Event, Ack)>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = write_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(events = batch.len(), "WAL flush failed: {e}");
    }
    for (_, ack) in batch.drain(..) {
        let copy = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(copy);
    }
}

/// The buffer is flushed even after a failed append, so a half-written
/// batch never leaks into the next one.
fn write_batch(wal: &mut Wal, batch: &[(Event, Ack)]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn run_maintenance(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => group_commit(wal, &mut vec![(event, response)]),
    }
}

/// The reservation engine: both collections, the table-number index, the
/// per-table write locks and the WAL writer handle.
pub struct Engine {
    pub tables: Collection<Table>,
    pub reservations: Collection<Reservation>,
    pub notify: Arc<NotifyHub>,
    /// tableNumber → table id. Entries are never removed.
    table_numbers: DashMap<u32, Ulid>,
    table_locks: DashMap<u32, Arc<Mutex<()>>>,
    /// Writers hold it shared across append+apply, compaction holds it
    /// exclusively so the snapshot it writes covers every logged event.
    commit_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
    #[cfg(test)]
    fail_writes: std::sync::atomic::AtomicBool,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            tables: Collection::new(),
            reservations: Collection::new(),
            notify,
            table_numbers: DashMap::new(),
            table_locks: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
            #[cfg(test)]
            fail_writes: std::sync::atomic::AtomicBool::new(false),
        };
        for event in &events {
            engine.apply_event(event);
        }
        tracing::info!(
            path = %wal_path.display(),
            events = events.len(),
            tables = engine.tables.len(),
            reservations = engine.reservations.len(),
            "store opened"
        );
        Ok(engine)
    }

    /// Apply a logged event to memory. Shared by replay and live writes.
    fn apply_event(&self, event: &Event) {
        match event {
            Event::TableCreated(table) | Event::TableUpdated(table) => {
                self.table_numbers.insert(table.table_number, table.id);
                let replace = table.clone();
                if self.tables.update_one(&Filter::by_id(table.id), |t| *t = replace).is_none() {
                    self.tables.insert(table.clone());
                }
            }
            Event::ReservationCreated(r) | Event::ReservationUpdated(r) => {
                let replace = r.clone();
                if self.reservations.update_one(&Filter::by_id(r.id), |d| *d = replace).is_none() {
                    self.reservations.insert(r.clone());
                }
            }
            Event::ReservationDeleted { id, .. } => {
                self.reservations.delete_one(&Filter::by_id(*id));
            }
            Event::Batch(events) => {
                for event in events {
                    self.apply_event(event);
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        #[cfg(test)]
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(EngineError::WalError("injected write failure".into()));
        }
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

    /// WAL-append then apply. The caller holds the affected table locks.
    pub(super) async fn persist(&self, event: Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(&event).await?;
        self.apply_event(&event);
        Ok(())
    }

    /// False once the WAL writer task has gone away.
    pub fn is_store_connected(&self) -> bool {
        !self.wal_tx.is_closed()
    }

    pub fn table_by_number(&self, table_number: u32) -> Option<Table> {
        let id = *self.table_numbers.get(&table_number)?;
        self.tables.get(&id)
    }

    pub(super) fn number_taken(&self, table_number: u32) -> bool {
        self.table_numbers.contains_key(&table_number)
    }

    pub(super) fn highest_table_number(&self) -> u32 {
        self.table_numbers.iter().map(|e| *e.key()).max().unwrap_or(0)
    }

    /// Serialize writers on one table number.
    pub(super) async fn lock_table(&self, table_number: u32) -> OwnedMutexGuard<()> {
        let lock = self
            .table_locks
            .entry(table_number)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Lock several table numbers in ascending order.
    pub(super) async fn lock_tables(&self, numbers: &[u32]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted = numbers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for n in sorted {
            guards.push(self.lock_table(n).await);
        }
        guards
    }

    /// Lock the table a reservation currently sits on, plus `also`, and
    /// return the reservation as read under the locks.
    pub(super) async fn lock_reservation(
        &self,
        id: Ulid,
        also: Option<u32>,
    ) -> Result<(Reservation, Vec<OwnedMutexGuard<()>>), EngineError> {
        loop {
            let seen = self.reservations.get(&id).ok_or(EngineError::ReservationNotFound(id))?;
            let mut numbers = vec![seen.table_number];
            numbers.extend(also);
            let guards = self.lock_tables(&numbers).await;
            let current = self.reservations.get(&id).ok_or(EngineError::ReservationNotFound(id))?;
            if current.table_number == seen.table_number {
                return Ok((current, guards));
            }
            // Moved while we waited; retry against the new table.
        }
    }

    // ── Change broadcasting ─────────────────────────────────

    /// Publish a fresh snapshot on each topic that has listeners.
    pub(super) fn publish(&self, topics: &[Topic]) {
        for &topic in topics {
            if !self.notify.has_subscribers(topic) {
                continue;
            }
            match self.snapshot_frame(topic) {
                Ok(frame) => {
                    self.notify.send(topic, frame);
                }
                Err(e) => tracing::warn!(topic = topic.name(), "snapshot encoding failed: {e}"),
            }
        }
    }

    /// `{"topic": ..., "data": [...]}` for the current state of `topic`.
    pub fn snapshot_frame(&self, topic: Topic) -> Result<Arc<str>, serde_json::Error> {
        #[derive(Serialize)]
        struct Frame<'a, T: Serialize> {
            topic: &'a str,
            data: T,
        }
        let json = match topic {
            Topic::Tables => serde_json::to_string(&Frame {
                topic: topic.name(),
                data: self.list_active_tables(),
            })?,
            Topic::Reservations => serde_json::to_string(&Frame {
                topic: topic.name(),
                data: self.list_reservations(),
            })?,
        };
        Ok(Arc::from(json))
    }
}
