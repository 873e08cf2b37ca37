use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::layout::{self, BulkTables, Layout, TablePlan};
use crate::limits::*;
use crate::model::*;
use crate::notify::Topic;

use super::availability::{effective_status, effective_status_at};
use super::conflict::{check_no_conflict, now_ms, validate_time};
use super::error::FieldError;
use super::store::{Filter, Sort};
use super::{Engine, EngineError, WalCommand};

/// Collects per-field input errors so a request reports all of them at once.
#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn positive(&mut self, field: &'static str, value: Option<&Value>, max: u32) -> Option<u32> {
        let Some(value) = value else {
            self.push(field, "is required");
            return None;
        };
        match parse_positive(value) {
            Some(n) if n <= max => Some(n),
            Some(_) => {
                self.push(field, format!("must be at most {max}"));
                None
            }
            None => {
                self.push(field, "must be a positive integer");
                None
            }
        }
    }

    fn optional_positive(&mut self, field: &'static str, value: Option<&Value>, max: u32) -> Option<u32> {
        value.and_then(|v| self.positive(field, Some(v), max))
    }

    fn text(&mut self, field: &'static str, value: Option<&str>, max_len: usize) -> Option<String> {
        match value.map(str::trim) {
            None | Some("") => {
                self.push(field, "is required");
                None
            }
            Some(s) if s.len() > max_len => {
                self.push(field, format!("must be at most {max_len} characters"));
                None
            }
            Some(s) => Some(s.to_string()),
        }
    }

    fn optional_text(&mut self, field: &'static str, value: Option<&str>, max_len: usize) -> Option<String> {
        value.and_then(|v| self.text(field, Some(v), max_len))
    }

    /// Blank notes normalize to none.
    fn notes(&mut self, value: Option<&str>) -> Option<String> {
        let s = value?.trim();
        if s.len() > MAX_NOTES_LEN {
            self.push("notes", format!("must be at most {MAX_NOTES_LEN} characters"));
            return None;
        }
        (!s.is_empty()).then(|| s.to_string())
    }

    /// Trimmed, blanks dropped, duplicates removed in first-seen order.
    fn features(&mut self, value: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for f in &value {
            let f = f.trim();
            if f.is_empty() {
                continue;
            }
            if f.len() > MAX_FEATURE_LEN {
                self.push("features", format!("entries must be at most {MAX_FEATURE_LEN} characters"));
                continue;
            }
            if !out.iter().any(|seen| seen == f) {
                out.push(f.to_string());
            }
        }
        if out.len() > MAX_FEATURES {
            self.push("features", format!("at most {MAX_FEATURES} features"));
        }
        out
    }

    fn finish(self) -> Result<(), EngineError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(self.errors))
        }
    }

    fn into_error(self) -> EngineError {
        EngineError::Validation(self.errors)
    }
}

/// Result of a bulk table creation. Failures don't stop the batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub created: Vec<TableInfo>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub table_number: u32,
    pub code: &'static str,
    pub message: String,
}

impl Engine {
    // ── Tables ───────────────────────────────────────────────

    pub async fn create_table(&self, input: NewTable) -> Result<TableInfo, EngineError> {
        let table = self.insert_table(input).await?;
        self.publish(&[Topic::Tables]);
        Ok(self.table_info(&table))
    }

    /// Validate, claim the number and persist. No broadcast.
    async fn insert_table(&self, input: NewTable) -> Result<Table, EngineError> {
        let mut check = Checker::default();
        let number = check.positive("tableNumber", input.table_number.as_ref(), MAX_TABLE_NUMBER);
        let capacity = check.positive("capacity", input.capacity.as_ref(), MAX_TABLE_CAPACITY);
        let features = check.features(input.features.unwrap_or_default());
        let (Some(table_number), Some(capacity)) = (number, capacity) else {
            return Err(check.into_error());
        };
        check.finish()?;

        if self.tables.len() >= MAX_TABLES {
            return Err(EngineError::LimitExceeded("too many tables"));
        }

        let guard = self.lock_table(table_number).await;
        if self.number_taken(table_number) {
            return Err(EngineError::DuplicateTableNumber(table_number));
        }
        let table = Table {
            id: Ulid::new(),
            table_number,
            capacity,
            location: input.location.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            features,
            is_active: input.is_active.unwrap_or(true),
        };
        self.persist(Event::TableCreated(table.clone())).await?;
        drop(guard);

        tracing::info!(table_number, capacity, location = table.location.as_str(), "table created");
        Ok(table)
    }

    pub async fn update_table(&self, id: Ulid, patch: TablePatch) -> Result<TableInfo, EngineError> {
        let seen = self.tables.get(&id).ok_or(EngineError::TableNotFound(id))?;

        let mut check = Checker::default();
        if let Some(v) = patch.table_number.as_ref()
            && parse_positive(v) != Some(seen.table_number)
        {
            check.push("tableNumber", "cannot be changed");
        }
        let capacity = check.optional_positive("capacity", patch.capacity.as_ref(), MAX_TABLE_CAPACITY);
        let features = patch.features.map(|f| check.features(f));
        check.finish()?;

        let guard = self.lock_table(seen.table_number).await;
        let mut table = self.tables.get(&id).ok_or(EngineError::TableNotFound(id))?;
        if let Some(capacity) = capacity {
            table.capacity = capacity;
        }
        if let Some(location) = patch.location {
            table.location = location;
        }
        if let Some(status) = patch.status {
            table.status = status;
        }
        if let Some(features) = features {
            table.features = features;
        }
        if let Some(is_active) = patch.is_active {
            table.is_active = is_active;
        }
        self.persist(Event::TableUpdated(table.clone())).await?;
        drop(guard);

        tracing::info!(table_number = table.table_number, "table updated");
        self.publish(&[Topic::Tables]);
        Ok(self.table_info(&table))
    }

    /// Soft delete. The number stays claimed.
    pub async fn deactivate_table(&self, id: Ulid) -> Result<TableInfo, EngineError> {
        self.set_table_active(id, false).await
    }

    /// Reactivate and reset the stored status to available.
    pub async fn activate_table(&self, id: Ulid) -> Result<TableInfo, EngineError> {
        self.set_table_active(id, true).await
    }

    async fn set_table_active(&self, id: Ulid, active: bool) -> Result<TableInfo, EngineError> {
        let seen = self.tables.get(&id).ok_or(EngineError::TableNotFound(id))?;
        let guard = self.lock_table(seen.table_number).await;
        let mut table = self.tables.get(&id).ok_or(EngineError::TableNotFound(id))?;
        table.is_active = active;
        if active {
            table.status = TableStatus::Available;
        }
        self.persist(Event::TableUpdated(table.clone())).await?;
        drop(guard);

        tracing::info!(table_number = table.table_number, active, "table activation changed");
        self.publish(&[Topic::Tables]);
        Ok(self.table_info(&table))
    }

    /// Create a generated floor plan starting at `startNumber`, or right
    /// after the highest number in use.
    pub async fn bulk_create_tables(&self, req: BulkTables) -> Result<BulkOutcome, EngineError> {
        let mut check = Checker::default();
        let start = check.optional_positive("startNumber", req.start_number.as_ref(), MAX_TABLE_NUMBER);
        let count = check.optional_positive("count", req.count.as_ref(), MAX_BULK_TABLES as u32);
        check.finish()?;

        let start = start.unwrap_or_else(|| self.highest_table_number() + 1);
        let plan = {
            let mut rng = rand::thread_rng();
            match req.layout {
                Layout::Balanced => layout::balanced_layout(start, &mut rng),
                Layout::Random => {
                    layout::random_layout(start, count.unwrap_or(layout::DEFAULT_RANDOM_COUNT), &mut rng)
                }
            }
        };

        let outcome = self.insert_plan(plan).await;
        tracing::info!(
            layout = ?req.layout,
            start,
            created = outcome.created.len(),
            failed = outcome.failed.len(),
            "bulk table creation"
        );
        if !outcome.created.is_empty() {
            self.publish(&[Topic::Tables]);
        }
        Ok(outcome)
    }

    async fn insert_plan(&self, plan: Vec<TablePlan>) -> BulkOutcome {
        let mut created = Vec::new();
        let mut failed = Vec::new();
        for entry in plan {
            let table_number = entry.table_number;
            match self.insert_table(entry.into_new_table()).await {
                Ok(table) => created.push(self.table_info(&table)),
                Err(e) => {
                    tracing::debug!(table_number, "bulk entry skipped: {e}");
                    failed.push(BulkFailure {
                        table_number,
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
        }
        BulkOutcome { created, failed }
    }

    /// Seed the default 50-table floor into an empty store. Returns how
    /// many tables were created.
    pub async fn seed_tables_if_empty(&self) -> usize {
        if !self.tables.is_empty() {
            return 0;
        }
        let plan = {
            let mut rng = rand::thread_rng();
            layout::seed_layout(&mut rng)
        };
        let outcome = self.insert_plan(plan).await;
        for failure in &outcome.failed {
            tracing::warn!(table_number = failure.table_number, "seed table skipped: {}", failure.message);
        }
        self.publish(&[Topic::Tables]);
        outcome.created.len()
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn create_reservation(&self, input: NewReservation) -> Result<ReservationInfo, EngineError> {
        let result = self.try_create_reservation(input).await;
        match &result {
            Ok(r) => {
                metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
                tracing::info!(id = %r.id, table_number = r.table_number, "reservation created");
            }
            Err(e) => {
                metrics::counter!(crate::observability::RESERVATIONS_REJECTED_TOTAL, "reason" => e.code())
                    .increment(1);
                tracing::debug!(code = e.code(), "reservation rejected: {e}");
            }
        }
        result
    }

    /// Check order: fields, table, time, capacity, occupancy gate, window.
    async fn try_create_reservation(&self, input: NewReservation) -> Result<ReservationInfo, EngineError> {
        let mut check = Checker::default();
        let table_number = check.positive("tableNumber", input.table_number.as_ref(), MAX_TABLE_NUMBER);
        let client_name = check.text("clientName", input.client_name.as_deref(), MAX_NAME_LEN);
        let client_phone = check.text("clientPhone", input.client_phone.as_deref(), MAX_PHONE_LEN);
        let guest_count = check.positive("guestCount", input.guest_count.as_ref(), MAX_TABLE_CAPACITY);
        if input.reservation_time.is_none() {
            check.push("reservationTime", "is required");
        }
        let notes = check.notes(input.notes.as_deref());
        let (Some(table_number), Some(client_name), Some(client_phone), Some(guest_count), Some(raw_time)) =
            (table_number, client_name, client_phone, guest_count, input.reservation_time)
        else {
            return Err(check.into_error());
        };
        check.finish()?;

        if self.reservations.len() >= MAX_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }

        // Numbers are never released, so an unknown one can be refused unlocked.
        if !self.number_taken(table_number) {
            return Err(EngineError::TableNotFoundOrInactive(table_number));
        }
        let guard = self.lock_table(table_number).await;
        let table = self
            .table_by_number(table_number)
            .filter(|t| t.is_active)
            .ok_or(EngineError::TableNotFoundOrInactive(table_number))?;

        let now = now_ms();
        let time = parse_time(&raw_time)
            .ok_or_else(|| EngineError::InvalidReservationTime("unrecognized date".into()))?;
        validate_time(time)?;
        if time <= now {
            return Err(EngineError::InvalidReservationTime("must be in the future".into()));
        }
        if guest_count > table.capacity {
            return Err(EngineError::GuestCountExceedsCapacity {
                guest_count,
                capacity: table.capacity,
            });
        }
        let active = self.active_reservations_for(table_number);
        if effective_status_at(&table, &active, time) == EffectiveStatus::Occupied {
            return Err(EngineError::TableUnavailable(table_number));
        }
        check_no_conflict(&self.reservations, table_number, time, None)?;

        let reservation = Reservation {
            id: Ulid::new(),
            table_number,
            client_name,
            client_phone,
            guest_count,
            reservation_time: time,
            check_in_time: None,
            check_out_time: None,
            status: ReservationStatus::Reserved,
            notes,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        };
        let mut events = vec![Event::ReservationCreated(reservation.clone())];
        if table.status != TableStatus::Reserved {
            let status = TableStatus::Reserved;
            events.push(Event::TableUpdated(Table { status, ..table }));
        }
        self.persist(Event::batch(events)).await?;
        drop(guard);

        self.publish(&[Topic::Tables, Topic::Reservations]);
        Ok(ReservationInfo::from(&reservation))
    }

    /// Patch a reservation. Status changes follow the state machine; a
    /// changed time or table is re-checked while the reservation is active.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<ReservationInfo, EngineError> {
        let mut check = Checker::default();
        let move_to = check.optional_positive("tableNumber", patch.table_number.as_ref(), MAX_TABLE_NUMBER);
        let client_name = check.optional_text("clientName", patch.client_name.as_deref(), MAX_NAME_LEN);
        let client_phone = check.optional_text("clientPhone", patch.client_phone.as_deref(), MAX_PHONE_LEN);
        let guest_count = check.optional_positive("guestCount", patch.guest_count.as_ref(), MAX_TABLE_CAPACITY);
        let notes = check.notes(patch.notes.as_deref());
        check.finish()?;
        let new_time = match patch.reservation_time.as_ref() {
            Some(v) => {
                let t = parse_time(v)
                    .ok_or_else(|| EngineError::InvalidReservationTime("unrecognized date".into()))?;
                validate_time(t)?;
                Some(t)
            }
            None => None,
        };

        // Refuse unknown destinations before locking them. A missing
        // reservation still reports not found from `lock_reservation`.
        if let Some(n) = move_to
            && !self.number_taken(n)
            && self.reservations.get(&id).is_some()
        {
            return Err(EngineError::TableNotFoundOrInactive(n));
        }

        let (current, guards) = self.lock_reservation(id, move_to).await?;
        let now = now_ms();
        let mut next = current.clone();

        if let Some(status) = patch.status {
            if !current.status.can_transition_to(status) {
                return Err(EngineError::InvalidTransition {
                    from: current.status,
                    to: status,
                });
            }
            if status != current.status {
                match status {
                    ReservationStatus::CheckedIn => next.check_in_time = Some(now),
                    ReservationStatus::CheckedOut => next.check_out_time = Some(now),
                    ReservationStatus::Reserved | ReservationStatus::Cancelled => {}
                }
                next.status = status;
            }
        }
        if let Some(name) = client_name {
            next.client_name = name;
        }
        if let Some(phone) = client_phone {
            next.client_phone = phone;
        }
        if let Some(guests) = guest_count {
            next.guest_count = guests;
        }
        if patch.notes.is_some() {
            next.notes = notes;
        }
        if let Some(sent) = patch.reminder_sent {
            next.reminder_sent = sent;
        }
        if let Some(t) = new_time {
            next.reservation_time = t;
        }
        if let Some(n) = move_to {
            next.table_number = n;
        }

        let moved = next.table_number != current.table_number;
        let rescheduled = next.reservation_time != current.reservation_time;
        if next.status.is_active() && (moved || rescheduled || next.guest_count != current.guest_count) {
            self.check_placement(&next, moved, rescheduled, now)?;
        }

        next.updated_at = now;
        let mut events = vec![Event::ReservationUpdated(next.clone())];
        if moved || next.status != current.status {
            events.extend(self.status_updates(&next, &[current.table_number, next.table_number]));
        }
        self.persist(Event::batch(events)).await?;
        drop(guards);

        tracing::info!(
            %id,
            table_number = next.table_number,
            status = next.status.as_str(),
            "reservation updated"
        );
        self.publish(&[Topic::Tables, Topic::Reservations]);
        Ok(ReservationInfo::from(&next))
    }

    /// Re-run the creation rules for an edited, still-active reservation.
    fn check_placement(&self, next: &Reservation, moved: bool, rescheduled: bool, now: Ms) -> Result<(), EngineError> {
        if rescheduled && next.reservation_time <= now {
            return Err(EngineError::InvalidReservationTime("must be in the future".into()));
        }
        let table = self.table_by_number(next.table_number);
        let table = match table {
            Some(t) if t.is_active || !moved => t,
            _ if moved => return Err(EngineError::TableNotFoundOrInactive(next.table_number)),
            // Table gone from under an existing reservation; nothing to check against.
            _ => return Ok(()),
        };
        if next.guest_count > table.capacity {
            return Err(EngineError::GuestCountExceedsCapacity {
                guest_count: next.guest_count,
                capacity: table.capacity,
            });
        }
        if moved || rescheduled {
            let others: Vec<Reservation> = self
                .active_reservations_for(next.table_number)
                .into_iter()
                .filter(|r| r.id != next.id)
                .collect();
            if effective_status_at(&table, &others, next.reservation_time) == EffectiveStatus::Occupied {
                return Err(EngineError::TableUnavailable(next.table_number));
            }
            check_no_conflict(&self.reservations, next.table_number, next.reservation_time, Some(next.id))?;
        }
        Ok(())
    }

    /// Stored-status corrections for `numbers` once `changed` replaces its
    /// logged version. The caller holds the table locks.
    fn status_updates(&self, changed: &Reservation, numbers: &[u32]) -> Vec<Event> {
        let mut numbers = numbers.to_vec();
        numbers.dedup();
        let mut events = Vec::new();
        for n in numbers {
            let Some(table) = self.table_by_number(n) else {
                continue;
            };
            let mut active: Vec<Reservation> = self
                .active_reservations_for(n)
                .into_iter()
                .filter(|r| r.id != changed.id)
                .collect();
            if changed.table_number == n && changed.status.is_active() {
                active.push(changed.clone());
            }
            if let Some(status) = effective_status(&table, &active).as_stored()
                && status != table.status
            {
                events.push(Event::TableUpdated(Table { status, ..table }));
            }
        }
        events
    }

    /// Hard delete. The table's stored status goes back to available
    /// regardless of other reservations.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        let (current, guards) = self.lock_reservation(id, None).await?;
        let mut events = vec![Event::ReservationDeleted {
            id,
            table_number: current.table_number,
        }];
        if let Some(table) = self.table_by_number(current.table_number)
            && table.status != TableStatus::Available
        {
            let status = TableStatus::Available;
            events.push(Event::TableUpdated(Table { status, ..table }));
        }
        self.persist(Event::batch(events)).await?;
        drop(guards);

        tracing::info!(%id, table_number = current.table_number, "reservation deleted");
        self.publish(&[Topic::Tables, Topic::Reservations]);
        Ok(ReservationInfo::from(&current))
    }

    pub async fn mark_reminder_sent(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        let (mut reservation, guards) = self.lock_reservation(id, None).await?;
        reservation.reminder_sent = true;
        reservation.updated_at = now_ms();
        self.persist(Event::ReservationUpdated(reservation.clone())).await?;
        drop(guards);

        self.publish(&[Topic::Reservations]);
        Ok(ReservationInfo::from(&reservation))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with one create event per live record.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .tables
            .find(&Filter::new(), Some(Sort::asc("tableNumber")))
            .into_iter()
            .map(Event::TableCreated)
            .collect();
        events.extend(
            self.reservations
                .find(&Filter::new(), Some(Sort::asc("createdAt")))
                .into_iter()
                .map(Event::ReservationCreated),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
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
