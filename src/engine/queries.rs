use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::availability::{effective_status, effective_status_at};
use super::store::{Filter, Sort};
use super::{Engine, EngineError};

impl Engine {
    /// Active reservations grouped by table number.
    fn active_by_table(&self) -> HashMap<u32, Vec<Reservation>> {
        let filter = Filter::new().is_in("status", ReservationStatus::ACTIVE.map(|s| s.as_str()));
        let mut by_table: HashMap<u32, Vec<Reservation>> = HashMap::new();
        for r in self.reservations.find(&filter, None) {
            by_table.entry(r.table_number).or_default().push(r);
        }
        by_table
    }

    pub(super) fn active_reservations_for(&self, table_number: u32) -> Vec<Reservation> {
        self.reservations
            .find(&super::conflict::active_filter(table_number, None), None)
    }

    pub fn table_info(&self, table: &Table) -> TableInfo {
        let active = self.active_reservations_for(table.table_number);
        TableInfo::new(table, effective_status(table, &active))
    }

    fn tables_with_status(&self, filter: &Filter) -> Vec<TableInfo> {
        let by_table = self.active_by_table();
        self.tables
            .find(filter, Some(Sort::asc("tableNumber")))
            .iter()
            .map(|t| {
                let active = by_table.get(&t.table_number).map_or(&[][..], Vec::as_slice);
                TableInfo::new(t, effective_status(t, active))
            })
            .collect()
    }

    /// Every table, active or not, by number.
    pub fn list_tables(&self) -> Vec<TableInfo> {
        self.tables_with_status(&Filter::new())
    }

    pub fn list_active_tables(&self) -> Vec<TableInfo> {
        self.tables_with_status(&Filter::new().eq("isActive", true))
    }

    pub fn get_table(&self, id: Ulid) -> Result<TableInfo, EngineError> {
        let table = self.tables.get(&id).ok_or(EngineError::TableNotFound(id))?;
        Ok(self.table_info(&table))
    }

    /// Active tables seating at least `capacity` whose effective status is
    /// available, either now or around `at`.
    pub fn available_tables(&self, capacity: u32, at: Option<Ms>) -> Vec<TableInfo> {
        let filter = Filter::new().eq("isActive", true).gte("capacity", capacity);
        let by_table = self.active_by_table();
        self.tables
            .find(&filter, Some(Sort::asc("tableNumber")))
            .iter()
            .filter_map(|t| {
                let active = by_table.get(&t.table_number).map_or(&[][..], Vec::as_slice);
                let status = match at {
                    Some(at) => effective_status_at(t, active, at),
                    None => effective_status(t, active),
                };
                (status == EffectiveStatus::Available).then(|| TableInfo::new(t, status))
            })
            .collect()
    }

    /// Highest number ever assigned, inactive tables included. 0 if none.
    pub fn max_table_number(&self) -> u32 {
        self.highest_table_number()
    }

    /// Newest created first.
    pub fn list_reservations(&self) -> Vec<ReservationInfo> {
        self.reservations
            .find(&Filter::new(), Some(Sort::desc("createdAt")))
            .iter()
            .map(ReservationInfo::from)
            .collect()
    }

    pub fn get_reservation(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        self.reservations
            .get(&id)
            .map(|r| ReservationInfo::from(&r))
            .ok_or(EngineError::ReservationNotFound(id))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}
