use std::cmp::Ordering;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// A field value as seen by filters and sorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
}

impl Value {
    /// Ordering is only defined between values of the same kind.
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Ulid> for Value {
    fn from(v: Ulid) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A record stored in a [`Collection`], addressable by camelCase field name.
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> Ulid;
    fn field(&self, name: &str) -> Value;
}

impl Document for Table {
    fn id(&self) -> Ulid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "tableNumber" => self.table_number.into(),
            "capacity" => self.capacity.into(),
            "location" => self.location.as_str().into(),
            "status" => self.status.as_str().into(),
            "isActive" => self.is_active.into(),
            _ => Value::Null,
        }
    }
}

impl Document for Reservation {
    fn id(&self) -> Ulid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "tableNumber" => self.table_number.into(),
            "clientName" => self.client_name.as_str().into(),
            "clientPhone" => self.client_phone.as_str().into(),
            "guestCount" => self.guest_count.into(),
            "reservationTime" => self.reservation_time.into(),
            "checkInTime" => self.check_in_time.into(),
            "checkOutTime" => self.check_out_time.into(),
            "status" => self.status.as_str().into(),
            "reminderSent" => self.reminder_sent.into(),
            "createdAt" => self.created_at.into(),
            "updatedAt" => self.updated_at.into(),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
enum Cond {
    Eq(Value),
    Ne(Value),
    Gte(Value),
    Lte(Value),
    In(Vec<Value>),
}

impl Cond {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Cond::Eq(v) => actual == v,
            Cond::Ne(v) => actual != v,
            Cond::Gte(v) => matches!(actual.compare(v), Some(Ordering::Greater | Ordering::Equal)),
            Cond::Lte(v) => matches!(actual.compare(v), Some(Ordering::Less | Ordering::Equal)),
            Cond::In(vs) => vs.contains(actual),
        }
    }
}

/// Conjunction of per-field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<(&'static str, Cond)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Ulid) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, field: &'static str, v: impl Into<Value>) -> Self {
        self.conds.push((field, Cond::Eq(v.into())));
        self
    }

    pub fn ne(mut self, field: &'static str, v: impl Into<Value>) -> Self {
        self.conds.push((field, Cond::Ne(v.into())));
        self
    }

    pub fn gte(mut self, field: &'static str, v: impl Into<Value>) -> Self {
        self.conds.push((field, Cond::Gte(v.into())));
        self
    }

    pub fn lte(mut self, field: &'static str, v: impl Into<Value>) -> Self {
        self.conds.push((field, Cond::Lte(v.into())));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &'static str, vs: impl IntoIterator<Item = V>) -> Self {
        self.conds.push((field, Cond::In(vs.into_iter().map(Into::into).collect())));
        self
    }

    pub fn matches<D: Document>(&self, doc: &D) -> bool {
        self.conds.iter().all(|(field, cond)| cond.matches(&doc.field(field)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sort {
    field: &'static str,
    descending: bool,
}

impl Sort {
    pub fn asc(field: &'static str) -> Self {
        Self { field, descending: false }
    }

    pub fn desc(field: &'static str) -> Self {
        Self { field, descending: true }
    }

    /// Ties (and values of mismatched kinds) fall back to id order in the
    /// same direction.
    fn compare<D: Document>(&self, a: &D, b: &D) -> Ordering {
        let ord = a
            .field(self.field)
            .compare(&b.field(self.field))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id().cmp(&b.id()));
        if self.descending { ord.reverse() } else { ord }
    }
}

/// In-memory document collection. Writers are expected to hold the owning
/// table's lock; readers never block.
pub struct Collection<D: Document> {
    docs: DashMap<Ulid, D>,
}

impl<D: Document> Default for Collection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> Collection<D> {
    pub fn new() -> Self {
        Self { docs: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<D> {
        self.docs.get(id).map(|e| e.value().clone())
    }

    pub fn find(&self, filter: &Filter, sort: Option<Sort>) -> Vec<D> {
        let mut out: Vec<D> = self
            .docs
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        match sort {
            Some(sort) => out.sort_by(|a, b| sort.compare(a, b)),
            None => out.sort_by_key(|d| d.id()),
        }
        out
    }

    /// First match in id order.
    pub fn find_one(&self, filter: &Filter) -> Option<D> {
        self.docs
            .iter()
            .filter(|e| filter.matches(e.value()))
            .min_by_key(|e| *e.key())
            .map(|e| e.value().clone())
    }

    /// Insert or replace by id.
    pub fn insert(&self, doc: D) {
        self.docs.insert(doc.id(), doc);
    }

    /// Patch the first match in place and return the updated document.
    pub fn update_one(&self, filter: &Filter, patch: impl FnOnce(&mut D)) -> Option<D> {
        let id = self.find_one(filter)?.id();
        let mut entry = self.docs.get_mut(&id)?;
        patch(entry.value_mut());
        Some(entry.value().clone())
    }

    pub fn delete_one(&self, filter: &Filter) -> Option<D> {
        let id = self.find_one(filter)?.id();
        self.docs.remove(&id).map(|(_, doc)| doc)
    }
}
