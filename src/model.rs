use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use ulid::Ulid;

/// Unix milliseconds, the only time type inside the engine.
pub type Ms = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLocation {
    #[default]
    Main,
    Terrace,
    Vip,
}

impl TableLocation {
    pub const ALL: [TableLocation; 3] = [TableLocation::Main, TableLocation::Terrace, TableLocation::Vip];

    pub fn as_str(self) -> &'static str {
        match self {
            TableLocation::Main => "main",
            TableLocation::Terrace => "terrace",
            TableLocation::Vip => "vip",
        }
    }
}

/// Stored status hint on a table. Authoritative occupancy is derived from
/// reservations, see [`EffectiveStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    #[default]
    Available,
    Reserved,
    Occupied,
}

impl TableStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Reserved => "reserved",
            TableStatus::Occupied => "occupied",
        }
    }
}

/// Live status of a table computed from its active reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveStatus {
    Available,
    Reserved,
    Occupied,
    Inactive,
}

impl EffectiveStatus {
    /// The stored hint matching this status. `None` for inactive tables,
    /// whose hint is left untouched.
    pub fn as_stored(self) -> Option<TableStatus> {
        match self {
            EffectiveStatus::Available => Some(TableStatus::Available),
            EffectiveStatus::Reserved => Some(TableStatus::Reserved),
            EffectiveStatus::Occupied => Some(TableStatus::Occupied),
            EffectiveStatus::Inactive => None,
        }
    }
}

/// Reservation state machine:
///
/// ```text
/// reserved ──▶ checked-in ──▶ checked-out
///    │             │
///    └──────┬──────┘
///           ▼
///       cancelled
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationStatus {
    #[default]
    Reserved,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl ReservationStatus {
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Reserved, ReservationStatus::CheckedIn];

    /// Reserved or checked-in: the reservation still holds its table.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Reserved | ReservationStatus::CheckedIn)
    }

    /// Re-setting the current status is always allowed (no-op).
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        self == next
            || matches!(
                (self, next),
                (Reserved, CheckedIn) | (Reserved, Cancelled) | (CheckedIn, CheckedOut) | (CheckedIn, Cancelled)
            )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::CheckedIn => "checked-in",
            ReservationStatus::CheckedOut => "checked-out",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    /// Unique over the lifetime of the store, inactive tables included.
    pub table_number: u32,
    pub capacity: u32,
    pub location: TableLocation,
    pub status: TableStatus,
    pub features: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// Back-reference to a table by number, not by id.
    pub table_number: u32,
    pub client_name: String,
    pub client_phone: String,
    pub guest_count: u32,
    pub reservation_time: Ms,
    pub check_in_time: Option<Ms>,
    pub check_out_time: Option<Ms>,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub reminder_sent: bool,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// One logged store change. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TableCreated(Table),
    TableUpdated(Table),
    ReservationCreated(Reservation),
    ReservationUpdated(Reservation),
    ReservationDeleted { id: Ulid, table_number: u32 },
    /// Changes that land or fail together as one record.
    Batch(Vec<Event>),
}

impl Event {
    /// One record for `events`: the event itself when there is only one.
    pub fn batch(mut events: Vec<Event>) -> Event {
        if events.len() == 1
            && let Some(only) = events.pop()
        {
            return only;
        }
        Event::Batch(events)
    }
}

// ── Request payloads ─────────────────────────────────────────────
//
// Numbers and timestamps arrive as raw JSON values so that malformed input
// is reported per field instead of failing the whole body.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTable {
    pub table_number: Option<Value>,
    pub capacity: Option<Value>,
    pub location: Option<TableLocation>,
    pub status: Option<TableStatus>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePatch {
    pub table_number: Option<Value>,
    pub capacity: Option<Value>,
    pub location: Option<TableLocation>,
    pub status: Option<TableStatus>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub table_number: Option<Value>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub guest_count: Option<Value>,
    pub reservation_time: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPatch {
    pub table_number: Option<Value>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub guest_count: Option<Value>,
    pub reservation_time: Option<Value>,
    pub status: Option<ReservationStatus>,
    pub notes: Option<String>,
    pub reminder_sent: Option<bool>,
}

/// Positive integer from a JSON number or a numeric string.
pub fn parse_positive(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).filter(|v| *v > 0),
        Value::String(s) => s.trim().parse::<u32>().ok().filter(|v| *v > 0),
        _ => None,
    }
}

/// Timestamp from integer milliseconds, RFC 3339, or a zone-less
/// `YYYY-MM-DDTHH:MM[:SS]` (read as UTC).
pub fn parse_time(value: &Value) -> Option<Ms> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    }
}

pub fn parse_time_str(s: &str) -> Option<Ms> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| naive.and_utc().timestamp_millis())
    })
}

pub fn format_time(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

fn ser_time<S: Serializer>(ms: &Ms, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_time(*ms))
}

fn ser_opt_time<S: Serializer>(ms: &Option<Ms>, s: S) -> Result<S::Ok, S::Error> {
    match ms {
        Some(ms) => s.serialize_str(&format_time(*ms)),
        None => s.serialize_none(),
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: Ulid,
    pub table_number: u32,
    pub capacity: u32,
    pub location: TableLocation,
    pub status: TableStatus,
    pub effective_status: EffectiveStatus,
    pub features: Vec<String>,
    pub is_active: bool,
}

impl TableInfo {
    pub fn new(table: &Table, effective_status: EffectiveStatus) -> Self {
        Self {
            id: table.id,
            table_number: table.table_number,
            capacity: table.capacity,
            location: table.location,
            status: table.status,
            effective_status,
            features: table.features.clone(),
            is_active: table.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationInfo {
    pub id: Ulid,
    pub table_number: u32,
    pub client_name: String,
    pub client_phone: String,
    pub guest_count: u32,
    #[serde(serialize_with = "ser_time")]
    pub reservation_time: Ms,
    #[serde(serialize_with = "ser_opt_time", skip_serializing_if = "Option::is_none")]
    pub check_in_time: Option<Ms>,
    #[serde(serialize_with = "ser_opt_time", skip_serializing_if = "Option::is_none")]
    pub check_out_time: Option<Ms>,
    pub status: ReservationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub reminder_sent: bool,
    #[serde(serialize_with = "ser_time")]
    pub created_at: Ms,
    #[serde(serialize_with = "ser_time")]
    pub updated_at: Ms,
}

impl From<&Reservation> for ReservationInfo {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            table_number: r.table_number,
            client_name: r.client_name.clone(),
            client_phone: r.client_phone.clone(),
            guest_count: r.guest_count,
            reservation_time: r.reservation_time,
            check_in_time: r.check_in_time,
            check_out_time: r.check_out_time,
            status: r.status,
            notes: r.notes.clone(),
            reminder_sent: r.reminder_sent,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
