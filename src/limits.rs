use crate::model::Ms;

pub const MAX_TABLES: usize = 10_000;
pub const MAX_RESERVATIONS: usize = 1_000_000;

pub const MAX_TABLE_NUMBER: u32 = 1_000_000;
pub const MAX_TABLE_CAPACITY: u32 = 100;
pub const MAX_FEATURES: usize = 16;
pub const MAX_FEATURE_LEN: usize = 64;
pub const MAX_BULK_TABLES: usize = 200;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PHONE_LEN: usize = 40;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_MESSAGE_LEN: usize = 4_096;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
