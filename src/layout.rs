//! Generated floor plans for bulk table creation and first-run seeding.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::model::{NewTable, TableLocation};

/// Seats per table and how many of each, for the balanced plan.
const BALANCED: [(u32, u32); 4] = [(2, 25), (4, 15), (6, 7), (8, 3)];

pub const DEFAULT_RANDOM_COUNT: u32 = 50;
pub const SEED_TABLES: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Balanced,
    Random,
}

/// Body of `POST /tables/bulk`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTables {
    #[serde(default)]
    pub layout: Layout,
    pub start_number: Option<Value>,
    /// Random layout only. Defaults to [`DEFAULT_RANDOM_COUNT`].
    pub count: Option<Value>,
}

/// One table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub table_number: u32,
    pub capacity: u32,
    pub location: TableLocation,
    pub features: Vec<String>,
}

impl TablePlan {
    fn new<R: Rng + ?Sized>(table_number: u32, capacity: u32, rng: &mut R) -> Self {
        let location = *TableLocation::ALL.choose(rng).unwrap_or(&TableLocation::Main);
        let tier = if capacity > 4 { "premium" } else { "standard" };
        Self {
            table_number,
            capacity,
            location,
            features: vec![tier.to_string()],
        }
    }

    pub fn into_new_table(self) -> NewTable {
        NewTable {
            table_number: Some(self.table_number.into()),
            capacity: Some(self.capacity.into()),
            location: Some(self.location),
            status: None,
            features: Some(self.features),
            is_active: Some(true),
        }
    }
}

/// 25 two-tops, 15 four-tops, 7 six-tops, 3 eight-tops.
pub fn balanced_layout<R: Rng + ?Sized>(start: u32, rng: &mut R) -> Vec<TablePlan> {
    let mut number = start;
    let mut plan = Vec::new();
    for (capacity, count) in BALANCED {
        for _ in 0..count {
            plan.push(TablePlan::new(number, capacity, rng));
            number += 1;
        }
    }
    plan
}

/// Mostly small tables: 60% seat 2, 20% seat 4, 15% seat 6, 5% seat 8.
pub fn random_layout<R: Rng + ?Sized>(start: u32, count: u32, rng: &mut R) -> Vec<TablePlan> {
    (0..count)
        .map(|i| {
            let roll: f64 = rng.gen_range(0.0..1.0);
            let capacity = if roll < 0.6 {
                2
            } else if roll < 0.8 {
                4
            } else if roll < 0.95 {
                6
            } else {
                8
            };
            TablePlan::new(start + i, capacity, rng)
        })
        .collect()
}

/// First-run floor: tables 1..=50, capacity by number.
pub fn seed_layout<R: Rng + ?Sized>(rng: &mut R) -> Vec<TablePlan> {
    (1..=SEED_TABLES)
        .map(|n| {
            let capacity = if n % 10 == 0 {
                8
            } else if n % 5 == 0 {
                6
            } else if n % 3 == 0 {
                4
            } else {
                2
            };
            TablePlan::new(n, capacity, rng)
        })
        .collect()
}
