use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthReport {
    status: &'static str,
    database: &'static str,
    tables: usize,
    reservations: usize,
    timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let connected = state.engine.is_store_connected();
    Json(HealthReport {
        status: "OK",
        database: if connected { "connected" } else { "disconnected" },
        tables: state.engine.table_count(),
        reservations: state.engine.reservation_count(),
        timestamp: crate::model::format_time(chrono::Utc::now().timestamp_millis()),
    })
}
