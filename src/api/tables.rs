use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::{BulkOutcome, EngineError};
use crate::layout::BulkTables;
use crate::model::{parse_positive, parse_time_str, NewTable, TableInfo, TablePatch};

use super::{detached, parse_id, ApiError, ApiJson, ApiResult, AppState};

#[derive(Serialize)]
pub struct TableResponse {
    message: &'static str,
    table: TableInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxTableNumber {
    max_table_number: u32,
}

#[derive(Serialize)]
pub struct BulkResponse {
    message: String,
    #[serde(flatten)]
    outcome: BulkOutcome,
}

#[derive(Deserialize)]
pub struct AvailableQuery {
    at: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<TableInfo>> {
    Json(state.engine.list_tables())
}

pub async fn list_active(State(state): State<AppState>) -> Json<Vec<TableInfo>> {
    Json(state.engine.list_active_tables())
}

pub async fn max_table_number(State(state): State<AppState>) -> Json<MaxTableNumber> {
    Json(MaxTableNumber {
        max_table_number: state.engine.max_table_number(),
    })
}

/// GET /tables/available/{capacity}?at=<time>
pub async fn available(
    State(state): State<AppState>,
    Path(capacity): Path<String>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Json<Vec<TableInfo>>> {
    let capacity = parse_positive(&serde_json::Value::String(capacity))
        .ok_or_else(|| ApiError::validation("capacity", "must be a positive integer"))?;
    let at = match query.at.as_deref() {
        Some(raw) => Some(parse_time_str(raw.trim()).ok_or_else(|| ApiError::validation("at", "unrecognized date"))?),
        None => None,
    };
    Ok(Json(state.engine.available_tables(capacity, at)))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<TableInfo>> {
    let id = parse_id(&id, EngineError::TableNotFound)?;
    Ok(Json(state.engine.get_table(id)?))
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTable>,
) -> ApiResult<(StatusCode, Json<TableResponse>)> {
    let engine = state.engine.clone();
    let table = detached(async move { engine.create_table(input).await }).await?;
    Ok((
        StatusCode::CREATED,
        Json(TableResponse {
            message: "Table created successfully",
            table,
        }),
    ))
}

pub async fn bulk_create(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BulkTables>,
) -> ApiResult<(StatusCode, Json<BulkResponse>)> {
    let engine = state.engine.clone();
    let outcome = detached(async move { engine.bulk_create_tables(req).await }).await?;
    let message = format!(
        "Created {} tables ({} failed)",
        outcome.created.len(),
        outcome.failed.len()
    );
    Ok((StatusCode::CREATED, Json(BulkResponse { message, outcome })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<TablePatch>,
) -> ApiResult<Json<TableResponse>> {
    let id = parse_id(&id, EngineError::TableNotFound)?;
    let engine = state.engine.clone();
    let table = detached(async move { engine.update_table(id, patch).await }).await?;
    Ok(Json(TableResponse {
        message: "Table updated successfully",
        table,
    }))
}

/// DELETE /tables/{id} only deactivates.
pub async fn deactivate(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<TableResponse>> {
    let id = parse_id(&id, EngineError::TableNotFound)?;
    let engine = state.engine.clone();
    let table = detached(async move { engine.deactivate_table(id).await }).await?;
    Ok(Json(TableResponse {
        message: "Table deactivated successfully",
        table,
    }))
}

pub async fn activate(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<TableResponse>> {
    let id = parse_id(&id, EngineError::TableNotFound)?;
    let engine = state.engine.clone();
    let table = detached(async move { engine.activate_table(id).await }).await?;
    Ok(Json(TableResponse {
        message: "Table activated successfully",
        table,
    }))
}
