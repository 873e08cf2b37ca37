use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::engine::EngineError;
use crate::model::{NewReservation, ReservationInfo, ReservationPatch};

use super::{detached, parse_id, ApiJson, ApiResult, AppState};

#[derive(Serialize)]
pub struct ReservationResponse {
    message: &'static str,
    reservation: ReservationInfo,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// GET /reservations, newest first.
pub async fn list(State(state): State<AppState>) -> Json<Vec<ReservationInfo>> {
    Json(state.engine.list_reservations())
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<ReservationInfo>> {
    let id = parse_id(&id, EngineError::ReservationNotFound)?;
    Ok(Json(state.engine.get_reservation(id)?))
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewReservation>,
) -> ApiResult<(StatusCode, Json<ReservationResponse>)> {
    let engine = state.engine.clone();
    let reservation = detached(async move { engine.create_reservation(input).await }).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            message: "Reservation created successfully",
            reservation,
        }),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ReservationPatch>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id, EngineError::ReservationNotFound)?;
    let engine = state.engine.clone();
    let reservation = detached(async move { engine.update_reservation(id, patch).await }).await?;
    Ok(Json(ReservationResponse {
        message: "Reservation updated successfully",
        reservation,
    }))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<MessageResponse>> {
    let id = parse_id(&id, EngineError::ReservationNotFound)?;
    let engine = state.engine.clone();
    detached(async move { engine.delete_reservation(id).await }).await?;
    Ok(Json(MessageResponse {
        message: "Reservation deleted successfully",
    }))
}
