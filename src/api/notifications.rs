use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, FieldError};
use crate::limits::{MAX_MESSAGE_LEN, MAX_PHONE_LEN};
use crate::model::ReservationInfo;

use super::{detached, parse_id, ApiJson, ApiResult, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppRequest {
    phone: Option<String>,
    message: Option<String>,
    reservation_id: Option<String>,
}

#[derive(Serialize)]
pub struct WhatsAppAck {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reservation: Option<ReservationInfo>,
}

/// POST /notifications/whatsapp. Nothing is sent; the endpoint waits the
/// configured delay and acknowledges.
pub async fn whatsapp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<WhatsAppRequest>,
) -> ApiResult<Json<WhatsAppAck>> {
    let mut errors = Vec::new();
    let phone = req.phone.as_deref().map(str::trim).unwrap_or_default();
    if phone.is_empty() {
        errors.push(FieldError::new("phone", "is required"));
    } else if phone.len() > MAX_PHONE_LEN {
        errors.push(FieldError::new("phone", format!("must be at most {MAX_PHONE_LEN} characters")));
    }
    let message = req.message.as_deref().map(str::trim).unwrap_or_default();
    if message.is_empty() {
        errors.push(FieldError::new("message", "is required"));
    } else if message.len() > MAX_MESSAGE_LEN {
        errors.push(FieldError::new("message", format!("must be at most {MAX_MESSAGE_LEN} characters")));
    }
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors).into());
    }

    let reservation_id = match req.reservation_id.as_deref() {
        Some(raw) => {
            let id = parse_id(raw, EngineError::ReservationNotFound)?;
            state.engine.get_reservation(id)?;
            Some(id)
        }
        None => None,
    };

    tokio::time::sleep(state.notify_delay).await;
    tracing::info!(chars = message.len(), reservation = ?reservation_id, "simulated WhatsApp message acknowledged");

    let reservation = match reservation_id {
        Some(id) => {
            let engine = state.engine.clone();
            Some(detached(async move { engine.mark_reminder_sent(id).await }).await?)
        }
        None => None,
    };

    Ok(Json(WhatsAppAck {
        success: true,
        message: "Message sent successfully",
        reservation,
    }))
}
