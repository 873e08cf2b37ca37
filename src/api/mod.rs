//! HTTP + WebSocket surface. Every route is served both at the root and
//! under `/api`.

mod error;
mod health;
mod notifications;
mod reservations;
mod tables;
mod ws;

pub use error::{ApiError, ApiJson, ApiResult};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{Engine, EngineError};
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub notify_delay: Duration,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: &Config) -> Self {
        Self {
            engine,
            notify_delay: config.notify_delay,
        }
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", get(reservations::list).post(reservations::create))
        .route(
            "/reservations/{id}",
            get(reservations::get_one)
                .put(reservations::update)
                .delete(reservations::remove),
        )
        .route("/tables", get(tables::list).post(tables::create))
        .route("/tables/max-table-number", get(tables::max_table_number))
        .route("/tables/active/all", get(tables::list_active))
        .route("/tables/available/{capacity}", get(tables::available))
        .route("/tables/bulk", post(tables::bulk_create))
        .route(
            "/tables/{id}",
            get(tables::get_one).put(tables::update).delete(tables::deactivate),
        )
        .route("/tables/{id}/activate", put(tables::activate))
        .route("/notifications/whatsapp", post(notifications::whatsapp))
        .route("/health", get(health::health))
        .route("/ws", get(ws::upgrade))
        .method_not_allowed_fallback(method_not_allowed)
}

pub fn router(state: AppState, config: &Config) -> Router {
    let routes = routes();
    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .fallback(not_found)
        .layer(middleware::from_fn(observability::track_http))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout))
        .layer(middleware::map_response(timeout_body))
        .layer(cors_layer(&config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("no route for {}", uri.path()))
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "method not allowed on this route")
}

/// The timeout layer answers with a bare status; give it the error body.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT && !response.headers().contains_key(header::CONTENT_TYPE) {
        return ApiError::new(StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT", "request timed out").into_response();
    }
    response
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}

/// Run a store mutation on its own task. A request that times out or
/// disconnects still sees its mutation applied or rejected as a whole.
async fn detached<T, F>(fut: F) -> ApiResult<T>
where
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::internal(format!("mutation task failed: {e}"))),
    }
}

/// Ids that aren't ULIDs can't name anything, so they are reported as
/// not found.
fn parse_id(raw: &str, not_found: fn(Ulid) -> EngineError) -> ApiResult<Ulid> {
    raw.parse::<Ulid>().map_err(|_| {
        let code = not_found(Ulid::nil()).code();
        ApiError::not_found(code, format!("no record with id {raw}"))
    })
}
