use crate::error::TrackerError;
use crate::ingest::IngestUseCase;
use crate::observability;
use crate::storage::DeliveryStore;
use crate::types::DeliveryEvent;
use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::NaiveDateTime;
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

const EVENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared state handed to every handler.
pub struct AppState {
    pub ingest: IngestUseCase,
    pub store: Arc<dyn DeliveryStore>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "nfe-tracker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus exposition of the internal counters.
async fn prometheus_metrics() -> Response {
    match observability::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

fn error_response(err: TrackerError) -> Response {
    let status = match &err {
        TrackerError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
        TrackerError::DuplicateDelivery(_) => StatusCode::CONFLICT,
        TrackerError::DeliveryNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {err}");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Accepts a raw NF-e XML document as the request body.
async fn upload(Extension(state): Extension<Arc<AppState>>, body: String) -> Response {
    match state.ingest.ingest_document(&body).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "Entrega registrada com sucesso.",
                "delivery_id": outcome.delivery.id,
                "coordinates": outcome.coordinates,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    nfe_key: String,
    status: String,
    event_date: String,
}

fn parse_event_date(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, EVENT_DATE_FORMAT).ok()
}

async fn webhook(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> Response {
    let Some(event_date) = parse_event_date(&payload.event_date) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "event_date must be formatted as YYYY-MM-DD HH:MM:SS" })),
        )
            .into_response();
    };

    let delivery = match state.store.get_delivery_by_key(&payload.nfe_key).await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => {
            observability::webhook::unknown_key();
            return error_response(TrackerError::DeliveryNotFound(payload.nfe_key));
        }
        Err(err) => return error_response(err),
    };
    let Some(delivery_id) = delivery.id else {
        return error_response(TrackerError::Config(
            "stored delivery is missing its id".to_string(),
        ));
    };

    let mut event = DeliveryEvent {
        id: None,
        delivery_id,
        status: payload.status,
        event_date,
    };
    if let Err(err) = state.store.create_event(&mut event).await {
        return error_response(err);
    }

    observability::webhook::accepted();
    Json(json!({ "success": true, "message": "Evento registrado com sucesso." })).into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<u32>,
    page: Option<u32>,
}

async fn list_deliveries(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(10);
    let page = params.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    match state.store.list_deliveries(limit, offset).await {
        Ok(deliveries) => Json(deliveries).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delivery_details(
    Extension(state): Extension<Arc<AppState>>,
    Path(invoice_key): Path<String>,
) -> Response {
    match state.store.get_delivery_by_key(&invoice_key).await {
        Ok(Some(delivery)) => Json(delivery).into_response(),
        Ok(None) => error_response(TrackerError::DeliveryNotFound(invoice_key)),
        Err(err) => error_response(err),
    }
}

/// Delivery plus its status timeline, newest event first.
async fn tracking_info(
    Extension(state): Extension<Arc<AppState>>,
    Path(invoice_key): Path<String>,
) -> Response {
    let delivery = match state.store.get_delivery_by_key(&invoice_key).await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => return error_response(TrackerError::DeliveryNotFound(invoice_key)),
        Err(err) => return error_response(err),
    };
    let Some(delivery_id) = delivery.id else {
        return error_response(TrackerError::Config(
            "stored delivery is missing its id".to_string(),
        ));
    };

    match state.store.list_events(delivery_id).await {
        Ok(events) => Json(json!({ "entrega": delivery, "eventos": events })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delivery_metrics(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.store.metrics().await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(err) => error_response(err),
    }
}

/// Create the HTTP API with all routes
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/upload", post(upload))
        .route("/webhook", post(webhook))
        .route("/entregas", get(list_deliveries))
        .route("/entregas/:key", get(delivery_details))
        .route("/rastreamento/:key", get(tracking_info))
        .route("/metricas", get(delivery_metrics))
        .layer(ServiceBuilder::new().layer(cors).layer(Extension(state)))
}

/// Start the HTTP server on the given address
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(state);

    println!("🚀 HTTP server running on http://{addr}");
    println!("💚 Health check: http://{addr}/health");
    println!("📦 Upload NF-e:  POST http://{addr}/upload");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
