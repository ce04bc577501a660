//! HTTP surface: location ingest, collect/offline actions, target
//! registration, moderation stats, and a health snapshot.
//!
//! The wire format is the mobile client's camelCase JSON. Handlers only
//! translate between the wire and the session manager; all engine decisions
//! happen inside the per-session workers.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::error::{CollectError, FixError, SessionError};
use crate::events::ProximityEvent;
use crate::session::{EngineStatus, SessionManager};
use crate::types::{LocationFix, MovementType, Target, ValueCategory};

/// Epoch seconds from the wall clock, for fixes without a client timestamp.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy_meters: Option<f64>,
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
    pub device_id: Option<String>,
    pub device_model: Option<String>,
    pub app_version: Option<String>,
    pub session_id: Option<String>,
    pub is_ar_active: Option<bool>,
    pub is_mock_location: Option<bool>,
    pub client_timestamp: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement_type: Option<MovementType>,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    pub session_id: String,
    pub target_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ProximityEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineResponse {
    pub success: bool,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPayload {
    pub id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub value_category: ValueCategory,
    pub collection_radius_meters: f64,
    pub materialization_radius_meters: f64,
    pub hide_radius_meters: f64,
}

impl From<TargetPayload> for Target {
    fn from(p: TargetPayload) -> Self {
        Target {
            id: p.id,
            latitude: p.latitude,
            longitude: p.longitude,
            value_category: p.value_category,
            collection_radius_m: p.collection_radius_meters,
            materialization_radius_m: p.materialization_radius_meters,
            hide_radius_m: p.hide_radius_meters,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTargetsRequest {
    pub session_id: String,
    pub targets: Vec<TargetPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTargetsResponse {
    pub success: bool,
    pub registered: usize,
}

pub fn router(manager: SessionManager) -> Router {
    Router::new()
        .route("/location", post(location_handler))
        .route("/collect", post(collect_handler))
        .route("/offline", post(offline_handler))
        .route("/targets", post(targets_handler))
        .route("/flags/stats", get(flag_stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

/// Binds and serves the API.
pub async fn serve(manager: SessionManager, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    log::info!("[server] listening on http://{}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router(manager)).await?;
    Ok(())
}

async fn location_handler(
    State(manager): State<SessionManager>,
    Json(req): Json<LocationUpdateRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .clone()
        .unwrap_or_else(|| format!("user:{}", req.user_id));
    let timestamp = req.client_timestamp.unwrap_or_else(current_timestamp);

    let fix = LocationFix {
        latitude: req.latitude,
        longitude: req.longitude,
        altitude: req.altitude,
        accuracy_m: req.accuracy_meters.unwrap_or(0.0),
        heading_deg: req.heading,
        speed_mps: req.speed_mps,
        is_mock: req.is_mock_location.unwrap_or(false),
        timestamp,
    };

    let result = manager
        .submit_fix(&session_id, &req.user_id, req.device_id.clone(), fix)
        .await;

    match result {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(LocationUpdateResponse {
                success: true,
                location_id: Some(outcome.location_id),
                movement_type: Some(outcome.movement_type),
                timestamp,
                error: None,
            }),
        ),
        // Stale fixes are skipped, not failed: the session continues and
        // the client just keeps sending.
        Ok(Err(e @ FixError::StaleFix { .. })) => (
            StatusCode::OK,
            Json(LocationUpdateResponse {
                success: false,
                location_id: None,
                movement_type: None,
                timestamp,
                error: Some(e.to_string()),
            }),
        ),
        Ok(Err(e @ FixError::InvalidCoordinate { .. })) => (
            StatusCode::BAD_REQUEST,
            Json(LocationUpdateResponse {
                success: false,
                location_id: None,
                movement_type: None,
                timestamp,
                error: Some(e.to_string()),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(LocationUpdateResponse {
                success: false,
                location_id: None,
                movement_type: None,
                timestamp,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn collect_handler(
    State(manager): State<SessionManager>,
    Json(req): Json<CollectRequest>,
) -> impl IntoResponse {
    match manager.collect(&req.session_id, req.target_id).await {
        Ok(Ok(event)) => (
            StatusCode::OK,
            Json(CollectResponse {
                success: true,
                event: Some(event),
                error: None,
            }),
        ),
        Ok(Err(e @ CollectError::UnknownTarget(_))) => collect_error(StatusCode::NOT_FOUND, e),
        // A rejected collect is a normal race outcome; the client re-syncs
        // state and retries.
        Ok(Err(e)) => collect_error(StatusCode::CONFLICT, e),
        Err(e @ SessionError::UnknownSession(_)) => session_error(StatusCode::NOT_FOUND, e),
        Err(e) => session_error(StatusCode::SERVICE_UNAVAILABLE, e),
    }
}

fn collect_error(status: StatusCode, e: CollectError) -> (StatusCode, Json<CollectResponse>) {
    (
        status,
        Json(CollectResponse {
            success: false,
            event: None,
            error: Some(e.to_string()),
        }),
    )
}

fn session_error(status: StatusCode, e: SessionError) -> (StatusCode, Json<CollectResponse>) {
    (
        status,
        Json(CollectResponse {
            success: false,
            event: None,
            error: Some(e.to_string()),
        }),
    )
}

async fn offline_handler(
    State(manager): State<SessionManager>,
    Json(req): Json<OfflineRequest>,
) -> Json<OfflineResponse> {
    let removed = manager.remove_session(&req.session_id);
    Json(OfflineResponse {
        success: true,
        removed,
    })
}

async fn targets_handler(
    State(manager): State<SessionManager>,
    Json(req): Json<RegisterTargetsRequest>,
) -> impl IntoResponse {
    let targets: Vec<Target> = req.targets.into_iter().map(Target::from).collect();
    match manager.register_targets(&req.session_id, targets).await {
        Ok(registered) => (
            StatusCode::OK,
            Json(RegisterTargetsResponse {
                success: true,
                registered,
            }),
        ),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(RegisterTargetsResponse {
                success: false,
                registered: 0,
            }),
        ),
    }
}

async fn flag_stats_handler(State(manager): State<SessionManager>) -> impl IntoResponse {
    let stats = manager
        .ledger()
        .lock()
        .map(|l| l.stats(Utc::now()))
        .unwrap_or_default();
    Json(stats)
}

async fn health_handler(State(manager): State<SessionManager>) -> Json<EngineStatus> {
    Json(manager.status())
}
