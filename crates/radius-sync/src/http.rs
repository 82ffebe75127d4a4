//! HTTP surface: post-auth hook, online sessions, admin actions, health

use crate::billing::BillingRepository;
use crate::error::SyncError;
use crate::model::{SubscriberId, SubscriberStatus};
use crate::orchestrator::Orchestrator;
use crate::session::SessionObserver;
use crate::voucher::{PostAuthRequest, PostAuthResponse, VoucherActivator};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<dyn BillingRepository>,
    pub vouchers: Arc<VoucherActivator>,
    pub observer: Arc<SessionObserver>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeRequest {
    pub ids: Vec<SubscriberId>,
    pub status: SubscriberStatus,
}

fn error_response(err: SyncError) -> Response {
    let status = match &err {
        SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        SyncError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }
    (status, Json(json!({ "success": false, "error": err.to_string() }))).into_response()
}

/// RADIUS post-auth hook
///
/// Any failure answers `reject`: a voucher that cannot be evaluated must not
/// grant access.
async fn post_auth_handler(
    State(state): State<AppState>,
    Json(request): Json<PostAuthRequest>,
) -> Response {
    match state.vouchers.handle_post_auth(&request, Utc::now()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!(username = %request.username, error = %e, "Post-auth evaluation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PostAuthResponse::failure(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn online_handler(State(state): State<AppState>) -> Response {
    match state.observer.online_sessions(Utc::now()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status_change_handler(
    State(state): State<AppState>,
    Json(request): Json<StatusChangeRequest>,
) -> Response {
    match state
        .orchestrator
        .change_status(&request.ids, request.status)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn disconnect_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    let outcome = state.orchestrator.enforcer().disconnect_user(&username).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(outcome)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let health = match state.billing.routers().await {
        Ok(_) => HealthStatus {
            status: "healthy".to_string(),
            error: None,
        },
        Err(e) => HealthStatus {
            status: "unhealthy".to_string(),
            error: Some(e.to_string()),
        },
    };

    let status_code = if health.error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health)).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/radius/post-auth", post(post_auth_handler))
        .route("/sessions/online", get(online_handler))
        .route("/sessions/:username/disconnect", post(disconnect_handler))
        .route("/subscribers/status", post(status_change_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
