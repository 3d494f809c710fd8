//! HTTP request surface over the dispatch core.
//!
//! The request layer owns job validation: a payload is checked before
//! it is allowed into the queue, and every post-enqueue failure is
//! observable only through metrics and dead-letter depth.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::cluster::ClusterManager;
use crate::error::{Result, SpindleError};
use crate::metrics::Metrics;
use crate::queue::{Job, JobPayload, JobQueue, PlaybackEnqueuePayload, Priority};
use crate::spotify::SpotifyService;

#[derive(Clone)]
pub struct ApiState {
    pub admin_api_token: Option<String>,
    pub queue: Arc<dyn JobQueue>,
    pub metrics: Arc<Metrics>,
    pub cluster_manager: Arc<ClusterManager>,
    pub spotify: Arc<SpotifyService>,
}

impl IntoResponse for SpindleError {
    fn into_response(self) -> Response {
        let status = match &self {
            SpindleError::Validation(_) => StatusCode::BAD_REQUEST,
            SpindleError::Spotify(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let open = Router::new()
        .route("/health", get(health))
        .route("/auth/spotify/callback", post(spotify_callback));

    let guarded = Router::new()
        .route("/metrics", get(metrics_report))
        .route("/clusters", get(clusters))
        .route("/auth/spotify/url", get(spotify_authorize_url))
        .route("/jobs", post(submit_job))
        .route("/demo/seed", post(demo_seed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    open.merge(guarded).layer(cors).with_state(state)
}

/// Bind and serve until the shutdown token fires; in-flight requests
/// drain before return.
pub async fn serve(addr: SocketAddr, state: ApiState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "api server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

/// Admin-token guard for everything except health and the OAuth
/// callback. Disabled when no token is configured.
async fn require_api_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.admin_api_token {
        let provided = request
            .headers()
            .get("x-api-token")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn health(State(state): State<ApiState>) -> Result<Json<serde_json::Value>> {
    let queue_depth = state.queue.size().await?;
    let clusters = state.cluster_manager.snapshot().await;
    Ok(Json(json!({
        "status": "ok",
        "clusters": clusters.len(),
        "queueDepth": queue_depth,
    })))
}

async fn metrics_report(State(state): State<ApiState>) -> Result<Json<serde_json::Value>> {
    let snapshot = state.metrics.snapshot();
    Ok(Json(json!({
        "counters": snapshot.counters,
        "gauges": snapshot.gauges,
        "queueDepth": state.queue.size().await?,
        "deadLetterDepth": state.queue.dead_letter_size().await?,
        "clusters": state.cluster_manager.snapshot().await,
    })))
}

async fn clusters(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({ "clusters": state.cluster_manager.snapshot().await }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeUrlParams {
    user_id: Option<String>,
    state: Option<String>,
    scope: Option<String>,
}

async fn spotify_authorize_url(
    State(state): State<ApiState>,
    Query(params): Query<AuthorizeUrlParams>,
) -> Result<Json<crate::spotify::AuthorizeUrl>> {
    let user_id = params.user_id.as_deref().ok_or_else(|| {
        SpindleError::Validation("userId query param is required".to_string())
    })?;
    let authorize = state.spotify.create_authorize_url(
        user_id,
        params.state.as_deref(),
        params.scope.as_deref(),
    )?;
    Ok(Json(authorize))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    code: String,
}

async fn spotify_callback(
    State(state): State<ApiState>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = state
        .spotify
        .exchange_code(&request.user_id, &request.code)
        .await?;
    Ok(Json(json!({ "ok": true, "expiresAt": token.expires_at })))
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    #[serde(flatten)]
    payload: JobPayload,
    #[serde(default)]
    priority: Priority,
}

async fn submit_job(
    State(state): State<ApiState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    request.payload.validate()?;

    let job = Job::new(request.payload, request.priority);
    let queued = state.queue.enqueue(job).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "enqueued": queued.id, "type": queued.payload.kind() })),
    ))
}

async fn demo_seed(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let job = Job::new(
        JobPayload::PlaybackEnqueue(PlaybackEnqueuePayload {
            guild_id: "guild-1".to_string(),
            track_id: Some("track-1".to_string()),
            ..Default::default()
        }),
        Priority::High,
    );
    state.queue.enqueue(job).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "seeded": true }))))
}
