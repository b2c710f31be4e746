//! REST API Handlers
//!
//! Drives grow sessions over HTTP. Rendering steps is left to the client;
//! every response carries the step list and the active error instead.

use crate::domain::ports::DeviceId;
use crate::workflow::{
    ErrorState, GrowOutcome, SessionState, SessionToken, StepDescriptor, StepInput, StepKind,
    StepResponse, WorkflowController, WorkflowSession,
};
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Open a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub server: String,
    pub filesystem: String,
}

/// Submit input for a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub step: StepKind,
    pub input: StepInput,
}

/// Allocatable device as listed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub id: DeviceId,
    pub capacity_bytes: u64,
}

/// Session snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub server: String,
    pub filesystem: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub current_step: Option<StepDescriptor>,
    pub steps: Vec<StepDescriptor>,
    pub future_steps: Vec<StepDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceView>,
    pub error: Option<ErrorState>,
    pub outcome: Option<GrowOutcome>,
}

impl From<&WorkflowSession> for SessionView {
    fn from(session: &WorkflowSession) -> Self {
        let devices = session
            .inventory()
            .map(|inv| {
                inv.devices()
                    .map(|d| DeviceView {
                        id: d.id.clone(),
                        capacity_bytes: d.capacity_bytes,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: session.token().to_string(),
            server: session.server().to_string(),
            filesystem: session.filesystem().to_string(),
            state: session.state(),
            created_at: session.created_at(),
            current_step: session.current_step(),
            steps: session.step_sequence(),
            future_steps: session.future_steps(),
            devices,
            error: session.error().cloned(),
            outcome: session.outcome().cloned(),
        }
    }
}

/// Reply to a step call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResultView {
    pub advanced: bool,
    pub error: Option<ErrorState>,
    pub session: SessionView,
}

impl StepResultView {
    fn new(response: StepResponse, session: &WorkflowSession) -> Self {
        Self {
            advanced: response.advanced,
            error: response.error,
            session: SessionView::from(session),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn api_error(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.into(),
            message,
            details: None,
        }),
    )
        .into_response()
}

// =============================================================================
// REST Router
// =============================================================================

type SessionMap = DashMap<SessionToken, Arc<Mutex<WorkflowSession>>>;

/// Default time a finished or failed session stays readable
pub const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(300);

/// REST API router builder
pub struct RestRouter {
    controller: Arc<WorkflowController>,
    retention: Duration,
}

impl RestRouter {
    pub fn new(controller: Arc<WorkflowController>) -> Self {
        Self {
            controller,
            retention: DEFAULT_SESSION_RETENTION,
        }
    }

    /// Keep ended sessions readable for `retention` before they are swept
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            controller: self.controller,
            sessions: Arc::new(SessionMap::new()),
            ended: Arc::new(DashMap::new()),
            retention: self.retention,
        };

        Router::new()
            // Session endpoints
            .route("/v1/sessions", post(start_session))
            .route("/v1/sessions/:id", get(get_session).delete(cancel_session))
            .route("/v1/sessions/:id/advance", post(advance_session))
            .route("/v1/sessions/:id/back", post(back_session))
            .route("/v1/sessions/:id/finish", post(finish_session))
            // Operations
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    controller: Arc<WorkflowController>,
    /// Each session sits behind its own lock so its calls serialise
    sessions: Arc<SessionMap>,
    /// When each finished or failed session ended
    ended: Arc<DashMap<SessionToken, Instant>>,
    retention: Duration,
}

impl AppState {
    fn mark_if_ended(&self, session: &WorkflowSession) {
        if session.state().is_terminal() {
            self.ended.entry(session.token()).or_insert_with(Instant::now);
        }
    }

    /// Drop ended sessions older than the retention window
    fn sweep(&self) {
        let expired: Vec<SessionToken> = self
            .ended
            .iter()
            .filter(|entry| entry.value().elapsed() >= self.retention)
            .map(|entry| *entry.key())
            .collect();

        for token in expired {
            self.ended.remove(&token);
            self.sessions.remove(&token);
            debug!("Evicted ended session {}", token);
        }
    }

    fn forget(&self, token: &SessionToken) {
        self.ended.remove(token);
        self.sessions.remove(token);
    }

    fn session(&self, id: &str) -> std::result::Result<(SessionToken, Arc<Mutex<WorkflowSession>>), Response> {
        let token: SessionToken = id.parse().map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                "invalid_session_id",
                format!("Invalid session id: {}", id),
            )
        })?;
        let session = self
            .sessions
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                api_error(
                    StatusCode::NOT_FOUND,
                    "session_not_found",
                    format!("Session not found: {}", id),
                )
            })?;
        Ok((token, session))
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> impl IntoResponse {
    info!("Starting grow session for {} on {}", request.filesystem, request.server);

    let session = state
        .controller
        .start(&request.server, &request.filesystem)
        .await;
    let view = SessionView::from(&session);
    state.sweep();
    state.mark_if_ended(&session);
    state
        .sessions
        .insert(session.token(), Arc::new(Mutex::new(session)));

    (StatusCode::CREATED, Json(view))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.session(&id) {
        Ok((_, session)) => {
            let session = session.lock().await;
            (StatusCode::OK, Json(SessionView::from(&*session))).into_response()
        }
        Err(response) => response,
    }
}

async fn advance_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AdvanceRequest>,
) -> Response {
    let session = match state.session(&id) {
        Ok((_, session)) => session,
        Err(response) => return response,
    };

    let mut session = session.lock().await;
    debug!("Advancing session {} at {}", id, request.step);
    let response = state
        .controller
        .advance(&mut session, request.step, request.input)
        .await;
    (StatusCode::OK, Json(StepResultView::new(response, &session))).into_response()
}

async fn back_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = match state.session(&id) {
        Ok((_, session)) => session,
        Err(response) => return response,
    };

    let mut session = session.lock().await;
    let response = state.controller.back(&mut session);
    (StatusCode::OK, Json(StepResultView::new(response, &session))).into_response()
}

async fn finish_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = match state.session(&id) {
        Ok((_, session)) => session,
        Err(response) => return response,
    };

    let mut session = session.lock().await;
    let response = state.controller.finish(&mut session).await;
    if let Some(err) = response.error.as_ref().filter(|e| e.is_fatal()) {
        error!("Session {} finished with error: {}", id, err.message);
    }
    state.mark_if_ended(&session);
    (StatusCode::OK, Json(StepResultView::new(response, &session))).into_response()
}

async fn cancel_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let (token, session) = match state.session(&id) {
        Ok(found) => found,
        Err(response) => return response,
    };

    {
        let mut session = session.lock().await;
        state.controller.cancel(&mut session);
    }
    state.forget(&token);
    StatusCode::NO_CONTENT.into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.controller.metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticInventory;
    use crate::workflow::{GrowthLimits, ValidationPolicy, WorkflowArbiter};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const INVENTORY: &str = r#"
servers:
  mds1:
    devices:
      - { path: /dev/m0, capacity_bytes: 10 }
      - { path: /dev/m1, capacity_bytes: 10 }
      - { path: /dev/d0, capacity_bytes: 40 }
      - { path: /dev/d1, capacity_bytes: 40 }
    file_systems:
      - name: qfs1
        mounted: true
        metadata_devices: [/dev/m0]
        data_devices: [/dev/d0]
"#;

    fn router() -> (Router, Arc<StaticInventory>) {
        router_with_retention(DEFAULT_SESSION_RETENTION)
    }

    fn router_with_retention(retention: Duration) -> (Router, Arc<StaticInventory>) {
        let inventory = Arc::new(StaticInventory::from_yaml(INVENTORY).unwrap());
        let controller = WorkflowController::new(
            inventory.clone(),
            inventory.clone(),
            inventory.clone(),
            WorkflowArbiter::new(),
            GrowthLimits::default(),
            ValidationPolicy::default(),
        )
        .unwrap();
        (
            RestRouter::new(Arc::new(controller))
                .with_retention(retention)
                .build(),
            inventory,
        )
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_session_round_trip_to_grow() {
        let (router, inventory) = router();

        let (status, view) = call(
            &router,
            "POST",
            "/v1/sessions",
            Some(json!({"server": "mds1", "filesystem": "qfs1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["state"], "in_progress");
        assert_eq!(view["currentStep"]["kind"]["kind"], "method");
        let id = view["id"].as_str().unwrap().to_string();

        let (_, result) = call(
            &router,
            "POST",
            &format!("/v1/sessions/{}/advance", id),
            Some(json!({
                "step": {"kind": "method"},
                "input": {"type": "method", "add_metadata": false, "add_data": true}
            })),
        )
        .await;
        assert_eq!(result["advanced"], true);
        assert_eq!(result["session"]["currentStep"]["kind"]["kind"], "data_selection");

        let (_, result) = call(
            &router,
            "POST",
            &format!("/v1/sessions/{}/advance", id),
            Some(json!({
                "step": {"kind": "data_selection"},
                "input": {"type": "devices", "devices": ["/dev/d1"]}
            })),
        )
        .await;
        assert_eq!(result["advanced"], true);

        let (status, result) = call(&router, "POST", &format!("/v1/sessions/{}/finish", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["session"]["state"], "finished");
        assert_eq!(result["session"]["outcome"]["status"], "succeeded");

        let fs = inventory.file_system("mds1", "qfs1").unwrap();
        assert_eq!(fs.data_devices.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_step_returns_error_state() {
        let (router, _) = router();
        let (_, view) = call(
            &router,
            "POST",
            "/v1/sessions",
            Some(json!({"server": "mds1", "filesystem": "qfs1"})),
        )
        .await;
        let id = view["id"].as_str().unwrap().to_string();

        let (status, result) = call(
            &router,
            "POST",
            &format!("/v1/sessions/{}/advance", id),
            Some(json!({
                "step": {"kind": "method"},
                "input": {"type": "method", "add_metadata": false, "add_data": false}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["advanced"], false);
        assert_eq!(result["error"]["message"], "no growth method selected");
        assert_eq!(result["error"]["severity"], "inline");
    }

    #[tokio::test]
    async fn test_unknown_file_system_is_failed_session() {
        let (router, _) = router();
        let (status, view) = call(
            &router,
            "POST",
            "/v1/sessions",
            Some(json!({"server": "mds1", "filesystem": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["state"], "failed");
        assert_eq!(view["error"]["severity"], "fatal");
    }

    #[tokio::test]
    async fn test_cancel_removes_session() {
        let (router, _) = router();
        let (_, view) = call(
            &router,
            "POST",
            "/v1/sessions",
            Some(json!({"server": "mds1", "filesystem": "qfs1"})),
        )
        .await;
        let uri = format!("/v1/sessions/{}", view["id"].as_str().unwrap());

        let (status, _) = call(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }

    #[tokio::test]
    async fn test_ended_sessions_are_swept() {
        let (router, _) = router_with_retention(Duration::ZERO);
        let start = |filesystem: &'static str| {
            let router = router.clone();
            async move {
                let (_, view) = call(
                    &router,
                    "POST",
                    "/v1/sessions",
                    Some(json!({"server": "mds1", "filesystem": filesystem})),
                )
                .await;
                format!("/v1/sessions/{}", view["id"].as_str().unwrap())
            }
        };

        // A failed start stays readable until the next session is opened
        let failed = start("nope").await;
        let (status, view) = call(&router, "GET", &failed, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "failed");

        let finished = start("qfs1").await;
        let (status, _) = call(&router, "GET", &failed, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(
            &router,
            "POST",
            &format!("{}/advance", finished),
            Some(json!({
                "step": {"kind": "method"},
                "input": {"type": "method", "add_metadata": false, "add_data": true}
            })),
        )
        .await;
        call(
            &router,
            "POST",
            &format!("{}/advance", finished),
            Some(json!({
                "step": {"kind": "data_selection"},
                "input": {"type": "devices", "devices": ["/dev/d1"]}
            })),
        )
        .await;
        let (_, result) = call(&router, "POST", &format!("{}/finish", finished), None).await;
        assert_eq!(result["session"]["state"], "finished");

        // An in-progress session survives the sweep
        let open = start("qfs1").await;
        let (status, _) = call(&router, "GET", &finished, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, view) = call(&router, "GET", &open, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "in_progress");
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let (router, _) = router();
        let (status, body) = call(&router, "GET", "/v1/sessions/not-hex", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_session_id");
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let (router, _) = router();
        let (status, _) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        call(
            &router,
            "POST",
            "/v1/sessions",
            Some(json!({"server": "mds1", "filesystem": "qfs1"})),
        )
        .await;

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("growfs_sessions_started_total 1"));
    }
}
