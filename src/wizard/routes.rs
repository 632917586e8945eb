//! REST + WebSocket surface over the session registry.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{WizardController, WizardEvent};
use super::fields::{FieldName, FieldValue};
use super::registry::SessionRegistry;
use super::state::WizardPhase;
use crate::error::{GateError, WizardError};

/// Shared state for wizard routes.
#[derive(Clone)]
pub struct WizardRouteState {
    pub registry: Arc<SessionRegistry>,
}

/// Build the full application router: health, wizard REST, wizard WebSocket.
pub fn wizard_routes(registry: Arc<SessionRegistry>) -> Router {
    let state = WizardRouteState { registry };

    Router::new()
        .route("/health", get(health))
        .route("/api/wizard", post(create_session))
        .route("/api/wizard/{id}", get(get_session).delete(delete_session))
        .route("/api/wizard/{id}/fields/{name}", put(update_field))
        .route("/api/wizard/{id}/advance", post(advance))
        .route("/api/wizard/{id}/retreat", post(retreat))
        .route("/api/wizard/{id}/resend", post(resend))
        .route("/api/wizard/{id}/enrich", post(enrich))
        .route("/api/wizard/{id}/submit", post(submit))
        .route("/ws/wizard/{id}", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn session_not_found(id: Uuid) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("Unknown wizard session: {id}"))
}

fn wizard_error_response(err: WizardError) -> Response {
    let status = match &err {
        WizardError::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WizardError::Gate(GateError::VerificationFailed) => StatusCode::UNPROCESSABLE_ENTITY,
        WizardError::GatePending | WizardError::NotAtPhase { .. } | WizardError::Finished => {
            StatusCode::CONFLICT
        }
        WizardError::Gate(_) | WizardError::Submission(_) => StatusCode::BAD_GATEWAY,
    };

    let mut body = serde_json::json!({ "error": err.to_string() });
    if let WizardError::Invalid { phase, errors } = &err {
        body["phase"] = serde_json::json!(phase);
        body["field_errors"] = serde_json::json!(errors);
    }
    (status, Json(body)).into_response()
}

async fn lookup(state: &WizardRouteState, id: Uuid) -> Result<Arc<WizardController>, Response> {
    state.registry.get(id).await.ok_or_else(|| session_not_found(id))
}

/// Start a best-effort business lookup without holding up the response.
fn spawn_prefill(controller: Arc<WizardController>) {
    tokio::spawn(async move {
        controller.prefill_business().await;
    });
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "signup-wizard"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

/// POST /api/wizard
async fn create_session(State(state): State<WizardRouteState>) -> impl IntoResponse {
    let controller = state.registry.create().await;
    (StatusCode::CREATED, Json(controller.snapshot().await))
}

/// GET /api/wizard/{id}
async fn get_session(
    State(state): State<WizardRouteState>,
    Path(id): Path<Uuid>,
) -> Response {
    match lookup(&state, id).await {
        Ok(controller) => Json(controller.snapshot().await).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /api/wizard/{id}
async fn delete_session(
    State(state): State<WizardRouteState>,
    Path(id): Path<Uuid>,
) -> Response {
    if state.registry.remove(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        session_not_found(id)
    }
}

#[derive(Deserialize)]
struct FieldUpdate {
    value: FieldValue,
}

/// PUT /api/wizard/{id}/fields/{name}
async fn update_field(
    State(state): State<WizardRouteState>,
    Path((id, name)): Path<(Uuid, String)>,
    Json(body): Json<FieldUpdate>,
) -> Response {
    let controller = match lookup(&state, id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name: FieldName = match name.parse() {
        Ok(n) => n,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    controller.update_field(name, body.value).await;
    Json(controller.snapshot().await).into_response()
}

// ── Transitions ─────────────────────────────────────────────────────────

/// POST /api/wizard/{id}/advance
async fn advance(State(state): State<WizardRouteState>, Path(id): Path<Uuid>) -> Response {
    let controller = match lookup(&state, id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.advance().await {
        Ok(WizardPhase::BusinessInfo) => {
            spawn_prefill(Arc::clone(&controller));
            Json(controller.snapshot().await).into_response()
        }
        Ok(WizardPhase::Submitted) => {
            let snapshot = controller.snapshot().await;
            state.registry.remove(id).await;
            Json(snapshot).into_response()
        }
        Ok(_) => Json(controller.snapshot().await).into_response(),
        Err(e) => wizard_error_response(e),
    }
}

/// POST /api/wizard/{id}/retreat
async fn retreat(State(state): State<WizardRouteState>, Path(id): Path<Uuid>) -> Response {
    match lookup(&state, id).await {
        Ok(controller) => {
            controller.retreat().await;
            Json(controller.snapshot().await).into_response()
        }
        Err(resp) => resp,
    }
}

/// POST /api/wizard/{id}/resend
async fn resend(State(state): State<WizardRouteState>, Path(id): Path<Uuid>) -> Response {
    let controller = match lookup(&state, id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.resend_code().await {
        Ok(()) => Json(serde_json::json!({ "sent": true })).into_response(),
        Err(e) => wizard_error_response(e),
    }
}

/// POST /api/wizard/{id}/enrich
///
/// Runs the lookup inline and reports which fields were filled.
async fn enrich(State(state): State<WizardRouteState>, Path(id): Path<Uuid>) -> Response {
    let controller = match lookup(&state, id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let filled = controller.prefill_business().await;
    Json(serde_json::json!({
        "filled": filled,
        "snapshot": controller.snapshot().await,
    }))
    .into_response()
}

/// POST /api/wizard/{id}/submit
///
/// On success the session is discarded. The password is not echoed back.
async fn submit(State(state): State<WizardRouteState>, Path(id): Path<Uuid>) -> Response {
    let controller = match lookup(&state, id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match controller.submit().await {
        Ok(record) => {
            state.registry.remove(id).await;
            info!(session_id = %id, "Wizard completed");
            let mut body = serde_json::to_value(&record).unwrap_or_default();
            if let Some(obj) = body.as_object_mut() {
                obj.remove("password");
            }
            Json(serde_json::json!({ "submitted": true, "record": body })).into_response()
        }
        Err(e) => wizard_error_response(e),
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// GET /ws/wizard/{id}
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WizardRouteState>,
    Path(id): Path<Uuid>,
) -> Response {
    match lookup(&state, id).await {
        Ok(controller) => {
            info!(session_id = %id, "Wizard WebSocket client connecting");
            ws.on_upgrade(move |socket| handle_socket(socket, controller))
        }
        Err(resp) => resp,
    }
}

async fn send_event(socket: &mut WebSocket, event: &WizardEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize wizard event: {e}");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, controller: Arc<WizardController>) {
    let session_id = controller.id();

    // Subscribe before the snapshot so nothing between them is lost
    let mut rx = controller.subscribe();

    let initial = WizardEvent::Snapshot {
        snapshot: controller.snapshot().await,
    };
    if !send_event(&mut socket, &initial).await {
        warn!(session_id = %session_id, "Failed to send initial snapshot, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            // Forward wizard events to this client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let done = matches!(event, WizardEvent::Submitted { .. });
                        if !send_event(&mut socket, &event).await {
                            debug!(session_id = %session_id, "Client disconnected during send");
                            break;
                        }
                        if done {
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %session_id, missed = n, "WS client lagged behind broadcast");
                        let resync = WizardEvent::Snapshot {
                            snapshot: controller.snapshot().await,
                        };
                        if !send_event(&mut socket, &resync).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!(session_id = %session_id, "Broadcast channel closed");
                        break;
                    }
                }
            }

            // The stream is server-push only; just watch for the client leaving
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session_id, "Client closed WebSocket");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %session_id, "Wizard WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::enrich::Enricher;
    use crate::error::EnrichError;
    use crate::otp::VerificationGate;
    use crate::store::{LibSqlBackend, SignupStore};
    use crate::wizard::aggregate::BusinessProfile;
    use crate::wizard::controller::WizardDeps;
    use crate::wizard::validators::FieldRules;

    struct CodeGate;

    #[async_trait]
    impl VerificationGate for CodeGate {
        async fn send_code(&self, _email: &str) -> Result<(), GateError> {
            Ok(())
        }

        async fn verify_code(&self, _email: &str, code: &str) -> Result<(), GateError> {
            if code == "123456" {
                Ok(())
            } else {
                Err(GateError::VerificationFailed)
            }
        }
    }

    struct FixedEnricher;

    #[async_trait]
    impl Enricher for FixedEnricher {
        async fn lookup(&self, _email: &str) -> Result<BusinessProfile, EnrichError> {
            Ok(BusinessProfile {
                company_name: "Acme Corp".into(),
                ..Default::default()
            })
        }
    }

    async fn test_app() -> (Router, Arc<SessionRegistry>, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let deps = WizardDeps {
            rules: Arc::new(FieldRules::default()),
            gate: Arc::new(CodeGate),
            enricher: Arc::new(FixedEnricher),
            store: Arc::clone(&store) as Arc<dyn SignupStore>,
        };
        let registry = Arc::new(SessionRegistry::new(deps, Duration::from_secs(60)));
        (wizard_routes(Arc::clone(&registry)), registry, store)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn put_field(app: &Router, id: &str, name: &str, value: serde_json::Value) -> StatusCode {
        call(
            app,
            "PUT",
            &format!("/api/wizard/{id}/fields/{name}"),
            Some(serde_json::json!({ "value": value })),
        )
        .await
        .0
    }

    #[tokio::test]
    async fn health_ok() {
        let (app, _, _) = test_app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_returns_first_step() {
        let (app, registry, _) = test_app().await;
        let (status, body) = call(&app, "POST", "/api/wizard", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["phase"], "account_info");
        assert_eq!(body["step"], 1);
        assert_eq!(body["pending"], false);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_session_and_field() {
        let (app, _, _) = test_app().await;
        let missing = Uuid::new_v4();
        let (status, _) = call(&app, "GET", &format!("/api/wizard/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "POST", "/api/wizard", None).await;
        let id = body["session_id"].as_str().unwrap().to_string();
        let status = put_field(&app, &id, "favouriteColour", serde_json::json!("blue")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_step_is_422_with_field_errors() {
        let (app, _, _) = test_app().await;
        let (_, body) = call(&app, "POST", "/api/wizard", None).await;
        let id = body["session_id"].as_str().unwrap().to_string();
        put_field(&app, &id, "workEmail", serde_json::json!("ada@gmail.com")).await;

        let (status, body) = call(&app, "POST", &format!("/api/wizard/{id}/advance"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field_errors"]["workEmail"], "Please use a work email address");
        assert_eq!(body["field_errors"]["firstName"], "First name is required");
    }

    #[tokio::test]
    async fn full_flow_persists_and_discards_session() {
        let (app, registry, store) = test_app().await;
        let (_, body) = call(&app, "POST", "/api/wizard", None).await;
        let id = body["session_id"].as_str().unwrap().to_string();

        put_field(&app, &id, "firstName", serde_json::json!("Ada")).await;
        put_field(&app, &id, "lastName", serde_json::json!("Lovelace")).await;
        put_field(&app, &id, "workEmail", serde_json::json!("ada@acme.com")).await;
        put_field(&app, &id, "acceptTerms", serde_json::json!(true)).await;
        let (status, body) = call(&app, "POST", &format!("/api/wizard/{id}/advance"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "verification");

        put_field(&app, &id, "verificationCode", serde_json::json!("000000")).await;
        let (status, _) = call(&app, "POST", &format!("/api/wizard/{id}/advance"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        put_field(&app, &id, "verificationCode", serde_json::json!("123456")).await;
        let (_, body) = call(&app, "POST", &format!("/api/wizard/{id}/advance"), None).await;
        assert_eq!(body["phase"], "password");

        put_field(&app, &id, "password", serde_json::json!("Abcdefg1")).await;
        put_field(&app, &id, "confirmPassword", serde_json::json!("Abcdefg1")).await;
        let (_, body) = call(&app, "POST", &format!("/api/wizard/{id}/advance"), None).await;
        assert_eq!(body["phase"], "business_info");
        assert!(body["fields"].get("password").is_none());

        let (status, body) = call(&app, "POST", &format!("/api/wizard/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["workEmail"], "ada@acme.com");
        assert_eq!(body["record"]["isDomainConditionsAccepted"], true);
        assert!(body["record"].get("password").is_none());

        assert!(registry.is_empty().await);
        assert_eq!(store.count_signups().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn submit_before_last_step_conflicts() {
        let (app, _, _) = test_app().await;
        let (_, body) = call(&app, "POST", "/api/wizard", None).await;
        let id = body["session_id"].as_str().unwrap().to_string();
        let (status, _) = call(&app, "POST", &format!("/api/wizard/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let (app, _, _) = test_app().await;
        let (_, body) = call(&app, "POST", "/api/wizard", None).await;
        let id = body["session_id"].as_str().unwrap().to_string();
        let (status, _) = call(&app, "DELETE", &format!("/api/wizard/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", &format!("/api/wizard/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
