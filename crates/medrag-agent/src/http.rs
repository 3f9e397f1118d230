//! Chat HTTP API (§6): `POST /set_patient`, `POST /chat`, `POST /reset`.
//! Session identity comes from an `X-Session-Id` header; a caller that
//! omits it gets a fresh session per request, so any client wanting
//! continuity must send the header itself (no cookie jar is maintained
//! here — signing and storing a cookie is the browser front-end's job,
//! out of scope per §1).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use medrag_core::embeddings::Embeddings;
use medrag_core::error::MedRagError;
use medrag_core::fhir::FhirAdapter;
use medrag_core::memory::VectorMemory;
use medrag_core::store::DataStore;

use crate::agent::provider::LlmProvider;
use crate::agent::AgentController;
use crate::session::SessionStore;
use crate::tools::{ToolContext, ToolRegistry};

const SESSION_HEADER: &str = "x-session-id";

pub struct AppState {
    pub store: Arc<DataStore>,
    pub embeddings: Arc<Embeddings>,
    pub fhir: Option<Arc<FhirAdapter>>,
    pub memory: Arc<VectorMemory>,
    pub tools: Arc<ToolRegistry>,
    pub agent: AgentController,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        store: Arc<DataStore>,
        embeddings: Arc<Embeddings>,
        fhir: Option<Arc<FhirAdapter>>,
        memory: Arc<VectorMemory>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::with_default_tools());
        Self {
            store,
            embeddings,
            fhir,
            memory,
            agent: AgentController::new(provider, Arc::clone(&tools)),
            tools,
            sessions: SessionStore::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/set_patient", post(set_patient))
        .route("/chat", post(chat))
        .route("/reset", post(reset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn error_response(err: &MedRagError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "ok": false, "error": err.to_string() })))
}

#[derive(Debug, Deserialize)]
struct SetPatientRequest {
    patient_id: String,
}

#[derive(Debug, Serialize)]
struct SetPatientResponse {
    ok: bool,
    message: String,
}

async fn set_patient(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SetPatientRequest>,
) -> impl IntoResponse {
    if request.patient_id.trim().is_empty() {
        return error_response(&MedRagError::InputError("patient_id must not be empty".to_string())).into_response();
    }

    let session_id = session_id(&headers);
    let handle = state.sessions.get_or_create(&session_id).await;
    let mut session = handle.lock().await;
    session.patient_id = Some(request.patient_id.clone());

    Json(SetPatientResponse { ok: true, message: format!("patient set to {}", request.patient_id) }).into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default = "default_do_search")]
    #[allow(dead_code)]
    do_search: bool,
}

fn default_do_search() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    ok: bool,
    reply: String,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    if request.message.trim().is_empty() {
        return error_response(&MedRagError::InputError("message must not be empty".to_string())).into_response();
    }

    let session_id = session_id(&headers);
    let handle = state.sessions.get_or_create(&session_id).await;
    let mut session = handle.lock().await;

    let ctx = ToolContext {
        store: Arc::clone(&state.store),
        embeddings: Arc::clone(&state.embeddings),
        fhir: state.fhir.clone(),
        memory: Arc::clone(&state.memory),
        session_id: session_id.clone(),
        patient_id: session.patient_id.clone(),
    };

    let result = state.agent.run_turn(&ctx, &mut session.history, &request.message).await;
    Json(ChatResponse { ok: true, reply: result.reply }).into_response()
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    #[serde(default)]
    clear_patient: bool,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    ok: bool,
    message: String,
}

async fn reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    let session_id = session_id(&headers);
    state.sessions.reset(&session_id, request.clear_patient).await;
    Json(ResetResponse { ok: true, message: "session reset".to_string() }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DemoProvider;

    #[async_trait::async_trait]
    impl LlmProvider for DemoProvider {
        async fn complete(
            &self,
            _messages: &[crate::agent::provider::Message],
            _tools: &[crate::tools::ToolSpec],
            _temperature: f32,
        ) -> medrag_core::error::Result<crate::agent::provider::ProviderResponse> {
            Ok(crate::agent::provider::ProviderResponse {
                stop_reason: crate::agent::provider::StopReason::EndTurn,
                content: vec![crate::agent::provider::ContentBlock::Text("demo reply".to_string())],
            })
        }
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(DataStore::open_in_memory().unwrap()),
            Arc::new(Embeddings::new("http://127.0.0.1:0")),
            None,
            Arc::new(VectorMemory::default()),
            Arc::new(DemoProvider),
        ))
    }

    #[tokio::test]
    async fn set_patient_rejects_an_empty_id() {
        let state = test_state();
        let (status, _) = error_response(&MedRagError::InputError("patient_id must not be empty".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let _ = state;
    }

    #[tokio::test]
    async fn session_id_falls_back_to_a_generated_uuid() {
        let headers = HeaderMap::new();
        let id = session_id(&headers);
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn reset_does_not_error_for_a_never_seen_session() {
        let state = test_state();
        state.sessions.reset("unseen", true).await;
    }
}
