//! HTTP gateway for agentloom.
//!
//! Exposes health and listing endpoints plus three chat surfaces:
//! a unary endpoint, a server-sent-event stream and a WebSocket stream.
//! Every streaming run is backed by a [`RunHandle`](agentloom_agent::RunHandle);
//! a caller that goes away cancels its run.
//!
//! Built on Axum.

pub mod chat;

use agentloom_agent::{AgentError, AgentFactory};
use agentloom_config::{AppConfig, ConfigError};
use agentloom_core::agent::{AgentStore, Framework, InMemoryAgentStore};
use agentloom_core::tool::ToolDescriptor;
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state for the gateway.
pub struct AppState {
    pub store: Arc<dyn AgentStore>,
    pub factory: Arc<AgentFactory>,
    /// Capacity of each run's event channel
    pub event_buffer: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn AgentStore>, factory: Arc<AgentFactory>, event_buffer: usize) -> Self {
        Self {
            store,
            factory,
            event_buffer: event_buffer.max(1),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/agents", get(list_agents_handler))
        .route("/api/tools", get(list_tools_handler))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/chat/sse", post(chat::chat_sse_handler))
        .route("/api/chat/stream", get(chat::chat_ws_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the runtime from `config` and serve until the listener fails.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let providers = agentloom_providers::build_from_config(&config)?;
    let provider = providers
        .default()
        .ok_or_else(|| ConfigError::MissingCredentials(config.default_provider.clone()))?;

    let store = Arc::new(InMemoryAgentStore::new(config.agents.iter().cloned()));
    let factory = Arc::new(AgentFactory::new(provider, &config));
    let state = Arc::new(AppState::new(store, factory, config.runtime.event_buffer));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, agents = config.agents.len(), "Gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Errors ---

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An [`AgentError`] rendered as a JSON error body.
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::InvalidRequest(_) | AgentError::Chain(_) | AgentError::Prompt(_) => StatusCode::BAD_REQUEST,
            AgentError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub mcp_services: Vec<String>,
}

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<AgentSummary>,
    count: usize,
}

async fn list_agents_handler(State(state): State<SharedState>) -> Result<Json<AgentListResponse>, ApiError> {
    let agents: Vec<AgentSummary> = state
        .store
        .list()
        .await
        .map_err(AgentError::from)?
        .into_iter()
        .filter(|a| a.is_active)
        .map(|a| AgentSummary {
            id: a.id,
            name: a.name,
            framework: a.framework,
            description: a.description,
            model: a.model,
            mcp_services: a.mcp_services,
        })
        .collect();
    let count = agents.len();
    Ok(Json(AgentListResponse { agents, count }))
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDescriptor>,
    count: usize,
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools = state.factory.tools().available();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}
