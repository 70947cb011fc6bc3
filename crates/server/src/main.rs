//! Triad Server
//!
//! Axum server that streams pipeline runs over WebSocket and serves stored
//! conversations. The same binary runs one-shot pipelines from the CLI.

mod api;

use anyhow::Context;
use axum::{
    body::Body,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use utoipa::OpenApi;

use triad_core::config::{TriadConfig, DEFAULT_CONFIG_PATH};
use triad_core::gateway::OpenAiGateway;
use triad_core::skills::PromptLibrary;
use triad_core::state::{ConversationStore, SqliteConversationStore, TriadDb};
use triad_core::swarm::{Orchestrator, RunRequest};

/// Application state
pub struct AppState {
    /// Unified database (prompts + conversations)
    pub db: Arc<TriadDb>,
    pub store: Arc<dyn ConversationStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<AppState>;

#[derive(Parser, Clone)]
#[command(author, version, about = "Triad - plan, delegate, simplify and synthesize LLM answers")]
struct Args {
    /// Optional JSON config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the Triad server (default)
    Serve {
        /// Port to listen on (overrides TRIAD_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: std::net::IpAddr,
    },
    /// Run the pipeline once and print every event (no server)
    Run {
        /// The user prompt
        prompt: String,
        /// User the conversation is stored under
        #[arg(short, long, default_value = "anonymous")]
        user_id: String,
    },
    /// List stored conversations for a user
    History {
        user_id: String,
    },
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Triad API",
        version = "1.0.0",
        description = "Stored conversations and prompt templates for the Triad pipeline. Runs are streamed over the /ws WebSocket."
    ),
    paths(
        api::conversations::get_history,
        api::conversations::get_conversation,
        api::prompts::list_prompts,
        api::prompts::get_prompt,
        api::prompts::update_prompt
    ),
    components(
        schemas(
            api::conversations::HistoryResponse,
            api::conversations::ConversationItem,
            api::ErrorResponse,
            api::prompts::PromptListResponse,
            api::prompts::PromptListItem,
            api::prompts::PromptResponse,
            api::prompts::UpdatePromptRequest,
            api::prompts::UpdatePromptResponse
        )
    ),
    tags(
        (name = "conversations", description = "Stored pipeline runs"),
        (name = "prompts", description = "Editable prompt templates")
    )
)]
struct ApiDoc;

// === OpenAPI Handler ===

async fn serve_openapi() -> impl IntoResponse {
    let doc = ApiDoc::openapi().to_json().unwrap_or_default();
    ([(header::CONTENT_TYPE, "application/json")], doc)
}

/// Install the global subscriber: fmt output filtered by RUST_LOG (default `info`)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();
}

/// Open the database and wire the orchestrator to the live gateway
fn build_state(config: &TriadConfig) -> anyhow::Result<SharedState> {
    let gateway_config = config
        .require_gateway()
        .context("Gateway is not configured")?
        .clone();

    let db = Arc::new(
        TriadDb::open_at(&config.db_path)
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    match db.seed_prompts() {
        Ok(count) if count > 0 => tracing::info!("Seeded {} default prompts", count),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to seed prompts: {}", e),
    }

    Ok(assemble_state(
        db,
        Arc::new(OpenAiGateway::new(gateway_config)),
        config,
    ))
}

fn assemble_state(
    db: Arc<TriadDb>,
    gateway: Arc<OpenAiGateway>,
    config: &TriadConfig,
) -> SharedState {
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(db.connection()));
    let orchestrator = Orchestrator::new(gateway, store.clone(), config.pipeline.clone())
        .with_prompts(PromptLibrary::with_db(db.clone()));

    Arc::new(AppState {
        db,
        store,
        orchestrator: Arc::new(orchestrator),
    })
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(api::ws::ws_handler))
        .route("/history/:user_id", get(api::conversations::get_history))
        .route(
            "/conversation/:thread_id",
            get(api::conversations::get_conversation),
        )
        .nest("/api/prompts", api::prompts::prompt_routes())
        .route("/api/openapi.json", get(serve_openapi))
        .with_state(state)
}

// === Server Entry ===

async fn run_server(config: TriadConfig, port: Option<u16>, host: std::net::IpAddr) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let app = router(state);

    let addr = SocketAddr::new(host, port.unwrap_or(config.port));
    tracing::info!("Triad server running at http://{}", addr);
    tracing::info!("   Stream:        ws://{}/ws", addr);
    tracing::info!("   History:       /history/{{user_id}}, /conversation/{{thread_id}}");
    tracing::info!("   Prompts:       /api/prompts/{{slug}} (GET, PUT)");
    tracing::info!("   OpenAPI:       /api/openapi.json");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run one pipeline and print each event as a JSON line
async fn run_once(config: TriadConfig, prompt: String, user_id: String) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let request = RunRequest::new(prompt).with_user(user_id);

    let mut events = state.orchestrator.clone().stream(request)?;
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn print_history(config: TriadConfig, user_id: String) -> anyhow::Result<()> {
    let db = TriadDb::open_at(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let store = SqliteConversationStore::new(db.connection());

    let conversations = store.list_for_user(&user_id)?;
    if conversations.is_empty() {
        println!("No conversations for {}", user_id);
    }
    for item in conversations {
        println!("{}  {}", item.thread_id, item.user_prompt);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = TriadConfig::load(&args.config).context("Failed to load configuration")?;

    match args.command {
        Some(CliCommand::Serve { port, host }) => run_server(config, port, host).await,
        Some(CliCommand::Run { prompt, user_id }) => run_once(config, prompt, user_id).await,
        Some(CliCommand::History { user_id }) => print_history(config, user_id),
        None => {
            run_server(config, None, std::net::IpAddr::from([127, 0, 0, 1])).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use triad_core::models::GatewayConfig;
    use triad_core::state::PipelineState;

    /// State backed by an in-memory database; the gateway is never called
    pub(crate) fn test_state() -> SharedState {
        let db = Arc::new(TriadDb::open_in_memory().unwrap());
        db.seed_prompts().unwrap();
        let gateway = Arc::new(OpenAiGateway::new(GatewayConfig::new(
            "http://127.0.0.1:9",
            "test-key",
        )));
        assemble_state(db, gateway, &TriadConfig::default())
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_history_and_conversation_endpoints() {
        let state = test_state();
        let mut saved = PipelineState::new("What is 2+2?", "t-1");
        saved.final_answer = "4".to_string();
        state.store.save("alice", &saved).unwrap();

        let app = router(state);

        let response = app.clone().oneshot(get("/history/alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "user_id": "alice",
                "conversations": [{"thread_id": "t-1", "user_prompt": "What is 2+2?"}]
            })
        );

        let response = app.clone().oneshot(get("/conversation/t-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["final_answer"], "4");
        assert_eq!(body["user_prompt"], "What is 2+2?");

        let response = app.oneshot(get("/conversation/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Conversation not found"})
        );
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_history() {
        let app = router(test_state());
        let response = app.oneshot(get("/history/nobody")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["conversations"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_openapi_lists_read_endpoints() {
        let app = router(test_state());
        let response = app.oneshot(get("/api/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let doc = body_json(response).await;
        assert!(doc["paths"].get("/history/{user_id}").is_some());
        assert!(doc["paths"].get("/conversation/{thread_id}").is_some());
        assert!(doc["paths"].get("/api/prompts/{slug}").is_some());
    }
}
