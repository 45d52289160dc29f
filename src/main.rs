use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tallerbot::config::AppConfig;
use tallerbot::db;
use tallerbot::handlers;
use tallerbot::services::ai::openai::OpenAiProvider;
use tallerbot::services::backend::HttpBackend;
use tallerbot::services::catalog;
use tallerbot::services::sessions::{spawn_session_sweeper, SessionLocks};
use tallerbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)
        .with_context(|| format!("failed to initialize database at {}", config.database_url))?;

    let services = catalog::load_services(&config.data_dir);
    let problems = catalog::load_problems(&config.data_dir);
    tracing::info!(
        services = services.len(),
        problems = problems.len(),
        data_dir = %config.data_dir,
        "catalogs loaded"
    );

    if config.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set, specific questions will get an apology");
    }

    let timeout = Duration::from_secs(config.http_timeout_secs);
    let llm = OpenAiProvider::new(
        config.openai_url.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        timeout,
    )?;
    tracing::info!("using OpenAI-compatible provider (model: {})", config.openai_model);

    let backend = HttpBackend::new(config.backend_url.clone(), timeout)?;
    tracing::info!("registration backend at {}", config.backend_url);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        llm: Box::new(llm),
        backend: Box::new(backend),
        sessions: SessionLocks::new(),
    });

    spawn_session_sweeper(Arc::clone(&state), Duration::from_secs(60));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route("/usuarios", post(handlers::registry::create_user))
        .route("/vehiculos", post(handlers::registry::create_vehicle))
        .route("/reservas", post(handlers::registry::create_booking))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
