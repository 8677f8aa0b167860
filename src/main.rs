use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use data_discovery::api;
use data_discovery::config::Config;
use data_discovery::endpoint::query::is_endpoint_supported;
use data_discovery::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    if config.serving_endpoint.is_empty() {
        anyhow::bail!(
            "no serving endpoint configured; set the SERVING_ENDPOINT environment variable"
        );
    }
    tracing::info!("Workspace: {}", config.workspace_url);
    tracing::info!("Serving endpoint: {}", config.serving_endpoint);

    let state = AppState::new(config.clone())?;

    // Startup task-type check; queries proceed either way
    if let Some(token) = &config.token {
        if !is_endpoint_supported(&state.http_client, &config, token).await {
            tracing::warn!(
                "endpoint {} does not advertise a conversational task type; proceeding anyway",
                config.serving_endpoint
            );
        }
    }

    // No CORS layer: the UI is served from the same origin so cross-origin
    // access is unnecessary. This prevents drive-by attacks from malicious pages.
    let app = Router::new()
        // Serve frontend
        .route("/", get(serve_index))
        // API routes
        .route("/api/query", post(api::query::query))
        .route("/api/query/stream", post(api::query::query_stream))
        .route("/api/results/{session_id}", get(api::results::get_results))
        .route("/api/access-request", post(api::access::request_access))
        .with_state(state)
        .fallback(get(serve_index));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
