use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use job_stream::config::Config;
use job_stream::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,job_stream=info".into()),
        )
        .init();

    let config = Config::from_env();
    let state = AppState::from_config(&config);
    let registry = state.registry.clone();
    let app = job_stream::app(state, config.static_dir.clone());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(
        addr = %config.addr,
        static_dir = ?config.static_dir,
        "job stream server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            let closed = registry.close_all();
            info!(sessions = closed, "shutting down");
        })
        .await?;

    Ok(())
}
