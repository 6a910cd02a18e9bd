use anyhow::Context;
use common::setup_logging;
use frontend::{Annotator, ApiClient, FrontendConfig, FrontendState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FrontendConfig::from_env();
    setup_logging("frontend", config.environment);

    tracing::info!(
        addr = %config.addr,
        api_url = %config.api_url,
        timeout_secs = config.api_timeout.as_secs(),
        "Frontend starting"
    );

    let client = ApiClient::new(&config.api_url, config.api_timeout)?;
    let annotator = Annotator::load(config.font_path.as_deref());
    let labels = annotator.has_font();
    let app = router(FrontendState::new(client, annotator));

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, labels, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
