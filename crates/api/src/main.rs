use anyhow::Context;
use api::{ApiConfig, AppState, router};
use common::{TelemetryGuard, setup_logging};
use inference::{ModelLoader, Predictor};
use storage::PredictionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;

    // Telemetry before logging so the tracing bridge binds to the exporting provider
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("api", endpoint)?),
        None => None,
    };
    setup_logging("api", config.environment);

    tracing::info!(
        environment = config.environment.as_str(),
        addr = %config.addr,
        db = %config.db_path.display(),
        "API service starting"
    );

    let store = PredictionStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let loader = ModelLoader::new(config.search_paths()).with_yolo_config(config.yolo_config());
    let model = match loader.load(config.model_path.as_deref()) {
        Ok(model) => {
            tracing::info!(
                path = %model.path().display(),
                kind = %model.kind(),
                strategy = %model.strategy(),
                "Model ready"
            );
            Some(model)
        }
        Err(e) => {
            tracing::error!(error = %e, "Model failed to load, /predict will return errors");
            None
        }
    };

    let predictor = Predictor::new(config.predictor_config());
    let state = AppState::new(model, predictor, store.clone(), config.uploads_dir.clone());
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("API service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
