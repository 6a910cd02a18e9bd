use crate::metrics::ApiMetrics;
use inference::{LoadedModel, ModelKind, Predictor, StrategyName};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use storage::PredictionStore;

/// What `/health` reports about the loaded model, readable without the model lock.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub strategy: StrategyName,
}

#[derive(Clone)]
pub struct AppState {
    /// `None` when loading failed at startup; predictions then fail with a 500.
    pub model: Option<Arc<Mutex<LoadedModel>>>,
    pub model_info: Option<ModelInfo>,
    pub predictor: Arc<Predictor>,
    pub store: PredictionStore,
    pub uploads_dir: Arc<PathBuf>,
    pub metrics: ApiMetrics,
}

impl AppState {
    pub fn new(
        model: Option<LoadedModel>,
        predictor: Predictor,
        store: PredictionStore,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        let model_info = model.as_ref().map(|m| ModelInfo {
            kind: m.kind(),
            path: m.path().to_path_buf(),
            strategy: m.strategy(),
        });

        Self {
            model: model.map(|m| Arc::new(Mutex::new(m))),
            model_info,
            predictor: Arc::new(predictor),
            store,
            uploads_dir: Arc::new(uploads_dir.into()),
            metrics: ApiMetrics::init("api"),
        }
    }
}
