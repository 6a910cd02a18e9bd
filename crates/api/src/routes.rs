use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post},
};
use chrono::Local;
use inference::{DetectionResult, LoadedModel, Predictor};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use storage::{DEVICE_API, NewPrediction, StoredPrediction};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const DEFAULT_LATEST_LIMIT: u32 = 10;
const MAX_LATEST_LIMIT: u32 = 100;
const UPLOAD_FIELD: &str = "file";

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predictions/latest", get(latest))
        .route("/predictions/:id", get(prediction_by_id))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Cotton Weed Detection API",
        "status": "running",
        "endpoints": {
            "predict": "/predict",
            "health": "/health",
            "latest": "/predictions/latest",
            "prediction": "/predictions/{id}",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut body = json!({
        "status": "healthy",
        "model_loaded": state.model.is_some(),
    });
    if let Some(info) = &state.model_info {
        body["model_kind"] = json!(info.kind);
        body["model_strategy"] = json!(info.strategy);
        body["model_path"] = json!(info.path.display().to_string());
    }
    Json(body)
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    limit: Option<u32>,
}

#[derive(Serialize)]
struct LatestResponse {
    predictions: Vec<StoredPrediction>,
}

async fn latest(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<LatestResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LATEST_LIMIT)
        .min(MAX_LATEST_LIMIT);
    let predictions = state.store.latest(limit).await.map_err(ApiError::Query)?;
    Ok(Json(LatestResponse { predictions }))
}

async fn prediction_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredPrediction>, ApiError> {
    state
        .store
        .by_id(id)
        .await
        .map_err(ApiError::Query)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Prediction not found".to_string()))
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub result: DetectionResult,
    pub num_detections: usize,
}

async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    match run_prediction(&state, multipart).await {
        Ok((response, inference)) => {
            state.metrics.record_success(response.num_detections, inference);
            Ok(Json(response))
        }
        Err(e) => {
            state.metrics.record_error(e.kind());
            Err(e)
        }
    }
}

struct Upload {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(ApiError::MissingFile)
}

/// Decodes the upload and runs the predictor; the duration covers the predictor alone.
fn predict_upload(
    bytes: &[u8],
    predictor: &Predictor,
    model: &Mutex<LoadedModel>,
) -> Result<(DetectionResult, Duration), ApiError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
    let started = Instant::now();
    let result = predictor.predict(&image, &mut model)?;
    Ok((result, started.elapsed()))
}

async fn run_prediction(
    state: &AppState,
    multipart: Multipart,
) -> Result<(PredictionResponse, Duration), ApiError> {
    let upload = read_upload(multipart).await?;

    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(ApiError::Validation("File must be an image".to_string()));
    }

    let model = state.model.clone().ok_or(ApiError::ModelNotLoaded)?;
    let predictor = state.predictor.clone();
    let bytes = upload.bytes.clone();

    let (result, inference) =
        tokio::task::spawn_blocking(move || predict_upload(&bytes, &predictor, &model)).await??;

    let image_path = save_upload(&state.uploads_dir, &upload.file_name, &upload.bytes).await?;
    let id = state
        .store
        .save(&NewPrediction::new(image_path.display().to_string(), &result).with_device(DEVICE_API))
        .await
        .map_err(ApiError::Persistence)?;

    tracing::info!(
        id,
        detections = result.len(),
        inference_ms = inference.as_millis() as u64,
        path = %image_path.display(),
        "Prediction stored"
    );

    let response = PredictionResponse {
        num_detections: result.len(),
        result,
    };
    Ok((response, inference))
}

/// Writes the upload as `{dir}/{YYYYmmdd_HHMMSS}_{name}`.
async fn save_upload(dir: &FsPath, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir).await?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{stamp}_{}", sanitize_file_name(file_name)));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Keeps the final path component and replaces anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use inference::{
        InferenceBackend, InputKind, ModelInput, PredictorConfig, RawOutput, StrategyName,
    };
    use std::io::Cursor;

    const MODEL_TIME: Duration = Duration::from_millis(40);

    /// Takes a fixed time and finds nothing.
    struct Slow;

    impl InferenceBackend for Slow {
        fn input_kind(&self) -> InputKind {
            InputKind::Tensor
        }

        fn infer(&mut self, _input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
            std::thread::sleep(MODEL_TIME);
            Ok(RawOutput::Detections(Vec::new()))
        }
    }

    fn slow_model() -> Mutex<LoadedModel> {
        Mutex::new(LoadedModel::from_backend(
            "models/slow.onnx",
            StrategyName::OnnxSession,
            Box::new(Slow),
        ))
    }

    fn png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(16, 16)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_predict_upload_times_the_predictor_only() {
        let predictor = Predictor::new(PredictorConfig::default());
        let model = slow_model();

        let (result, inference) = predict_upload(&png(), &predictor, &model).unwrap();

        assert!(result.is_empty());
        assert!(inference >= MODEL_TIME);
        assert!(inference < MODEL_TIME * 25, "took {inference:?}");
    }

    #[test]
    fn test_predict_upload_rejects_undecodable_bytes() {
        let predictor = Predictor::new(PredictorConfig::default());
        let err = predict_upload(b"not an image", &predictor, &slow_model()).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("field.jpg"), "field.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\row 3.png"), "row_3.png");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");
    }
}
