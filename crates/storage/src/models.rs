use chrono::NaiveDateTime;
use inference::DetectionResult;
use serde::Serialize;
use sqlx::types::Json;

/// Device tag written by the HTTP service.
pub const DEVICE_API: &str = "api";

/// Device tag used when the caller does not name one.
pub const DEVICE_UNKNOWN: &str = "unknown";

/// A row of the `predictions` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredPrediction {
    pub id: i64,
    pub image_path: String,
    pub predictions_json: Json<DetectionResult>,
    pub created_at: NaiveDateTime,
    pub device_type: String,
}

/// Input for `PredictionStore::save`.
#[derive(Debug, Clone)]
pub struct NewPrediction<'a> {
    pub image_path: String,
    pub predictions: &'a DetectionResult,
    pub device_type: String,
}

impl<'a> NewPrediction<'a> {
    pub fn new(image_path: impl Into<String>, predictions: &'a DetectionResult) -> Self {
        Self {
            image_path: image_path.into(),
            predictions,
            device_type: DEVICE_UNKNOWN.to_string(),
        }
    }

    pub fn with_device(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }
}
