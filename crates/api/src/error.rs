use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::PredictError;
use serde_json::json;
use storage::StoreError;
use thiserror::Error;

/// Body detail for every failure on the prediction path.
pub const PREDICT_FAILED: &str = "Error processing image";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("multipart field `file` is missing")]
    MissingFile,

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no model is loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    Inference(#[from] PredictError),

    #[error("failed to save prediction: {0}")]
    Persistence(#[source] StoreError),

    #[error("failed to read predictions: {0}")]
    Query(#[source] StoreError),

    #[error("failed to store upload: {0}")]
    Upload(#[from] std::io::Error),

    #[error("prediction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::MissingFile => "missing_file",
            ApiError::Multipart(_) => "multipart",
            ApiError::Decode(_) => "decode",
            ApiError::ModelNotLoaded => "model_not_loaded",
            ApiError::Inference(e) => e.kind(),
            ApiError::Persistence(_) => "persistence",
            ApiError::Query(_) => "query",
            ApiError::Upload(_) => "upload",
            ApiError::Join(_) => "join",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Validation(msg) | ApiError::NotFound(msg) => msg.clone(),
            ApiError::Query(_) => "Error reading predictions".to_string(),
            _ => PREDICT_FAILED.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::info!(kind = self.kind(), %status, "Request rejected");
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("File must be an image".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Prediction not found".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ModelNotLoaded.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Inference(PredictError::Inference(anyhow::anyhow!("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_kinds_distinguish_causes() {
        assert_eq!(ApiError::ModelNotLoaded.kind(), "model_not_loaded");
        assert_eq!(
            ApiError::Inference(PredictError::UnexpectedOutput("rank 5".into())).kind(),
            "unexpected_output"
        );
        assert_eq!(ApiError::MissingFile.kind(), "missing_file");
    }
}
