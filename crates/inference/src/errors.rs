use crate::loader::plan::StrategyName;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Outcome of one loading strategy, kept on the handle for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: StrategyName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StrategyAttempt {
    pub fn succeeded(strategy: StrategyName) -> Self {
        Self {
            strategy,
            error: None,
        }
    }

    pub fn failed(strategy: StrategyName, error: &LoadError) -> Self {
        Self {
            strategy,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("{strategy} runtime not compiled in (enable the `{feature}` feature)")]
    BackendUnavailable {
        strategy: StrategyName,
        feature: &'static str,
    },

    #[error("{strategy} could not load {}: {source:#}", .path.display())]
    Load {
        strategy: StrategyName,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("no loading strategy succeeded for {}", .path.display())]
    AllStrategiesFailed {
        path: PathBuf,
        attempts: Vec<StrategyAttempt>,
    },
}

/// Failure while running a prediction.
///
/// Kept separate from an empty [`crate::DetectionResult`], which means the model
/// ran and found nothing.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("failed to preprocess image: {0:#}")]
    Preprocess(#[source] anyhow::Error),

    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),

    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

impl PredictError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::Preprocess(_) => "preprocess",
            PredictError::Inference(_) => "inference",
            PredictError::UnexpectedOutput(_) => "unexpected_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = LoadError::ModelNotFound("models/model.pt".into());
        assert_eq!(err.to_string(), "model file not found: models/model.pt");

        let err = LoadError::UnsupportedFormat(".tflite".into());
        assert_eq!(err.to_string(), "unsupported model format: .tflite");

        let err = LoadError::BackendUnavailable {
            strategy: StrategyName::TorchScript,
            feature: "torch-backend",
        };
        assert_eq!(
            err.to_string(),
            "torchscript runtime not compiled in (enable the `torch-backend` feature)"
        );

        let err = LoadError::Load {
            strategy: StrategyName::OnnxSession,
            path: PathBuf::from("models/foo.onnx"),
            source: anyhow::anyhow!("protobuf parsing failed"),
        };
        assert_eq!(
            err.to_string(),
            "onnx-session could not load models/foo.onnx: protobuf parsing failed"
        );
    }

    #[test]
    fn test_attempt_records_error_text() {
        let err = LoadError::UnsupportedFormat(".bin".into());
        let attempt = StrategyAttempt::failed(StrategyName::KerasGraph, &err);
        assert!(!attempt.is_success());
        assert_eq!(
            attempt.error.as_deref(),
            Some("unsupported model format: .bin")
        );
        assert!(StrategyAttempt::succeeded(StrategyName::KerasGraph).is_success());
    }

    #[test]
    fn test_predict_error_kinds() {
        assert_eq!(
            PredictError::Inference(anyhow::anyhow!("boom")).kind(),
            "inference"
        );
        assert_eq!(
            PredictError::UnexpectedOutput("shape".into()).kind(),
            "unexpected_output"
        );
    }
}
