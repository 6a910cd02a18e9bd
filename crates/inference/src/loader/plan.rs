use crate::errors::LoadError;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// File extensions the loader knows how to dispatch.
pub const RECOGNIZED_EXTENSIONS: [&str; 5] = ["pt", "pth", "onnx", "h5", "pb"];

/// Filename marker selecting the integrated detector first.
const YOLO_MARKER: &str = "yolo";

/// Family of runtime needed to execute a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelKind {
    #[serde(rename = "yolo")]
    Yolo,
    #[serde(rename = "generic-tensor")]
    GenericTensor,
    #[serde(rename = "onnx")]
    Onnx,
    #[serde(rename = "keras")]
    Keras,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Yolo => "yolo",
            ModelKind::GenericTensor => "generic-tensor",
            ModelKind::Onnx => "onnx",
            ModelKind::Keras => "keras",
            ModelKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named way of turning a model file into a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyName {
    /// Self-contained detector with its own letterboxing, NMS and label table.
    YoloDetector,
    /// Generic ONNX graph fed the shared preprocessed tensor.
    OnnxSession,
    /// Whole serialized TorchScript module.
    TorchScript,
    /// Named parameter tensors without an attached architecture.
    StateDict,
    /// Keras SavedModel or frozen TensorFlow graph.
    KerasGraph,
}

impl StrategyName {
    pub fn kind(&self) -> ModelKind {
        match self {
            StrategyName::YoloDetector => ModelKind::Yolo,
            StrategyName::OnnxSession => ModelKind::Onnx,
            StrategyName::TorchScript | StrategyName::StateDict => ModelKind::GenericTensor,
            StrategyName::KerasGraph => ModelKind::Keras,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::YoloDetector => "yolo-detector",
            StrategyName::OnnxSession => "onnx-session",
            StrategyName::TorchScript => "torchscript",
            StrategyName::StateDict => "state-dict",
            StrategyName::KerasGraph => "keras-graph",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn has_recognized_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.as_str()))
}

/// Ordered strategies to try for one model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    strategies: Vec<StrategyName>,
}

impl LoadPlan {
    /// Picks strategies from the filename marker and the extension.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` when the extension is not one of [`RECOGNIZED_EXTENSIONS`].
    pub fn for_path(path: &Path) -> Result<Self, LoadError> {
        let ext = extension_of(path).unwrap_or_default();
        if !RECOGNIZED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(LoadError::UnsupportedFormat(if ext.is_empty() {
                "<none>".to_string()
            } else {
                format!(".{ext}")
            }));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        // Checkpoints are tried as YOLO exports first, marker or not
        let checkpoint = matches!(ext.as_str(), "pt" | "pth");
        let mut strategies = Vec::with_capacity(3);
        if checkpoint || file_name.contains(YOLO_MARKER) {
            strategies.push(StrategyName::YoloDetector);
        }

        match ext.as_str() {
            "onnx" => strategies.push(StrategyName::OnnxSession),
            "pt" | "pth" => {
                strategies.push(StrategyName::TorchScript);
                strategies.push(StrategyName::StateDict);
            }
            _ => strategies.push(StrategyName::KerasGraph),
        }

        Ok(Self { strategies })
    }

    pub fn strategies(&self) -> &[StrategyName] {
        &self.strategies
    }

    /// Kind of the first strategy that will be tried.
    pub fn primary_kind(&self) -> ModelKind {
        self.strategies
            .first()
            .map(StrategyName::kind)
            .unwrap_or(ModelKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(name: &str) -> Result<LoadPlan, LoadError> {
        LoadPlan::for_path(Path::new(name))
    }

    #[test]
    fn test_onnx_without_marker() {
        let plan = plan("models/foo.onnx").unwrap();
        assert_eq!(plan.strategies(), &[StrategyName::OnnxSession]);
        assert_eq!(plan.primary_kind(), ModelKind::Onnx);
    }

    #[test]
    fn test_yolo_marker_goes_first() {
        let plan = plan("models/YOLOv8n_best_model.pt").unwrap();
        assert_eq!(
            plan.strategies(),
            &[
                StrategyName::YoloDetector,
                StrategyName::TorchScript,
                StrategyName::StateDict
            ]
        );
        assert_eq!(plan.primary_kind(), ModelKind::Yolo);

        let plan = self::plan("weed_yolo.onnx").unwrap();
        assert_eq!(
            plan.strategies(),
            &[StrategyName::YoloDetector, StrategyName::OnnxSession]
        );
    }

    #[test]
    fn test_unmarked_checkpoint_tries_yolo_then_whole_model_then_state_dict() {
        for name in ["cotton_weed_model.pth", "models/best.pt"] {
            let plan = plan(name).unwrap();
            assert_eq!(
                plan.strategies(),
                &[
                    StrategyName::YoloDetector,
                    StrategyName::TorchScript,
                    StrategyName::StateDict
                ],
                "{name}"
            );
            assert_eq!(plan.primary_kind(), ModelKind::Yolo);
        }
    }

    #[test]
    fn test_keras_extensions() {
        assert_eq!(plan("model.h5").unwrap().primary_kind(), ModelKind::Keras);
        assert_eq!(plan("frozen.PB").unwrap().primary_kind(), ModelKind::Keras);
    }

    #[test]
    fn test_unsupported_extensions() {
        match plan("model.tflite") {
            Err(LoadError::UnsupportedFormat(ext)) => assert_eq!(ext, ".tflite"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
        match plan("yolo_without_extension") {
            Err(LoadError::UnsupportedFormat(ext)) => assert_eq!(ext, "<none>"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ModelKind::GenericTensor).unwrap(),
            "\"generic-tensor\""
        );
        assert_eq!(
            serde_json::to_string(&StrategyName::YoloDetector).unwrap(),
            "\"yolo-detector\""
        );
    }
}
