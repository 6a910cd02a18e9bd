use super::{InferenceBackend, InputKind, ModelInput, RawOutput, YoloConfig};
use crate::detection::{Detection, class_label};
use crate::labels::parse_class_names;
use crate::loader::plan::extension_of;
use crate::processing::{
    post::{check_yolo_head, decode_yolo, non_max_suppression},
    pre::PreProcessor,
};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::collections::HashMap;
use std::path::Path;

/// Metadata key holding the class-name table in exported detectors.
pub const NAMES_METADATA_KEY: &str = "names";

enum Runtime {
    #[cfg(feature = "ort-backend")]
    Onnx(ort::session::Session),
    #[cfg(feature = "torch-backend")]
    TorchScript(tch::CModule),
}

impl Runtime {
    fn run(&mut self, input: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        match self {
            #[cfg(feature = "ort-backend")]
            Runtime::Onnx(session) => {
                let outputs = session.run(ort::inputs![
                    ort::value::TensorRef::from_array_view(input)?
                ])?;
                Ok(outputs[0].try_extract_array::<f32>()?.into_owned())
            }
            #[cfg(feature = "torch-backend")]
            Runtime::TorchScript(module) => {
                use super::torch::{first_tensor, to_array, to_tensor};
                let tensor = to_tensor(input)?;
                let output =
                    tch::no_grad(|| module.forward_is(&[tch::IValue::Tensor(tensor)]))?;
                to_array(&first_tensor(output)?)
            }
        }
    }
}

/// Self-contained YOLOv8 detector.
///
/// Does its own letterboxing, confidence filtering and NMS, and returns
/// detections already in original image pixels with class names attached.
pub struct YoloDetector {
    runtime: Runtime,
    names: HashMap<i64, String>,
    config: YoloConfig,
    preprocessor: PreProcessor,
}

impl YoloDetector {
    pub fn load(path: &Path, config: YoloConfig) -> anyhow::Result<Self> {
        let (mut runtime, names) = match extension_of(path).as_deref() {
            #[cfg(feature = "ort-backend")]
            Some("onnx") => {
                let session = super::ort::open_session(path)?;
                let names = session
                    .metadata()
                    .ok()
                    .and_then(|meta| meta.custom(NAMES_METADATA_KEY))
                    .map(|raw| parse_class_names(&raw))
                    .unwrap_or_default();
                (Runtime::Onnx(session), names)
            }
            #[cfg(feature = "torch-backend")]
            Some("pt" | "pth") => {
                let module = super::torch::load_module(path)?;
                (Runtime::TorchScript(module), HashMap::new())
            }
            other => anyhow::bail!(
                "no YOLO runtime for {} files in this build",
                other.map(|ext| format!(".{ext}")).unwrap_or_else(|| "extensionless".into())
            ),
        };

        // Any TorchScript module loads; only a full anchor grid marks a detection head
        let (width, height) = config.input_size;
        let blank = ArrayD::<f32>::zeros(IxDyn(&[1, 3, height as usize, width as usize]));
        let head = runtime.run(blank.view())?;
        check_yolo_head(head.view(), config.input_size)
            .map_err(|e| anyhow::anyhow!("not a YOLO detection head: {e}"))?;

        if names.is_empty() {
            tracing::warn!(
                path = %path.display(),
                "Detector carries no class names, falling back to indexed labels"
            );
        } else {
            tracing::info!(classes = names.len(), "Detector class names loaded");
        }

        Ok(Self::with_names(runtime, names, config))
    }

    fn with_names(runtime: Runtime, names: HashMap<i64, String>, config: YoloConfig) -> Self {
        Self {
            runtime,
            names,
            config,
            preprocessor: PreProcessor::new(config.input_size),
        }
    }

    pub fn class_names(&self) -> &HashMap<i64, String> {
        &self.names
    }

    fn label(&self, class_id: i64) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| class_label(class_id))
    }
}

impl InferenceBackend for YoloDetector {
    fn input_kind(&self) -> InputKind {
        InputKind::Image
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
        let ModelInput::Image(image) = input else {
            anyhow::bail!("YOLO detector expects the decoded image");
        };

        let (tensor, transform) = self.preprocessor.letterbox(image)?;
        let head = self.runtime.run(tensor.view())?;

        let candidates = decode_yolo(head.view(), self.config.confidence_threshold)?;
        let kept = non_max_suppression(candidates, self.config.iou_threshold);

        tracing::debug!(detections = kept.len(), "YOLO detections after NMS");

        Ok(RawOutput::Detections(
            kept.into_iter()
                .map(|c| Detection::new(transform.to_original(c.bbox), self.label(c.class_id), c.score))
                .collect(),
        ))
    }
}
