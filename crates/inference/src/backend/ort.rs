use super::{InferenceBackend, InputKind, ModelInput, RawOutput, squeeze_batch};
use ndarray::Ix2;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

const INTRA_THREADS: usize = 4;

/// Output names of torchvision-style detection graphs.
const LABELED_OUTPUTS: [&str; 3] = ["boxes", "scores", "labels"];

/// Opens an ONNX Runtime session on the CPU.
pub(crate) fn open_session(path: &Path) -> anyhow::Result<Session> {
    // Initialize ORT environment (idempotent)
    let _ = ort::init().commit();

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(INTRA_THREADS)?
        .commit_from_file(path)?;

    tracing::info!(path = %path.display(), "ONNX Runtime session created");
    Ok(session)
}

/// Generic ONNX graph fed the shared preprocessed tensor.
///
/// Graphs exposing `boxes`, `scores` and `labels` outputs yield
/// [`RawOutput::Labeled`]; anything else is read from the first output as rows.
pub struct OrtBackend {
    session: Session,
}

impl OrtBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            session: open_session(path)?,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn input_kind(&self) -> InputKind {
        InputKind::Tensor
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
        let ModelInput::Tensor(tensor) = input else {
            anyhow::bail!("ONNX session expects a preprocessed tensor");
        };

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor)?])?;

        if LABELED_OUTPUTS.iter().all(|name| outputs.get(*name).is_some()) {
            let boxes = outputs["boxes"].try_extract_array::<f32>()?.into_owned();
            let boxes = squeeze_batch(boxes, 2);
            let scores = outputs["scores"].try_extract_array::<f32>()?;
            let labels = outputs["labels"].try_extract_array::<i64>()?;

            let shape = boxes.shape().to_vec();
            let boxes = boxes
                .into_dimensionality::<Ix2>()
                .map_err(|_| anyhow::anyhow!("boxes output has shape {shape:?}, expected [N, 4]"))?;

            return Ok(RawOutput::Labeled {
                boxes,
                scores: scores.iter().copied().collect(),
                labels: labels.iter().copied().collect(),
            });
        }

        let first = outputs[0].try_extract_array::<f32>()?.into_owned();
        Ok(RawOutput::from_tensor(first)?)
    }
}
