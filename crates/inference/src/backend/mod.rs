use crate::detection::Detection;
use crate::errors::PredictError;
use image::RgbImage;
use ndarray::{Array2, ArrayD, ArrayViewD, Axis, Ix2};

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(feature = "torch-backend")]
pub mod torch;

#[cfg(feature = "tf-backend")]
pub mod keras;

#[cfg(any(feature = "ort-backend", feature = "torch-backend"))]
pub mod yolo;

/// What a backend wants to be fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The decoded RGB image; the backend does its own preprocessing.
    Image,
    /// The shared `[1, 3, H, W]` tensor scaled to `[0, 1]`.
    Tensor,
}

pub enum ModelInput<'a> {
    Image(&'a RgbImage),
    Tensor(ArrayViewD<'a, f32>),
}

impl ModelInput<'_> {
    pub fn kind(&self) -> InputKind {
        match self {
            ModelInput::Image(_) => InputKind::Image,
            ModelInput::Tensor(_) => InputKind::Tensor,
        }
    }
}

/// Model output before thresholding and rescaling.
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// Final detections in original image pixels.
    Detections(Vec<Detection>),
    /// Corner boxes `[N, 4]` in model input space with per-box score and class index.
    Labeled {
        boxes: Array2<f32>,
        scores: Vec<f32>,
        labels: Vec<i64>,
    },
    /// Rows of `cx, cy, w, h, confidence, class` in model input space.
    Rows(Array2<f32>),
}

impl RawOutput {
    /// Interprets a single output tensor as detection rows.
    ///
    /// A leading batch axis of size 1 is dropped from 3-D outputs; a 2-D
    /// tensor is already a row table, even with a single row.
    pub fn from_tensor(tensor: ArrayD<f32>) -> Result<Self, PredictError> {
        let tensor = squeeze_batch(tensor, 2);
        let shape = tensor.shape().to_vec();
        let rows = tensor.into_dimensionality::<Ix2>().map_err(|_| {
            PredictError::UnexpectedOutput(format!("expected [N, >=6] rows, got shape {shape:?}"))
        })?;
        if rows.ncols() < 6 {
            return Err(PredictError::UnexpectedOutput(format!(
                "expected at least 6 columns per row, got {}",
                rows.ncols()
            )));
        }
        Ok(RawOutput::Rows(rows))
    }
}

/// Drops a leading axis of length 1 when the tensor has more than `rank` axes.
pub fn squeeze_batch<T>(tensor: ArrayD<T>, rank: usize) -> ArrayD<T> {
    if tensor.ndim() > rank && tensor.shape()[0] == 1 {
        tensor.index_axis_move(Axis(0), 0)
    } else {
        tensor
    }
}

/// A loaded model runtime.
pub trait InferenceBackend: Send {
    fn input_kind(&self) -> InputKind;

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput>;
}

/// Settings for the self-contained YOLO detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloConfig {
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            input_size: (640, 640),
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
        }
    }
}
