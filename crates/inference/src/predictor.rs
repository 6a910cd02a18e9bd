use crate::backend::{InputKind, ModelInput, RawOutput};
use crate::detection::{DetectionResult, Rescale};
use crate::errors::PredictError;
use crate::loader::LoadedModel;
use crate::processing::{post::PostProcessor, pre::PreProcessor};
use common::span;
use image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorConfig {
    /// `(width, height)` the shared tensor is resized to.
    pub input_size: (u32, u32),
    /// Minimum score kept from tensor-fed backends.
    pub confidence_threshold: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            input_size: (640, 640),
            confidence_threshold: 0.5,
        }
    }
}

/// Runs one image through a loaded model and normalizes the output.
#[derive(Debug, Clone)]
pub struct Predictor {
    config: PredictorConfig,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config.confidence_threshold),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Predicts on `image`.
    ///
    /// An empty result means the model ran and found nothing; failures are
    /// always reported as [`PredictError`].
    #[tracing::instrument(
        name = "predict",
        skip_all,
        fields(width = image.width(), height = image.height(), kind = %model.kind())
    )]
    pub fn predict(
        &self,
        image: &RgbImage,
        model: &mut LoadedModel,
    ) -> Result<DetectionResult, PredictError> {
        let backend = model.backend_mut();

        let raw = match backend.input_kind() {
            InputKind::Image => {
                let _s = span!("model_inference");
                backend.infer(ModelInput::Image(image)).map_err(from_backend)?
            }
            InputKind::Tensor => {
                let tensor = {
                    let _s = span!("preprocess");
                    self.preprocessor
                        .preprocess(image)
                        .map_err(PredictError::Preprocess)?
                };
                let _s = span!("model_inference");
                backend
                    .infer(ModelInput::Tensor(tensor.view()))
                    .map_err(from_backend)?
            }
        };

        let _s = span!("postprocess");
        let rescale = Rescale::between(image.dimensions(), self.config.input_size);
        let result = self.postprocessor.process(raw, &rescale)?;

        tracing::debug!(detections = result.len(), "Prediction complete");
        Ok(result)
    }

    /// Same as [`Predictor::predict`] when the backend output is already at hand.
    pub fn postprocess(
        &self,
        raw: RawOutput,
        original_size: (u32, u32),
    ) -> Result<DetectionResult, PredictError> {
        let rescale = Rescale::between(original_size, self.config.input_size);
        self.postprocessor.process(raw, &rescale)
    }
}

/// Keeps typed errors raised inside backends, wraps the rest as inference failures.
fn from_backend(err: anyhow::Error) -> PredictError {
    match err.downcast::<PredictError>() {
        Ok(typed) => typed,
        Err(other) => PredictError::Inference(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use crate::detection::Detection;
    use crate::loader::StrategyName;
    use image::Rgb;
    use ndarray::Array2;

    /// Returns one fixed row in 640x640 space.
    struct RowBackend;

    impl InferenceBackend for RowBackend {
        fn input_kind(&self) -> InputKind {
            InputKind::Tensor
        }

        fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
            let ModelInput::Tensor(view) = input else {
                anyhow::bail!("expected tensor input");
            };
            anyhow::ensure!(view.shape() == [1, 3, 640, 640], "bad shape {:?}", view.shape());
            let rows =
                Array2::from_shape_vec((1, 6), vec![320.0, 320.0, 100.0, 50.0, 0.9, 1.0])?;
            Ok(RawOutput::Rows(rows))
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn input_kind(&self) -> InputKind {
            InputKind::Tensor
        }

        fn infer(&mut self, _input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
            anyhow::bail!("session exploded")
        }
    }

    struct ImageBackend;

    impl InferenceBackend for ImageBackend {
        fn input_kind(&self) -> InputKind {
            InputKind::Image
        }

        fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
            let ModelInput::Image(image) = input else {
                anyhow::bail!("expected image input");
            };
            let (w, h) = image.dimensions();
            Ok(RawOutput::Detections(vec![Detection::new(
                [0.0, 0.0, w as f32, h as f32],
                "carpetweed",
                0.3,
            )]))
        }
    }

    fn image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([10, 120, 30]))
    }

    #[test]
    fn test_tensor_backend_output_is_rescaled() {
        let mut model = LoadedModel::from_backend(
            "stub.onnx",
            StrategyName::OnnxSession,
            Box::new(RowBackend),
        );

        let result = Predictor::new(PredictorConfig::default())
            .predict(&image(1280, 320), &mut model)
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.classes(), &["weed_class_1"]);
        // [270, 295, 370, 345] scaled by (2.0, 0.5)
        assert_eq!(result.boxes()[0], [540.0, 147.5, 740.0, 172.5]);
    }

    #[test]
    fn test_image_backend_bypasses_shared_threshold() {
        let mut model = LoadedModel::from_backend(
            "yolo.onnx",
            StrategyName::YoloDetector,
            Box::new(ImageBackend),
        );

        let result = Predictor::new(PredictorConfig::default())
            .predict(&image(300, 200), &mut model)
            .unwrap();

        // 0.3 is below the shared 0.5 but the detector applies its own floor
        assert_eq!(result.len(), 1);
        assert_eq!(result.boxes()[0], [0.0, 0.0, 300.0, 200.0]);
    }

    #[test]
    fn test_inference_failure_is_not_an_empty_result() {
        let mut model = LoadedModel::from_backend(
            "stub.pt",
            StrategyName::TorchScript,
            Box::new(FailingBackend),
        );

        let err = Predictor::new(PredictorConfig::default())
            .predict(&image(64, 64), &mut model)
            .unwrap_err();

        assert_eq!(err.kind(), "inference");
        assert!(err.to_string().contains("session exploded"));
    }

    #[test]
    fn test_typed_backend_errors_are_preserved() {
        let err = from_backend(anyhow::Error::new(PredictError::UnexpectedOutput(
            "shape [3]".into(),
        )));
        assert_eq!(err.kind(), "unexpected_output");
    }

    #[test]
    fn test_threshold_is_configurable() {
        let predictor = Predictor::new(PredictorConfig {
            confidence_threshold: 0.95,
            ..PredictorConfig::default()
        });
        let rows = Array2::from_shape_vec((1, 6), vec![10.0, 10.0, 2.0, 2.0, 0.9, 0.0]).unwrap();

        let result = predictor.postprocess(RawOutput::Rows(rows), (640, 640)).unwrap();
        assert!(result.is_empty());
    }
}
