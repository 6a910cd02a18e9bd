pub mod backend;
pub mod detection;
pub mod errors;
pub mod labels;
pub mod loader;
pub mod predictor;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InputKind, ModelInput, RawOutput, YoloConfig};
pub use detection::{Detection, DetectionRef, DetectionResult, Rescale, class_label};
pub use errors::{LoadError, PredictError, StrategyAttempt};
pub use loader::{LoadPlan, LoadedModel, ModelKind, ModelLoader, SearchPaths, StrategyName};
pub use predictor::{Predictor, PredictorConfig};
