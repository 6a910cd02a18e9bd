//! Model discovery and strategy-based loading.
//!
//! [`ModelLoader::load`] resolves a model file, builds a [`LoadPlan`] from its
//! name and extension, and tries each strategy in turn. Every attempt is
//! recorded on the returned [`LoadedModel`].

pub mod discovery;
pub mod plan;

pub use discovery::{CONVENTIONAL_FILENAMES, DEFAULT_MODEL_DIRS, SearchPaths};
pub use plan::{LoadPlan, ModelKind, RECOGNIZED_EXTENSIONS, StrategyName};

use crate::backend::{InferenceBackend, YoloConfig};
use crate::errors::{LoadError, StrategyAttempt};
use plan::extension_of;
use std::fmt;
use std::path::{Path, PathBuf};

/// A model ready for inference, plus how it was loaded.
pub struct LoadedModel {
    path: PathBuf,
    kind: ModelKind,
    strategy: StrategyName,
    attempts: Vec<StrategyAttempt>,
    backend: Box<dyn InferenceBackend>,
}

impl LoadedModel {
    /// Wraps an already constructed backend.
    pub fn from_backend(
        path: impl Into<PathBuf>,
        strategy: StrategyName,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: strategy.kind(),
            strategy,
            attempts: vec![StrategyAttempt::succeeded(strategy)],
            backend,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn strategy(&self) -> StrategyName {
        self.strategy
    }

    /// Every strategy tried, in order; the last one succeeded.
    pub fn attempts(&self) -> &[StrategyAttempt] {
        &self.attempts
    }

    pub fn backend_mut(&mut self) -> &mut dyn InferenceBackend {
        self.backend.as_mut()
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("strategy", &self.strategy)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    search: SearchPaths,
    yolo: YoloConfig,
}

impl ModelLoader {
    pub fn new(search: SearchPaths) -> Self {
        Self {
            search,
            yolo: YoloConfig::default(),
        }
    }

    pub fn with_yolo_config(mut self, yolo: YoloConfig) -> Self {
        self.yolo = yolo;
        self
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search
    }

    /// Resolves which file [`ModelLoader::load`] would use.
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf, LoadError> {
        self.search.resolve(explicit)
    }

    /// Resolves the model file and loads it with the first strategy that works.
    ///
    /// # Errors
    ///
    /// `ModelNotFound` or `UnsupportedFormat` before any strategy runs;
    /// `AllStrategiesFailed` with the recorded attempts otherwise.
    pub fn load(&self, explicit: Option<&Path>) -> Result<LoadedModel, LoadError> {
        let path = self.resolve(explicit)?;
        let plan = LoadPlan::for_path(&path)?;

        tracing::info!(
            path = %path.display(),
            kind = %plan.primary_kind(),
            strategies = ?plan.strategies(),
            "Loading model"
        );

        let mut attempts = Vec::with_capacity(plan.strategies().len());
        for &strategy in plan.strategies() {
            match self.try_strategy(strategy, &path) {
                Ok(backend) => {
                    attempts.push(StrategyAttempt::succeeded(strategy));
                    tracing::info!(
                        path = %path.display(),
                        %strategy,
                        kind = %strategy.kind(),
                        attempts = attempts.len(),
                        "Model loaded"
                    );
                    return Ok(LoadedModel {
                        kind: strategy.kind(),
                        path,
                        strategy,
                        attempts,
                        backend,
                    });
                }
                Err(e) => {
                    tracing::warn!(%strategy, error = %e, "Loading strategy failed");
                    attempts.push(StrategyAttempt::failed(strategy, &e));
                }
            }
        }

        Err(LoadError::AllStrategiesFailed { path, attempts })
    }

    fn try_strategy(
        &self,
        strategy: StrategyName,
        path: &Path,
    ) -> Result<Box<dyn InferenceBackend>, LoadError> {
        let feature = required_feature(strategy, path);
        if !feature_enabled(feature) {
            return Err(LoadError::BackendUnavailable { strategy, feature });
        }

        self.build_backend(strategy, path)
            .map_err(|source| LoadError::Load {
                strategy,
                path: path.to_path_buf(),
                source,
            })
    }

    fn build_backend(
        &self,
        strategy: StrategyName,
        path: &Path,
    ) -> anyhow::Result<Box<dyn InferenceBackend>> {
        match strategy {
            #[cfg(any(feature = "ort-backend", feature = "torch-backend"))]
            StrategyName::YoloDetector => Ok(Box::new(crate::backend::yolo::YoloDetector::load(
                path, self.yolo,
            )?)),
            #[cfg(feature = "ort-backend")]
            StrategyName::OnnxSession => {
                Ok(Box::new(crate::backend::ort::OrtBackend::load(path)?))
            }
            #[cfg(feature = "torch-backend")]
            StrategyName::TorchScript => {
                Ok(Box::new(crate::backend::torch::TorchBackend::load(path)?))
            }
            #[cfg(feature = "torch-backend")]
            StrategyName::StateDict => Ok(Box::new(
                crate::backend::torch::StateDictBackend::load(path)?,
            )),
            #[cfg(feature = "tf-backend")]
            StrategyName::KerasGraph => {
                Ok(Box::new(crate::backend::keras::KerasBackend::load(path)?))
            }
            #[allow(unreachable_patterns)]
            other => anyhow::bail!("{other} runtime not compiled in"),
        }
    }
}

/// Cargo feature providing the runtime `strategy` needs for `path`.
fn required_feature(strategy: StrategyName, path: &Path) -> &'static str {
    match strategy {
        StrategyName::YoloDetector => match extension_of(path).as_deref() {
            Some("onnx") => "ort-backend",
            _ => "torch-backend",
        },
        StrategyName::OnnxSession => "ort-backend",
        StrategyName::TorchScript | StrategyName::StateDict => "torch-backend",
        StrategyName::KerasGraph => "tf-backend",
    }
}

fn feature_enabled(feature: &str) -> bool {
    match feature {
        "ort-backend" => cfg!(feature = "ort-backend"),
        "torch-backend" => cfg!(feature = "torch-backend"),
        "tf-backend" => cfg!(feature = "tf-backend"),
        _ => false,
    }
}
