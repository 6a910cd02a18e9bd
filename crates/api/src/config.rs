use common::{Environment, env_list, env_opt, env_or, env_parse};
use inference::{PredictorConfig, SearchPaths, YoloConfig, loader::DEFAULT_MODEL_DIRS};
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    pub addr: String,
    pub db_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub model_dirs: Vec<PathBuf>,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub yolo_confidence: f32,
    pub yolo_iou: f32,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub otel_endpoint: Option<String>,
}

impl ApiConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            environment: Environment::from_env(),
            addr: env_or("API_ADDR", "0.0.0.0:8000"),
            db_path: env_or("DB_PATH", "predictions.db").into(),
            model_path: env_opt("MODEL_PATH").map(PathBuf::from),
            model_dirs: env_list("MODEL_DIRS", &DEFAULT_MODEL_DIRS)
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            input_size: (env_parse("INPUT_WIDTH", 640), env_parse("INPUT_HEIGHT", 640)),
            confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", 0.5),
            yolo_confidence: env_parse("YOLO_CONFIDENCE", 0.25),
            yolo_iou: env_parse("YOLO_IOU", 0.7),
            uploads_dir: env_or("UPLOADS_DIR", "uploads").into(),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            otel_endpoint: env_opt("OTEL_ENDPOINT"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            anyhow::bail!("INPUT_WIDTH and INPUT_HEIGHT must be positive");
        }
        for (name, value) in [
            ("CONFIDENCE_THRESHOLD", self.confidence_threshold),
            ("YOLO_CONFIDENCE", self.yolo_confidence),
            ("YOLO_IOU", self.yolo_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }
        Ok(())
    }

    pub fn predictor_config(&self) -> PredictorConfig {
        PredictorConfig {
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
        }
    }

    pub fn yolo_config(&self) -> YoloConfig {
        YoloConfig {
            input_size: self.input_size,
            confidence_threshold: self.yolo_confidence,
            iou_threshold: self.yolo_iou,
        }
    }

    pub fn search_paths(&self) -> SearchPaths {
        SearchPaths::with_dirs(self.model_dirs.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 8] = [
        "API_ADDR",
        "DB_PATH",
        "MODEL_PATH",
        "MODEL_DIRS",
        "INPUT_WIDTH",
        "CONFIDENCE_THRESHOLD",
        "YOLO_CONFIDENCE",
        "MAX_UPLOAD_BYTES",
    ];

    fn clear() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::from_env().unwrap();

        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(config.db_path, PathBuf::from("predictions.db"));
        assert!(config.model_path.is_none());
        assert_eq!(
            config.model_dirs,
            vec![PathBuf::from("models"), PathBuf::from("../models")]
        );
        assert_eq!(config.input_size, (640, 640));
        assert_eq!(config.predictor_config().confidence_threshold, 0.5);
        assert_eq!(config.yolo_config().confidence_threshold, 0.25);
        assert_eq!(config.yolo_config().iou_threshold, 0.7);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        unsafe {
            env::set_var("MODEL_PATH", "/srv/models/weeds.onnx");
            env::set_var("MODEL_DIRS", "/srv/a, /srv/b");
            env::set_var("CONFIDENCE_THRESHOLD", "0.35");
        }

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(
            config.model_path.as_deref(),
            Some(std::path::Path::new("/srv/models/weeds.onnx"))
        );
        assert_eq!(config.search_paths().dirs.len(), 2);
        assert_eq!(config.confidence_threshold, 0.35);

        clear();
    }

    #[test]
    #[serial]
    fn test_out_of_range_threshold_is_rejected() {
        clear();
        unsafe { env::set_var("YOLO_CONFIDENCE", "1.5") };

        let err = ApiConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("YOLO_CONFIDENCE"));

        clear();
    }

    #[test]
    #[serial]
    fn test_blank_model_path_counts_as_unset() {
        clear();
        unsafe { env::set_var("MODEL_PATH", "  ") };
        assert!(ApiConfig::from_env().unwrap().model_path.is_none());
        clear();
    }
}
