use common::{Environment, env_opt, env_or, env_parse};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub environment: Environment,
    pub addr: String,
    pub api_url: String,
    pub api_timeout: Duration,
    /// TrueType font for box labels; system fonts are tried when unset.
    pub font_path: Option<PathBuf>,
}

impl FrontendConfig {
    pub fn from_env() -> Self {
        Self {
            environment: Environment::from_env(),
            addr: env_or("FRONTEND_ADDR", "0.0.0.0:8501"),
            api_url: env_or("API_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            api_timeout: Duration::from_secs(env_parse("API_TIMEOUT_SECS", 30)),
            font_path: env_opt("FONT_PATH").map(PathBuf::from),
        }
    }
}
