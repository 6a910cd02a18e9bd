//! HTTP service for cotton weed detection.
//!
//! Accepts image uploads, runs them through the loaded model and keeps every
//! result in the prediction store.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::{PredictionResponse, router};
pub use state::{AppState, ModelInfo};
