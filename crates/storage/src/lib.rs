//! Persistence for prediction results.
//!
//! One table, append only: every successful prediction becomes a row that is
//! never updated or deleted. Concurrency is left to SQLite's own locking.

pub mod errors;
pub mod models;
pub mod store;

pub use errors::StoreError;
pub use models::{DEVICE_API, DEVICE_UNKNOWN, NewPrediction, StoredPrediction};
pub use store::PredictionStore;
