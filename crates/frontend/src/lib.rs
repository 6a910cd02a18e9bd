//! Browser front end: upload page, call to the prediction API and
//! server-side annotation of the returned boxes.

pub mod client;
pub mod config;
pub mod draw;
pub mod error;
pub mod page;
pub mod routes;

pub use client::{ApiClient, ClientError};
pub use config::FrontendConfig;
pub use draw::Annotator;
pub use error::FrontendError;
pub use routes::{FrontendState, router};
