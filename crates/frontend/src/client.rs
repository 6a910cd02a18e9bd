//! Client for the prediction API.

use anyhow::Context;
use inference::DetectionResult;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use std::time::Duration;
use thiserror::Error;

/// Uploads are always labelled as JPEG, whatever their actual encoding.
const UPLOAD_NAME: &str = "image.jpg";
const UPLOAD_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API Error: {}", .0.as_u16())]
    Status(StatusCode),

    #[error("Error calling API: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    predict_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    /// Sends one image to `/predict`. Not retried.
    pub async fn predict(&self, image: Vec<u8>) -> Result<DetectionResult, ClientError> {
        let part = Part::bytes(image)
            .file_name(UPLOAD_NAME)
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Prediction API returned an error");
            return Err(ClientError::Status(status));
        }

        Ok(response.json::<DetectionResult>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Multipart, http::StatusCode as AxumStatus, routing::post};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn echo_upload(mut multipart: Multipart) -> Json<Value> {
        let field = multipart.next_field().await.unwrap().unwrap();
        assert_eq!(field.name(), Some("file"));
        assert_eq!(field.file_name(), Some("image.jpg"));
        assert_eq!(field.content_type(), Some("image/jpeg"));
        let len = field.bytes().await.unwrap().len();

        Json(json!({
            "boxes": [[1.0, 2.0, 3.0, 4.0]],
            "classes": [format!("bytes_{len}")],
            "confidences": [0.97],
            "num_detections": 1,
        }))
    }

    #[tokio::test]
    async fn test_predict_parses_response() {
        let base = serve(Router::new().route("/predict", post(echo_upload))).await;
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let result = client.predict(vec![0u8; 12]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.classes(), ["bytes_12"]);
        assert_eq!(result.boxes(), [[1.0, 2.0, 3.0, 4.0]]);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/predict",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "nope") }),
        );
        let base = serve(app).await;
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let err = client.predict(vec![1, 2, 3]).await.unwrap_err();
        assert_eq!(err.to_string(), "API Error: 500");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.predict(vec![1]).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().starts_with("Error calling API: "));
    }
}
