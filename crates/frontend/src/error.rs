use crate::client::ClientError;
use crate::page::render_error;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("Please choose an image to upload")]
    MissingFile,

    #[error("Upload failed: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Could not read the image: {0}")]
    Decode(#[source] image::ImageError),

    #[error(transparent)]
    Api(#[from] ClientError),

    #[error("Could not render the annotated image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Annotation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl FrontendError {
    pub fn status(&self) -> StatusCode {
        match self {
            FrontendError::MissingFile | FrontendError::Multipart(_) | FrontendError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            FrontendError::Api(_) => StatusCode::BAD_GATEWAY,
            FrontendError::Encode(_) | FrontendError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FrontendError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Detection failed");
        } else {
            tracing::info!(error = %self, %status, "Detection rejected");
        }
        (status, Html(render_error(&self.to_string()))).into_response()
    }
}
