use crate::client::ApiClient;
use crate::draw::Annotator;
use crate::error::FrontendError;
use crate::page::{render_index, render_result};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    response::Html,
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use inference::DetectionResult;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const JPEG_QUALITY: u8 = 90;

#[derive(Clone)]
pub struct FrontendState {
    pub client: Arc<ApiClient>,
    pub annotator: Arc<Annotator>,
}

impl FrontendState {
    pub fn new(client: ApiClient, annotator: Annotator) -> Self {
        Self {
            client: Arc::new(client),
            annotator: Arc::new(annotator),
        }
    }
}

pub fn router(state: FrontendState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/detect", post(detect))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(render_index())
}

async fn detect(
    State(state): State<FrontendState>,
    mut multipart: Multipart,
) -> Result<Html<String>, FrontendError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = upload
        .filter(|b| !b.is_empty())
        .ok_or(FrontendError::MissingFile)?;

    // Decode first so a bad file never reaches the API
    let image = image::load_from_memory(&bytes)
        .map_err(FrontendError::Decode)?
        .to_rgb8();

    let result = state.client.predict(bytes.to_vec()).await?;
    tracing::info!(detections = result.len(), "Prediction received");

    let annotator = state.annotator.clone();
    let (jpeg_base64, result) = tokio::task::spawn_blocking(move || {
        let encoded = annotate_to_base64(&annotator, image, &result)?;
        Ok::<_, FrontendError>((encoded, result))
    })
    .await??;

    Ok(Html(render_result(&jpeg_base64, &result)))
}

fn annotate_to_base64(
    annotator: &Annotator,
    mut image: image::RgbImage,
    result: &DetectionResult,
) -> Result<String, FrontendError> {
    annotator.annotate(&mut image, result);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(FrontendError::Encode)?;
    Ok(STANDARD.encode(jpeg))
}
