//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    body::StreamBody,
    extract::{DefaultBodyLimit, Multipart},
    http::header,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Extension, Json, Router,
};
use common::protocol::StatusMsg;
use futures::{future::ready, StreamExt};
use tokio_stream::wrappers::WatchStream;

use crate::{
    error::{ServerError, UploadError},
    session::AppSession,
    ui::{render_page, render_prediction_panel},
    utils::as_jpeg_stream_item,
};

/// Build the router serving the UI and its actions.
pub fn router(session: Arc<AppSession>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/status", get(status))
        .route("/prediction", get(prediction))
        .route("/upload", post(upload))
        .route("/upload/preview", get(upload_preview))
        .route("/webcam/start", post(start_webcam))
        .route("/webcam/stop", post(stop_webcam))
        .route("/webcam/stream", get(webcam_stream))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(Extension(session))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index(Extension(session): Extension<Arc<AppSession>>) -> Html<String> {
    Html(render_page(&session.snapshot().await))
}

/// Self-refreshing prediction panel embedded in the page while the webcam runs.
pub async fn prediction(Extension(session): Extension<Arc<AppSession>>) -> Html<String> {
    Html(render_prediction_panel(&session.snapshot().await))
}

pub async fn status(Extension(session): Extension<Arc<AppSession>>) -> Json<StatusMsg> {
    Json(session.snapshot().await)
}

/// Classify the image in the `file` field of a multipart form.
pub async fn upload(
    Extension(session): Extension<Arc<AppSession>>,
    mut multipart: Multipart,
) -> Result<Redirect, ServerError> {
    let mut image_data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::Multipart(err.to_string()))?
    {
        if field.name() != Some("file") {
            log::debug!("Ignoring form field {:?}", field.name());
            continue;
        }
        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") {
                return Err(UploadError::UnsupportedType(content_type.to_owned()).into());
            }
        }

        let data = field
            .bytes()
            .await
            .map_err(|err| UploadError::Multipart(err.to_string()))?;
        log::info!("Received upload of {} bytes", data.len());
        image_data = Some(data);
    }

    let data = image_data
        .filter(|data| !data.is_empty())
        .ok_or(UploadError::Missing)?;

    // Decoding and inference are CPU bound
    let prediction = tokio::task::spawn_blocking(move || session.classify_upload(&data))
        .await
        .map_err(|err| ServerError::Internal(err.to_string()))??;
    if let Some(prediction) = prediction {
        log::info!(
            "Upload classified as {} ({})",
            &prediction.label,
            prediction.confidence_text()
        );
    }

    Ok(Redirect::to("/"))
}

pub async fn upload_preview(
    Extension(session): Extension<Arc<AppSession>>,
) -> Result<impl IntoResponse, ServerError> {
    let jpeg = session.upload_preview().ok_or(ServerError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}

pub async fn start_webcam(
    Extension(session): Extension<Arc<AppSession>>,
) -> Result<Redirect, ServerError> {
    session.start_webcam().await?;
    Ok(Redirect::to("/"))
}

pub async fn stop_webcam(Extension(session): Extension<Arc<AppSession>>) -> Redirect {
    session.stop_webcam().await;
    Redirect::to("/")
}

/// Stream of sampled webcam frames. Ends when the webcam stops.
pub async fn webcam_stream(
    Extension(session): Extension<Arc<AppSession>>,
) -> Result<impl IntoResponse, ServerError> {
    // Subscribe first: a stop after this point is always seen as an empty surface
    let preview = session.subscribe_preview();
    if !session.is_webcam_active().await {
        return Err(ServerError::NotFound);
    }
    log::info!("Webcam stream requested");

    // An empty surface is either the gap before the first sample or a stopped webcam
    let stream = WatchStream::new(preview)
        .take_while(move |frame| {
            let session = Arc::clone(&session);
            let has_frame = frame.is_some();
            async move { has_frame || session.is_webcam_active().await }
        })
        .filter_map(ready)
        .map(|jpeg| Ok::<_, std::io::Error>(as_jpeg_stream_item(&jpeg)));

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    Ok((headers, body))
}
