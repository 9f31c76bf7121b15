//! Error kinds of the classification service.
//!
//! Each kind is caught where it happens and turned into a user-facing notice, none of them
//! takes the server down.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure to bring the model into a runnable state. Fatal for the session.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {0}")]
    NotFound(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("I/O error while loading model: {0}")]
    Io(#[from] std::io::Error),

    #[error("model format not supported by the runtime: {0}")]
    Format(String),

    #[error("invalid label set: {0}")]
    Labels(String),
}

impl From<reqwest::Error> for ModelLoadError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown>".into());
        ModelLoadError::Fetch {
            url,
            reason: err.to_string(),
        }
    }
}

/// Camera could not be opened or read.
#[derive(Debug, Error)]
pub enum CameraAccessError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("failed to capture frame: {0}")]
    Capture(String),
}

/// Unexpected failure during a forward pass.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("forward pass failed: {0}")]
    Forward(#[from] anyhow::Error),

    #[error("model produced an empty output")]
    EmptyOutput,

    #[error("model produced {outputs} scores for {labels} labels")]
    LabelMismatch { labels: usize, outputs: usize },
}

/// Failure to accept an uploaded image.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not read upload: {0}")]
    Multipart(String),

    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("no image file in upload")]
    Missing,

    #[error("could not encode preview: {0}")]
    Encode(String),
}

/// Errors surfacing at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Camera(#[from] CameraAccessError),

    #[error("nothing to show")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Upload(UploadError::UnsupportedType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServerError::Upload(UploadError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Upload(_) => StatusCode::BAD_REQUEST,
            ServerError::Camera(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        log::debug!("Responding with {status}: {self}");
        (status, self.to_string()).into_response()
    }
}
