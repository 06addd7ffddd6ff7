use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use retouch::models::ErrorBody;

use crate::dispatch::DispatchError;
use crate::storage::StorageError;

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0:#}")]
    Internal(#[from] anyhow::Error),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
}

impl From<StorageError> for WebError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName(_) | StorageError::NotFound(_) => WebError::NotFound,
            StorageError::Io(err) => WebError::Internal(err),
        }
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Dispatch(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            WebError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Multipart(err) => err.status(),
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            WebError::Dispatch(DispatchError::ProcessingFailed(details)) => ErrorBody {
                error: "Image processing failed".into(),
                details: Some(details.clone()),
            },
            WebError::Dispatch(DispatchError::Generation(err)) => ErrorBody {
                error: "Image generation failed".into(),
                details: Some(format!("{err:#}")),
            },
            WebError::Internal(err) => ErrorBody {
                error: "Internal Server Error".into(),
                details: Some(format!("{err:#}")),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        (status, Json(self.body())).into_response()
    }
}
