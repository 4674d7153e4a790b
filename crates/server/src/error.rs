//! Error types

use core::fmt::{self, Display, Formatter};
use std::error::Error;
use std::io;

use axum::extract::multipart::MultipartError;
use axum::http::header::InvalidHeaderValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error as ThisError;
use tokio::task::JoinError;
use tracing::error;

use crate::archive::ArchiveError;
use crate::inspector::InspectError;

#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error("key inspection failed: {0}")]
    ExternalTool(#[from] InspectError),
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("invalid response header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("upload task failed: {0}")]
    Task(#[from] JoinError),
}

impl ServerError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Multipart(err) => err.status(),
            Self::ExternalTool(_)
            | Self::Io(_)
            | Self::Archive(_)
            | Self::Header(_)
            | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub(crate) status_code: StatusCode,
    pub(crate) message: String,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status_code, self.message)
    }
}

impl Error for ApiError {}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let status_code = err.status_code();

        if status_code.is_server_error() {
            error!(error=?err, "Request failed");
        }

        Self {
            status_code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, self.message).into_response()
    }
}
