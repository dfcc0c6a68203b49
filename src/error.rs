use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Failed to parse GPX file: {0}")]
    Gpx(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] color_eyre::Report),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Upstream(value.to_string())
    }
}

impl From<gpx::errors::GpxError> for Error {
    fn from(value: gpx::errors::GpxError) -> Self {
        Error::Gpx(value.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
