use axum::http::StatusCode;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum DiaryError {
    /// User input that can be fixed by asking again.
    #[error("{0}")]
    Validation(String),
    #[error("entry not found")]
    NotFound,
    #[error("unknown timezone code: {0}")]
    InvalidTimezone(String),
    /// Vision collaborator failed, timed out or returned nothing.
    #[error("photo could not be analyzed")]
    AnalysisFailure,
    #[error("storage failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl DiaryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidTimezone(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AnalysisFailure => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handler-side mapping. Storage details never leak into the response body.
pub fn reject(e: DiaryError) -> (StatusCode, String) {
    let status = e.status();
    match e {
        DiaryError::Persistence(inner) => {
            error!(error = %inner, "storage failure");
            (status, "Internal error".into())
        }
        other => (status, other.to_string()),
    }
}
