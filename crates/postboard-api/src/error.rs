use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use postboard_db::DbError;
use postboard_types::api::MsgResponse;
use thiserror::Error;
use tracing::{error, warn};

use crate::assets::AssetError;

/// Every handler failure. Rendered as `{ "msg": ... }` with the matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Duplicate title.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// A thumbnail or video URL was unreachable or rejected.
    #[error("{0}")]
    ExternalFetch(String),

    /// Unexpected failure. `msg` goes to the client, `source` only to the log.
    #[error("{msg}")]
    Internal {
        msg: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn internal(msg: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            msg: msg.into(),
            source: source.into(),
        }
    }

    /// Conflicts and lookups keep their text; anything else becomes a 500
    /// carrying `context` as the client message.
    pub fn from_db(err: DbError, context: &str) -> Self {
        match err {
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            DbError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::internal(context, other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::ExternalFetch(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        ApiError::ExternalFetch(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal { msg, source } => {
                error!(error = %format!("{source:#}"), "{}", msg);
            }
            other => warn!(status = status.as_u16(), "{}", other),
        }
        (status, Json(MsgResponse::new(self.to_string()))).into_response()
    }
}
