use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use postboard_db::queries;
use postboard_types::api::{LinkMessageTagsRequest, LinkMessageTagsResponse};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::run_blocking;
use crate::state::AppState;

/// POST /message_tags: attach every listed tag to every listed message.
/// `count` is the number of links that did not exist before.
pub async fn add_message_tags(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LinkMessageTagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_ids = req.message_ids.filter(|ids| !ids.is_empty()).ok_or_else(|| {
        ApiError::Validation("message_ids is required and cannot be empty".into())
    })?;
    let tag_ids = req
        .tag_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::Validation("tag_ids is required and cannot be empty".into()))?;

    let db = state.clone();
    let count = run_blocking(move || {
        db.db
            .with_tx(|tx| queries::link_messages_tags(tx, &message_ids, &tag_ids))
            .map_err(|e| ApiError::from_db(e, "Error assigning message tags"))
    })
    .await?;

    info!("Message Tags assigned successfully: {}", count);
    Ok((
        StatusCode::CREATED,
        Json(LinkMessageTagsResponse {
            msg: format!("Message Tags assigned successfully: {}", count),
            count,
        }),
    ))
}
