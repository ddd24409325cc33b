use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use postboard_db::queries::{self, TagFilter};
use postboard_types::api::{CreateTagsRequest, DataResponse, MsgResponse, TagQuery, split_list};

use crate::error::ApiError;
use crate::extract::{JsonBody, QueryParams};
use crate::state::AppState;
use crate::{parse_ids, run_blocking};

/// GET /tags?id=&name=&message=: `message` matches fragments of the titles
/// of tagged messages, case-insensitively.
pub async fn get_tags(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<TagQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TagFilter {
        ids: split_list(query.id.as_deref(), true).map(|ids| parse_ids(&ids)),
        names: split_list(query.name.as_deref(), true),
        message_titles: split_list(query.message.as_deref(), true),
    };

    let db = state.clone();
    let data = run_blocking(move || {
        db.db
            .tags(&filter)
            .map_err(|e| ApiError::from_db(e, "Error fetching tags"))
    })
    .await?;

    info!("Tags fetched successfully: {}", data.len());
    Ok(Json(DataResponse { data }))
}

/// POST /tags: find-or-create every name in the list.
pub async fn add_tags(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateTagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let names = req
        .tags
        .filter(|tags| !tags.is_empty())
        .ok_or_else(|| ApiError::Validation("A list of tags is required".into()))?;

    let db = state.clone();
    let resolved = run_blocking(move || {
        db.db
            .with_tx(|tx| queries::reconcile_tags(tx, &names))
            .map_err(|e| ApiError::from_db(e, "Error adding tags"))
    })
    .await?;

    let names: Vec<String> = resolved.into_iter().map(|t| t.name).collect();
    info!("Tags added successfully: {:?}", names);
    Ok((
        StatusCode::CREATED,
        Json(MsgResponse::new(format!(
            "Tags added successfully: {}",
            names.join(", ")
        ))),
    ))
}
