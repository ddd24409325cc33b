use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use postboard_db::models::MessageFields;
use postboard_db::queries::{self, MessageFilter};
use postboard_types::api::{
    CreateMessageRequest, DataResponse, MessageQuery, MsgResponse, UpdateMessageQuery,
    UpdateMessageRequest, split_list,
};

use crate::assets::AssetKind;
use crate::error::ApiError;
use crate::extract::{JsonBody, QueryParams};
use crate::state::AppState;
use crate::transcribe::{TRANSCRIPT_UNAVAILABLE, transcribe_or_placeholder};
use crate::{parse_ids, run_blocking};

/// GET /messages?id=&title=&tag=: every parameter is a comma-separated list.
pub async fn get_messages(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MessageFilter {
        ids: split_list(query.id.as_deref(), true).map(|ids| parse_ids(&ids)),
        titles: split_list(query.title.as_deref(), false),
        tags: split_list(query.tag.as_deref(), true),
    };

    let db = state.clone();
    let data = run_blocking(move || {
        db.db
            .messages(&filter)
            .map_err(|e| ApiError::from_db(e, "Error fetching messages"))
    })
    .await?;

    info!("Messages fetched successfully: {}", data.len());
    Ok(Json(DataResponse { data }))
}

/// POST /messages
pub async fn add_message(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = required(req.title, "Title is required")?;
    let description = required(req.description, "Description is required")?;

    // Checked before any remote fetch. The unique index still rejects a
    // concurrent insert.
    let db = state.clone();
    let t = title.clone();
    let exists = run_blocking(move || {
        db.db
            .message_title_exists(&t)
            .map_err(|e| ApiError::from_db(e, "Error adding message"))
    })
    .await?;
    if exists {
        return Err(ApiError::Conflict(
            "A message with this title already exists".into(),
        ));
    }

    let thumbnail = validate_asset(&state, req.thumbnail, AssetKind::Thumbnail).await?;
    let video = validate_asset(&state, req.video, AssetKind::Video).await?;
    let transcript = match &video {
        Some(url) if req.gen_transcript => {
            Some(transcribe_or_placeholder(state.transcriber.as_ref(), url).await)
        }
        _ => None,
    };
    let tags = req.tags.unwrap_or_default();

    let db = state.clone();
    let t = title.clone();
    run_blocking(move || {
        db.db
            .with_tx(|tx| {
                let fields = MessageFields {
                    description: &description,
                    thumbnail: thumbnail.as_deref(),
                    video: video.as_deref(),
                    transcript: transcript.as_deref(),
                };
                let id = queries::insert_message(tx, &t, &fields)?;
                let resolved = queries::reconcile_tags(tx, &tags)?;
                queries::set_message_tags(tx, id, &resolved)
            })
            .map_err(|e| ApiError::from_db(e, "Error adding message"))
    })
    .await?;

    info!("Message added successfully: {}", title);
    Ok((
        StatusCode::CREATED,
        Json(MsgResponse::new(format!(
            "Message added successfully: {}",
            title
        ))),
    ))
}

/// PUT /messages?id=: full replace of everything but the title.
pub async fn update_message(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UpdateMessageQuery>,
    JsonBody(req): JsonBody<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let raw_id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Id is required".into()))?;
    let description = required(req.description, "Description is required")?;
    let id: i64 = raw_id
        .trim()
        .parse()
        .map_err(|_| ApiError::NotFound("Message not found".into()))?;

    let db = state.clone();
    let current = run_blocking(move || {
        db.db
            .get_message(id)
            .map_err(|e| ApiError::from_db(e, "Error updating message"))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;

    // An unchanged URL is not fetched again.
    let thumbnail = match non_empty(req.thumbnail) {
        None => None,
        Some(url) if current.thumbnail.as_deref() == Some(url.as_str()) => Some(url),
        Some(url) => state.assets.validate(&url, AssetKind::Thumbnail).await?,
    };

    let (video, transcript) = match non_empty(req.video) {
        None => (None, None),
        Some(url) if current.video.as_deref() == Some(url.as_str()) => {
            let missing = current
                .transcript
                .as_deref()
                .is_none_or(|t| t == TRANSCRIPT_UNAVAILABLE);
            let transcript = if req.gen_transcript && missing {
                Some(transcribe_or_placeholder(state.transcriber.as_ref(), &url).await)
            } else {
                current.transcript.clone()
            };
            (Some(url), transcript)
        }
        Some(url) => match state.assets.validate(&url, AssetKind::Video).await? {
            Some(valid) => {
                let transcript = if req.gen_transcript {
                    Some(transcribe_or_placeholder(state.transcriber.as_ref(), &valid).await)
                } else {
                    None
                };
                (Some(valid), transcript)
            }
            None => (None, None),
        },
    };
    let tags = req.tags.unwrap_or_default();

    let db = state.clone();
    run_blocking(move || {
        db.db
            .with_tx(|tx| {
                let fields = MessageFields {
                    description: &description,
                    thumbnail: thumbnail.as_deref(),
                    video: video.as_deref(),
                    transcript: transcript.as_deref(),
                };
                queries::update_message(tx, id, &fields)?;
                let resolved = queries::reconcile_tags(tx, &tags)?;
                queries::set_message_tags(tx, id, &resolved)
            })
            .map_err(|e| ApiError::from_db(e, "Error updating message"))
    })
    .await?;

    info!("Message updated successfully: {}", current.title);
    Ok(Json(MsgResponse::new(format!(
        "Message updated successfully: {}",
        current.title
    ))))
}

fn required(value: Option<String>, msg: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::Validation(msg.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn validate_asset(
    state: &AppState,
    url: Option<String>,
    kind: AssetKind,
) -> Result<Option<String>, ApiError> {
    match non_empty(url) {
        Some(url) => Ok(state.assets.validate(&url, kind).await?),
        None => Ok(None),
    }
}
