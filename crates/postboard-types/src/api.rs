use serde::{Deserialize, Serialize};

// -- Envelopes --

/// `{ "data": [...] }` wrapper used by every list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: Vec<T>,
}

/// `{ "msg": "..." }` body used for both successful writes and errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct MsgResponse {
    pub msg: String,
}

impl MsgResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

// -- Messages --

/// Body of `POST /messages`.
///
/// Required fields are `Option` so that a missing title produces our own
/// 400 message rather than a deserializer error.
#[derive(Debug, Default, Deserialize)]
pub struct CreateMessageRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub gen_transcript: bool,
}

/// Body of `PUT /messages?id=`. Full replace: absent optional fields clear
/// the stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMessageRequest {
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub gen_transcript: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub id: Option<String>,
    pub title: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMessageQuery {
    pub id: Option<String>,
}

// -- Tags --

#[derive(Debug, Default, Deserialize)]
pub struct CreateTagsRequest {
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagQuery {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Comma-separated fragments of message titles.
    pub message: Option<String>,
}

// -- Message tags --

#[derive(Debug, Default, Deserialize)]
pub struct LinkMessageTagsRequest {
    pub message_ids: Option<Vec<i64>>,
    pub tag_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkMessageTagsResponse {
    pub msg: String,
    pub count: usize,
}

// -- Index --

/// One entry of the route listing served at `/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInfo {
    pub endpoint: String,
    pub methods: Vec<String>,
    pub url: String,
}

/// Splits a comma-separated query value. `None` and the empty string both
/// mean "no filter".
pub fn split_list(raw: Option<&str>, trim: bool) -> Option<Vec<String>> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.split(',')
            .map(|s| if trim { s.trim() } else { s })
            .map(str::to_string)
            .collect(),
    )
}
