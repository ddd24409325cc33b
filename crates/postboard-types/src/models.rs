use serde::{Deserialize, Serialize};

/// A message as returned by the API, with its tags flattened to names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub transcript: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}
