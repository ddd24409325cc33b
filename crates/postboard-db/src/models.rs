//! Database row types. These map directly to SQLite rows and stay distinct
//! from the postboard-types API models.

use postboard_types::models::{Message, Tag};

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub transcript: Option<String>,
}

impl MessageRow {
    pub fn into_message(self, tags: Vec<String>) -> Message {
        Message {
            id: self.id,
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail,
            video: self.video,
            transcript: self.transcript,
            tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            name: row.name,
        }
    }
}

/// Everything but the title: the columns an update overwrites wholesale.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFields<'a> {
    pub description: &'a str,
    pub thumbnail: Option<&'a str>,
    pub video: Option<&'a str>,
    pub transcript: Option<&'a str>,
}
