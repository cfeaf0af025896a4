//! A note is the content item that review tracking points at. Its body is an opaque
//! rich-text document kept as JSON.
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: serde_json::Value,
    pub source: Option<String>,
    pub created_at: DateTime<Local>,
}

/// The note fields shown next to a review in listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub content: serde_json::Value,
    pub source: Option<String>,
}

impl From<&Note> for NoteSummary {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            source: note.source.clone(),
        }
    }
}
