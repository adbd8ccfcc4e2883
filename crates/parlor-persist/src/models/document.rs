use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row for a document uploaded to a thread. The extracted chunks
/// live in the external search index; this record drives the hybrid-mode
/// decision and the soft-delete cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatDocument {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            is_deleted: false,
            created_at: Utc::now(),
        }
    }
}
