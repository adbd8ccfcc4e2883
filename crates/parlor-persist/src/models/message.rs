use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat turn. Created exactly once per event of interest and
/// never mutated afterwards except for soft-delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    /// Author display name, or the function name for function turns.
    pub name: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub multi_modal_image: Option<String>,
    /// Model that generated this message, captured at generation time.
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    /// Structured metadata for safety-blocked turns.
    #[serde(default)]
    pub blocked_meta: Option<BlockedMeta>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            role,
            content: content.into(),
            multi_modal_image: None,
            model_id: None,
            model_name: None,
            blocked_meta: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Deprecated on the provider side; kept for stored transcripts and
    /// tool bookkeeping rows.
    Function,
    Tool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockedMeta {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub blocked_categories: Vec<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
