use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NEW_CHAT_NAME: &str = "New chat";

/// A chat thread owned by a single user. Soft-deleted, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Display name of the owning user.
    pub use_name: String,
    pub persona_message: String,
    pub persona_message_title: String,
    /// Selected chat model; falls back to the registry default when unset.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Selected image-generation model for the create_img tool.
    #[serde(default)]
    pub image_model_id: Option<String>,
    /// Enabled dynamic tool-extension ids.
    #[serde(default)]
    pub extension: Vec<String>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl ChatThread {
    pub fn new(
        user_id: impl Into<String>,
        use_name: impl Into<String>,
        default_model_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: NEW_CHAT_NAME.to_string(),
            use_name: use_name.into(),
            persona_message: String::new(),
            persona_message_title: String::new(),
            model_id: default_model_id,
            image_model_id: None,
            extension: Vec::new(),
            bookmarked: false,
            is_deleted: false,
            created_at: now,
            last_message_at: now,
        }
    }
}
