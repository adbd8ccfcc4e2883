mod document;
mod message;
mod model_config;
mod thread;

pub use document::ChatDocument;
pub use message::{BlockedMeta, ChatMessage, MessageRole};
pub use model_config::{ModelConfig, PublicModel, DEFAULT_SORT_ORDER, PROVIDER_AZURE_OPENAI};
pub use thread::{ChatThread, NEW_CHAT_NAME};
