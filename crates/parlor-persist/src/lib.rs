pub mod cache;
pub mod client;
pub mod error;
pub mod images;
pub mod models;
pub mod registry;
pub mod repositories;
pub mod secret;

pub use cache::{Clock, SystemClock, TtlCache};
pub use client::PersistClient;
pub use error::PersistError;
pub use images::ImageStore;
pub use models::{
    BlockedMeta, ChatDocument, ChatMessage, ChatThread, MessageRole, ModelConfig, PublicModel,
    DEFAULT_SORT_ORDER, NEW_CHAT_NAME,
};
pub use registry::{ModelConnection, ModelRegistry};
pub use repositories::{
    DocumentRepository, MessageRepository, ModelRepository, ThreadRepository,
};
pub use secret::{InsecureBase64Cipher, SecretCipher};
