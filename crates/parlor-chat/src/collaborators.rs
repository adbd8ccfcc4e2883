use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use parlor_llm::{AzureOpenAIClient, ChatClient, Tool};
use parlor_persist::{
    BlockedMeta, ChatMessage, DocumentRepository, ImageStore, MessageRepository, MessageRole,
    ModelConnection, ModelRegistry, PersistClient,
};

/// A message about to be persisted, before ids and timestamps are stamped.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub thread_id: String,
    pub user_id: String,
    pub name: String,
    pub role: MessageRole,
    pub content: String,
    pub multi_modal_image: Option<String>,
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    pub blocked_meta: Option<BlockedMeta>,
}

impl NewMessage {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            role,
            content: content.into(),
            multi_modal_image: None,
            model_id: None,
            model_name: None,
            blocked_meta: None,
        }
    }

    pub fn with_multimodal_image(mut self, image: Option<String>) -> Self {
        self.multi_modal_image = image;
        self
    }

    pub fn with_model(mut self, model_id: Option<String>, model_name: Option<String>) -> Self {
        self.model_id = model_id;
        self.model_name = model_name;
        self
    }

    pub fn with_blocked_meta(mut self, meta: BlockedMeta) -> Self {
        self.blocked_meta = Some(meta);
        self
    }
}

/// Durable message store. Must be awaited before the triggering SSE event
/// is considered delivered.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> Result<()>;
}

#[async_trait]
impl MessageSink for PersistClient {
    async fn create_message(&self, message: NewMessage) -> Result<()> {
        let thread_id = message.thread_id.clone();

        let mut row = ChatMessage::new(
            message.thread_id,
            message.user_id,
            message.name,
            message.role,
            message.content,
        );
        row.multi_modal_image = message.multi_modal_image;
        row.model_id = message.model_id;
        row.model_name = message.model_name;
        row.blocked_meta = message.blocked_meta;

        self.messages().create_message(row).await?;

        // Bump the thread's last-message timestamp; message creation must
        // not fail just because the bump did
        if let Err(e) = self.threads().touch(&thread_id).await {
            tracing::warn!("failed to update chat thread timestamp: {}", e);
        }

        Ok(())
    }
}

/// Recent-message reads for context assembly.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn recent_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>>;
}

#[async_trait]
impl HistoryStore for MessageRepository {
    async fn recent_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        Ok(self.find_top_for_thread(thread_id, user_id, limit).await?)
    }
}

/// Document metadata reads driving the hybrid-mode decision.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count_for_thread(&self, thread_id: &str) -> Result<u64>;
}

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn count_for_thread(&self, thread_id: &str) -> Result<u64> {
        Ok(DocumentRepository::count_for_thread(self, thread_id).await?)
    }
}

/// Model registry lookups needed by the turn pipeline.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Connection parameters for a model id, or the default model.
    async fn resolve(&self, model_id: Option<&str>) -> Result<ModelConnection>;

    /// Display name for persisted messages; failures degrade to None.
    async fn friendly_name(&self, model_id: Option<&str>) -> Option<String>;
}

#[async_trait]
impl ModelResolver for ModelRegistry {
    async fn resolve(&self, model_id: Option<&str>) -> Result<ModelConnection> {
        Ok(ModelRegistry::resolve(self, model_id).await?)
    }

    async fn friendly_name(&self, model_id: Option<&str>) -> Option<String> {
        ModelRegistry::friendly_name(self, model_id).await
    }
}

#[async_trait]
impl ModelResolver for PersistClient {
    async fn resolve(&self, model_id: Option<&str>) -> Result<ModelConnection> {
        Ok(self.models().resolve(model_id).await?)
    }

    async fn friendly_name(&self, model_id: Option<&str>) -> Option<String> {
        self.models().friendly_name(model_id).await
    }
}

/// One scored excerpt returned by the similarity-search collaborator.
#[derive(Debug, Clone)]
pub struct DocumentExcerpt {
    pub id: String,
    pub name: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchScope {
    pub user_id: String,
    pub thread_id: String,
}

/// External document similarity search, scoped per user and thread.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        scope: &SearchScope,
        model_id: Option<&str>,
    ) -> Result<Vec<DocumentExcerpt>>;
}

/// Used when no search service is configured; hybrid turns then run with
/// an empty document block.
#[derive(Debug, Default)]
pub struct NullSearch;

#[async_trait]
impl SimilaritySearch for NullSearch {
    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        scope: &SearchScope,
        _model_id: Option<&str>,
    ) -> Result<Vec<DocumentExcerpt>> {
        tracing::debug!(thread_id = %scope.thread_id, "similarity search not configured");
        Ok(Vec::new())
    }
}

/// External provider of dynamically configured per-thread tool extensions.
#[async_trait]
pub trait ExtensionProvider: Send + Sync {
    async fn tools_for(&self, extension_ids: &[String]) -> Result<Vec<Tool>>;
}

#[derive(Debug, Default)]
pub struct NullExtensions;

#[async_trait]
impl ExtensionProvider for NullExtensions {
    async fn tools_for(&self, _extension_ids: &[String]) -> Result<Vec<Tool>> {
        Ok(Vec::new())
    }
}

/// Blob store for generated images, namespaced per thread.
#[async_trait]
pub trait ImageBlobStore: Send + Sync {
    async fn upload(&self, thread_id: &str, filename: &str, bytes: &[u8]) -> Result<()>;
    fn url_for(&self, thread_id: &str, filename: &str) -> String;
}

#[async_trait]
impl ImageBlobStore for ImageStore {
    async fn upload(&self, thread_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        ImageStore::upload(self, thread_id, filename, bytes).await?;
        Ok(())
    }

    fn url_for(&self, thread_id: &str, filename: &str) -> String {
        ImageStore::url_for(self, thread_id, filename)
    }
}

/// Creates a chat client for a resolved model connection.
pub trait ChatClientFactory: Send + Sync {
    fn client_for(&self, connection: &ModelConnection) -> Result<Arc<dyn ChatClient>>;
}

#[derive(Debug, Default)]
pub struct AzureClientFactory;

impl ChatClientFactory for AzureClientFactory {
    fn client_for(&self, connection: &ModelConnection) -> Result<Arc<dyn ChatClient>> {
        let client = AzureOpenAIClient::builder()
            .api_key(&connection.api_key)
            .endpoint(&connection.endpoint)
            .api_version(&connection.api_version)
            .build()?;
        Ok(Arc::new(client))
    }
}
