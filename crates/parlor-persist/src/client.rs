use std::sync::Arc;

use mongodb::Client;

use crate::cache::SystemClock;
use crate::error::{PersistError, Result};
use crate::images::ImageStore;
use crate::registry::ModelRegistry;
use crate::repositories::{DocumentRepository, MessageRepository, ModelRepository, ThreadRepository};
use crate::secret::SecretCipher;

/// Aggregate handle over the database-backed collaborators.
pub struct PersistClient {
    thread_repo: ThreadRepository,
    message_repo: MessageRepository,
    document_repo: DocumentRepository,
    model_registry: ModelRegistry,
    image_store: ImageStore,
}

impl PersistClient {
    pub async fn new(
        mongodb_uri: &str,
        db_name: &str,
        cipher: Arc<dyn SecretCipher>,
    ) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Internal(format!("mongodb connection failed: {e}")))?;

        let thread_repo = ThreadRepository::new(&client, db_name);
        let message_repo = MessageRepository::new(&client, db_name);
        let document_repo = DocumentRepository::new(&client, db_name);
        let model_registry = ModelRegistry::new(
            ModelRepository::new(&client, db_name),
            cipher,
            Arc::new(SystemClock),
        );
        let image_store = ImageStore::new(&client.database(db_name));

        Ok(Self {
            thread_repo,
            message_repo,
            document_repo,
            model_registry,
            image_store,
        })
    }

    pub fn threads(&self) -> &ThreadRepository {
        &self.thread_repo
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.message_repo
    }

    pub fn documents(&self) -> &DocumentRepository {
        &self.document_repo
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.model_registry
    }

    pub fn images(&self) -> &ImageStore {
        &self.image_store
    }

    /// Soft-delete a thread and everything hanging off it. Each step is a
    /// bulk update and is awaited, so the cascade is durable before this
    /// returns; the thread flag flips last so a half-deleted thread is
    /// never observable as live.
    pub async fn soft_delete_thread(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let thread = self
            .thread_repo
            .get_thread(thread_id, user_id)
            .await?
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;

        let messages = self.message_repo.soft_delete_for_thread(&thread.id).await?;
        let documents = self
            .document_repo
            .soft_delete_for_thread(&thread.id)
            .await?;
        self.thread_repo.mark_deleted(&thread.id).await?;

        tracing::info!(
            thread_id = %thread.id,
            messages,
            documents,
            "soft-deleted thread"
        );

        Ok(())
    }
}
