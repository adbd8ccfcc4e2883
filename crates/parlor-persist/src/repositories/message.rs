use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};

use crate::error::Result;
use crate::models::ChatMessage;

#[derive(Clone)]
pub struct MessageRepository {
    collection: Collection<ChatMessage>,
}

impl MessageRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("messages");
        Self { collection }
    }

    /// Save a single message
    pub async fn create_message(&self, message: ChatMessage) -> Result<String> {
        self.collection.insert_one(&message).await?;
        Ok(message.id)
    }

    /// Get all live messages for a thread in chronological order
    pub async fn list_for_thread(&self, thread_id: &str, user_id: &str) -> Result<Vec<ChatMessage>> {
        let filter = doc! { "thread_id": thread_id, "user_id": user_id, "is_deleted": false };
        let messages = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    /// Most-recent `limit` live messages, returned in chronological order
    pub async fn find_top_for_thread(
        &self,
        thread_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let filter = doc! { "thread_id": thread_id, "user_id": user_id, "is_deleted": false };
        let mut messages: Vec<ChatMessage> = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        messages.reverse();
        Ok(messages)
    }

    /// Soft-delete every message in a thread in one bulk update, awaited so
    /// the delete is durable before the caller proceeds.
    pub async fn soft_delete_for_thread(&self, thread_id: &str) -> Result<u64> {
        let filter = doc! { "thread_id": thread_id, "is_deleted": false };
        let update = doc! { "$set": { "is_deleted": true } };
        let result = self.collection.update_many(filter, update).await?;
        Ok(result.modified_count)
    }

    pub async fn count_for_thread(&self, thread_id: &str) -> Result<u64> {
        let filter = doc! { "thread_id": thread_id, "is_deleted": false };
        Ok(self.collection.count_documents(filter).await?)
    }
}
