use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};

use crate::error::Result;
use crate::models::ChatDocument;

#[derive(Clone)]
pub struct DocumentRepository {
    collection: Collection<ChatDocument>,
}

impl DocumentRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("documents");
        Self { collection }
    }

    pub async fn create_document(&self, document: ChatDocument) -> Result<String> {
        self.collection.insert_one(&document).await?;
        Ok(document.id)
    }

    /// Live document records for a thread
    pub async fn list_for_thread(&self, thread_id: &str) -> Result<Vec<ChatDocument>> {
        let filter = doc! { "thread_id": thread_id, "is_deleted": false };
        let documents = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(documents)
    }

    pub async fn count_for_thread(&self, thread_id: &str) -> Result<u64> {
        let filter = doc! { "thread_id": thread_id, "is_deleted": false };
        Ok(self.collection.count_documents(filter).await?)
    }

    /// Bulk soft-delete, awaited for durability (see MessageRepository).
    pub async fn soft_delete_for_thread(&self, thread_id: &str) -> Result<u64> {
        let filter = doc! { "thread_id": thread_id, "is_deleted": false };
        let update = doc! { "$set": { "is_deleted": true } };
        let result = self.collection.update_many(filter, update).await?;
        Ok(result.modified_count)
    }
}
