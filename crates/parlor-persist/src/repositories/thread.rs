use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};

use crate::error::Result;
use crate::models::ChatThread;

#[derive(Clone)]
pub struct ThreadRepository {
    collection: Collection<ChatThread>,
}

impl ThreadRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("threads");
        Self { collection }
    }

    /// Create a new thread
    pub async fn create_thread(&self, thread: ChatThread) -> Result<ChatThread> {
        self.collection.insert_one(&thread).await?;
        Ok(thread)
    }

    /// Get a live thread by id, scoped to its owner
    pub async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Option<ChatThread>> {
        let filter = doc! { "_id": thread_id, "user_id": user_id, "is_deleted": false };
        Ok(self.collection.find_one(filter).await?)
    }

    /// List live threads for a user, newest first
    pub async fn list_threads(&self, user_id: &str, limit: i64) -> Result<Vec<ChatThread>> {
        let filter = doc! { "user_id": user_id, "is_deleted": false };
        let threads = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(threads)
    }

    pub async fn set_name(&self, thread_id: &str, name: &str) -> Result<()> {
        self.update_fields(thread_id, doc! { "name": name }).await
    }

    pub async fn update_model(&self, thread_id: &str, model_id: &str) -> Result<()> {
        self.update_fields(thread_id, doc! { "model_id": model_id })
            .await
    }

    pub async fn update_image_model(&self, thread_id: &str, image_model_id: &str) -> Result<()> {
        self.update_fields(thread_id, doc! { "image_model_id": image_model_id })
            .await
    }

    pub async fn set_bookmarked(&self, thread_id: &str, bookmarked: bool) -> Result<()> {
        self.update_fields(thread_id, doc! { "bookmarked": bookmarked })
            .await
    }

    pub async fn add_extension(&self, thread_id: &str, extension_id: &str) -> Result<()> {
        let filter = doc! { "_id": thread_id };
        let update = doc! { "$addToSet": { "extension": extension_id } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    pub async fn remove_extension(&self, thread_id: &str, extension_id: &str) -> Result<()> {
        let filter = doc! { "_id": thread_id };
        let update = doc! { "$pull": { "extension": extension_id } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    /// Bump last_message_at
    pub async fn touch(&self, thread_id: &str) -> Result<()> {
        // Same serde representation as the struct field, so reads round-trip.
        let now = bson::to_bson(&Utc::now())?;
        self.update_fields(thread_id, doc! { "last_message_at": now })
            .await
    }

    /// Flag the thread itself as deleted. Callers cascade over messages and
    /// documents first so a half-deleted thread is never observable.
    pub async fn mark_deleted(&self, thread_id: &str) -> Result<()> {
        self.update_fields(thread_id, doc! { "is_deleted": true })
            .await
    }

    async fn update_fields(&self, thread_id: &str, fields: bson::Document) -> Result<()> {
        let filter = doc! { "_id": thread_id };
        let update = doc! { "$set": fields };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }
}
