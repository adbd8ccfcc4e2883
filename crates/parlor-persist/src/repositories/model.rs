use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};

use crate::error::Result;
use crate::models::ModelConfig;

#[derive(Clone)]
pub struct ModelRepository {
    collection: Collection<ModelConfig>,
}

impl ModelRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("models");
        Self { collection }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ModelConfig>> {
        let filter = doc! { "_id": id };
        Ok(self.collection.find_one(filter).await?)
    }

    /// All enabled models, sorted by sort_order then friendly name.
    pub async fn list_enabled(&self) -> Result<Vec<ModelConfig>> {
        let filter = doc! { "enabled": true };
        let mut models: Vec<ModelConfig> = self
            .collection
            .find(filter)
            .await?
            .try_collect()
            .await?;
        models.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.friendly_name.cmp(&b.friendly_name))
        });
        Ok(models)
    }

    /// The enabled default model, if one is configured.
    pub async fn get_default(&self) -> Result<Option<ModelConfig>> {
        let filter = doc! { "is_default": true, "enabled": true };
        let models: Vec<ModelConfig> = self
            .collection
            .find(filter)
            .await?
            .try_collect()
            .await?;

        if models.len() > 1 {
            tracing::warn!(
                count = models.len(),
                "multiple default models found, using first one"
            );
        }

        Ok(models.into_iter().next())
    }

    pub async fn count_enabled(&self) -> Result<u64> {
        let filter = doc! { "enabled": true };
        Ok(self.collection.count_documents(filter).await?)
    }

    pub async fn upsert(&self, mut model: ModelConfig) -> Result<ModelConfig> {
        model.updated_at = Utc::now();
        let filter = doc! { "_id": &model.id };
        self.collection
            .replace_one(filter, &model)
            .upsert(true)
            .await?;
        Ok(model)
    }

    /// Unset is_default on every model except the given one.
    pub async fn clear_default_except(&self, id: &str) -> Result<()> {
        let filter = doc! { "is_default": true, "_id": { "$ne": id } };
        let now = bson::to_bson(&Utc::now())?;
        let update = doc! { "$set": { "is_default": false, "updated_at": now } };
        self.collection.update_many(filter, update).await?;
        Ok(())
    }

    pub async fn set_default_flag(&self, id: &str, is_default: bool) -> Result<()> {
        let filter = doc! { "_id": id };
        let now = bson::to_bson(&Utc::now())?;
        let update = doc! { "$set": { "is_default": is_default, "updated_at": now } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let filter = doc! { "_id": id };
        self.collection.delete_one(filter).await?;
        Ok(())
    }
}
