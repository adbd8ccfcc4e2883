use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Clock, TtlCache};
use crate::error::{PersistError, Result};
use crate::models::{ModelConfig, PublicModel};
use crate::repositories::ModelRepository;
use crate::secret::SecretCipher;

/// Resolved connection parameters for one chat model.
#[derive(Debug, Clone)]
pub struct ModelConnection {
    pub endpoint: String,
    pub api_key: String,
    pub deployment_name: String,
    pub api_version: String,
    pub friendly_name: String,
}

const CACHE_TTL: Duration = Duration::from_secs(60);

/// Model lookups with a read cache. Every write path invalidates the cache
/// so a stale default-model read never outlives a write.
pub struct ModelRegistry {
    repo: ModelRepository,
    cipher: Arc<dyn SecretCipher>,
    enabled_cache: TtlCache<Vec<PublicModel>>,
    default_cache: TtlCache<ModelConfig>,
}

impl ModelRegistry {
    pub fn new(repo: ModelRepository, cipher: Arc<dyn SecretCipher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            cipher,
            enabled_cache: TtlCache::new(CACHE_TTL, clock.clone()),
            default_cache: TtlCache::new(CACHE_TTL, clock),
        }
    }

    /// Enabled models for client consumption (dropdowns etc.), cached.
    pub async fn list_enabled(&self) -> Result<Vec<PublicModel>> {
        if let Some(models) = self.enabled_cache.get() {
            return Ok(models);
        }

        let models: Vec<PublicModel> = self
            .repo
            .list_enabled()
            .await?
            .iter()
            .map(PublicModel::from)
            .collect();

        self.enabled_cache.set(models.clone());
        Ok(models)
    }

    /// The enabled default model with its secrets still encrypted, cached.
    pub async fn get_default(&self) -> Result<ModelConfig> {
        if let Some(model) = self.default_cache.get() {
            return Ok(model);
        }

        let model = self
            .repo
            .get_default()
            .await?
            .ok_or(PersistError::NoDefaultModel)?;

        self.default_cache.set(model.clone());
        Ok(model)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ModelConfig> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PersistError::ModelNotFound(id.to_string()))
    }

    /// Setup gate: is at least one model enabled?
    pub async fn has_enabled_models(&self) -> Result<bool> {
        if let Some(models) = self.enabled_cache.get() {
            return Ok(!models.is_empty());
        }
        Ok(self.repo.count_enabled().await? > 0)
    }

    /// Resolve connection parameters for a model id, or the default model
    /// when no id is given. Decrypts the API key through the cipher seam.
    pub async fn resolve(&self, model_id: Option<&str>) -> Result<ModelConnection> {
        let model = match model_id {
            Some(id) => self.get_by_id(id).await?,
            None => self.get_default().await?,
        };

        if !model.enabled {
            return Err(PersistError::ModelDisabled(model.friendly_name));
        }

        let api_key = self.cipher.decrypt(&model.api_key_enc)?;

        Ok(ModelConnection {
            endpoint: model.endpoint(),
            api_key,
            deployment_name: model.deployment_name,
            api_version: model.api_version,
            friendly_name: model.friendly_name,
        })
    }

    /// Friendly name for display on persisted messages. Lookup failures
    /// degrade to None so message persistence never fails on a rename.
    pub async fn friendly_name(&self, model_id: Option<&str>) -> Option<String> {
        let result = match model_id {
            Some(id) => self.get_by_id(id).await,
            None => self.get_default().await,
        };

        match result {
            Ok(model) => Some(model.friendly_name),
            Err(e) => {
                tracing::warn!("failed to get model friendly name: {}", e);
                None
            }
        }
    }

    /// Create or update a model configuration.
    pub async fn upsert_model(&self, model: ModelConfig) -> Result<ModelConfig> {
        if model.is_default {
            self.repo.clear_default_except(&model.id).await?;
        }
        let saved = self.repo.upsert(model).await?;
        self.invalidate();
        Ok(saved)
    }

    /// Make the given enabled model the single default.
    pub async fn set_default(&self, id: &str) -> Result<()> {
        let model = self.get_by_id(id).await?;
        if !model.enabled {
            return Err(PersistError::ModelDisabled(model.friendly_name));
        }

        self.repo.clear_default_except(id).await?;
        self.repo.set_default_flag(id, true).await?;
        self.invalidate();
        Ok(())
    }

    /// Remove a model. The last enabled model cannot be removed; removing
    /// the default promotes the next enabled model.
    pub async fn remove_model(&self, id: &str) -> Result<()> {
        let model = self.get_by_id(id).await?;

        if model.enabled && self.repo.count_enabled().await? <= 1 {
            return Err(PersistError::Internal(
                "cannot delete the only enabled model".to_string(),
            ));
        }

        self.repo.delete(id).await?;

        if model.is_default {
            if let Some(next) = self.repo.list_enabled().await?.first() {
                self.repo.set_default_flag(&next.id, true).await?;
            }
        }

        self.invalidate();
        Ok(())
    }

    pub fn invalidate(&self) {
        self.enabled_cache.invalidate();
        self.default_cache.invalidate();
    }
}
