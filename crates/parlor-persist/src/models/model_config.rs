use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROVIDER_AZURE_OPENAI: &str = "azure-openai";
pub const DEFAULT_SORT_ORDER: i32 = 100;

/// Admin-managed connection settings for one chat model deployment.
/// The API key is stored as opaque ciphertext; decryption goes through
/// the `SecretCipher` seam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub friendly_name: String,
    pub provider: String,
    pub instance_name: String,
    pub deployment_name: String,
    pub api_version: String,
    pub api_key_enc: String,
    pub enabled: bool,
    pub is_default: bool,
    #[serde(default = "default_sort_order")]
    pub sort_order: i32,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_sort_order() -> i32 {
    DEFAULT_SORT_ORDER
}

impl ModelConfig {
    pub fn new(
        friendly_name: impl Into<String>,
        instance_name: impl Into<String>,
        deployment_name: impl Into<String>,
        api_version: impl Into<String>,
        api_key_enc: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            friendly_name: friendly_name.into(),
            provider: PROVIDER_AZURE_OPENAI.to_string(),
            instance_name: instance_name.into(),
            deployment_name: deployment_name.into(),
            api_version: api_version.into(),
            api_key_enc: api_key_enc.into(),
            enabled: true,
            is_default: false,
            sort_order: DEFAULT_SORT_ORDER,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("https://{}.openai.azure.com", self.instance_name)
    }
}

/// Model data safe for client consumption (no connection secrets).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicModel {
    pub id: String,
    pub friendly_name: String,
    pub is_default: bool,
    pub sort_order: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&ModelConfig> for PublicModel {
    fn from(model: &ModelConfig) -> Self {
        Self {
            id: model.id.clone(),
            friendly_name: model.friendly_name.clone(),
            is_default: model.is_default,
            sort_order: model.sort_order,
            description: model.description.clone(),
        }
    }
}
