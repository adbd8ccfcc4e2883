// Azure OpenAI image generation (DALL-E 3 / GPT-image-1 deployments)

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Image generation backends reachable through an Azure deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageProvider {
    #[serde(rename = "dall-e-3")]
    DallE3,
    #[serde(rename = "gpt-image-1")]
    GptImage1,
}

/// Connection settings for one configured image model.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageModelConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub provider: ImageProvider,
    pub api_key: String,
    pub instance_name: String,
    pub deployment_name: String,
    pub api_version: String,
}

impl ImageModelConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.instance_name.is_empty() && !self.deployment_name.is_empty()
    }

    fn generations_url(&self) -> String {
        format!(
            "https://{}.openai.azure.com/openai/deployments/{}/images/generations?api-version={}",
            self.instance_name, self.deployment_name, self.api_version
        )
    }
}

/// The set of image models currently configured for the deployment.
///
/// Order is significant: the first entry is the fallback when neither the
/// thread nor the tool call names a model.
#[derive(Debug, Clone, Default)]
pub struct ImageModelCatalog {
    models: Vec<ImageModelConfig>,
}

impl ImageModelCatalog {
    /// Keeps only entries with complete connection settings.
    pub fn new(models: Vec<ImageModelConfig>) -> Self {
        Self {
            models: models.into_iter().filter(|m| m.is_configured()).collect(),
        }
    }

    pub fn available(&self) -> &[ImageModelConfig] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ImageModelConfig> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> Option<&ImageModelConfig> {
        self.models.first()
    }

    pub fn ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// "id (Name)" pairs for tool descriptions.
    pub fn describe(&self) -> String {
        self.models
            .iter()
            .map(|m| format!("{} ({})", m.id, m.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub n: Option<u32>,
    pub response_format: Option<String>,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: None,
            quality: None,
            style: None,
            n: None,
            response_format: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenerationResponse {
    pub data: Vec<GeneratedImage>,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

/// Per-category verdict from the Azure content filter.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ContentFilterResult {
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub severity: Option<String>,
}

pub type ContentFilterResults = BTreeMap<String, ContentFilterResult>;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
        content_filter: Option<ContentFilterResults>,
    },

    #[error("image request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ImageError {
    /// Content-filter markers: a known error code, HTTP 400, or a nested
    /// content_filter_results structure.
    pub fn is_content_filtered(&self) -> bool {
        match self {
            Self::Api {
                status,
                code,
                content_filter,
                ..
            } => {
                matches!(
                    code.as_deref(),
                    Some("contentFilter") | Some("content_policy_violation")
                ) || *status == 400
                    || content_filter.is_some()
            }
            Self::Http(_) => false,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &ImageModelConfig,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, ImageError>;
}

/// HTTP client for Azure image-generation deployments.
///
/// Keys differ per configured model, so the api-key header is set per
/// request rather than baked into the client.
#[derive(Debug, Default)]
pub struct AzureImageClient {
    http_client: reqwest::Client,
}

impl AzureImageClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    fn build_body(model: &ImageModelConfig, request: &ImageGenerationRequest) -> Value {
        match model.provider {
            ImageProvider::DallE3 => serde_json::json!({
                "prompt": request.prompt,
                "size": request.size.as_deref().unwrap_or("1024x1024"),
                "quality": request.quality.as_deref().unwrap_or("standard"),
                "style": request.style.as_deref().unwrap_or("vivid"),
                "n": request.n.unwrap_or(1),
                "response_format": request.response_format.as_deref().unwrap_or("b64_json"),
            }),
            // GPT-image-1 always returns base64, no response_format accepted
            ImageProvider::GptImage1 => serde_json::json!({
                "prompt": request.prompt,
                "model": "gpt-image-1",
                "size": request.size.as_deref().unwrap_or("1024x1024"),
                "n": request.n.unwrap_or(1),
                "quality": request.quality.as_deref().unwrap_or("high"),
            }),
        }
    }
}

#[async_trait]
impl ImageGenerator for AzureImageClient {
    async fn generate(
        &self,
        model: &ImageModelConfig,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, ImageError> {
        let url = model.generations_url();
        let body = Self::build_body(model, request);

        tracing::debug!(model = %model.id, deployment = %model.deployment_name, "image generation request");

        let response = self
            .http_client
            .post(&url)
            .header("api-key", &model.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let request_id = ["apim-request-id", "x-ms-request-id"]
                .iter()
                .find_map(|h| response.headers().get(*h))
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let text = response.text().await.unwrap_or_default();
            let envelope: AzureErrorEnvelope = serde_json::from_str(&text).unwrap_or_default();
            let error = envelope.error.unwrap_or_default();

            let content_filter = error
                .inner_error
                .and_then(|inner| inner.content_filter_results)
                .or(error.content_filter_results);

            return Err(ImageError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error
                    .message
                    .unwrap_or_else(|| format!("image API error ({})", status)),
                request_id,
                content_filter,
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct AzureErrorEnvelope {
    error: Option<AzureErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureErrorBody {
    code: Option<String>,
    message: Option<String>,
    inner_error: Option<AzureInnerError>,
    content_filter_results: Option<ContentFilterResults>,
}

#[derive(Debug, Deserialize)]
struct AzureInnerError {
    content_filter_results: Option<ContentFilterResults>,
}
