use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use parlor_llm::{ImageModelConfig, ImageProvider};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub mongodb: MongoDbConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (SERVER_, MONGODB_, LOG_ prefixes)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::default()
                    .prefix("SERVER")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::default()
                    .prefix("MONGODB")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::default()
                    .prefix("LOG")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let mut cfg: Config = config.try_deserialize()?;

        cfg.mongodb_uri = std::env::var("MONGODB_URI").map_err(|_| {
            ConfigError::Message("MONGODB_URI environment variable is required".to_string())
        })?;

        Ok(cfg)
    }
}

/// Image-generation deployments are configured through environment
/// variables, one block per supported model. A model with no API key is
/// simply absent from the catalog.
pub fn image_models_from_env() -> Vec<ImageModelConfig> {
    let var = |name: &str| std::env::var(name).unwrap_or_default();

    vec![
        ImageModelConfig {
            id: "dall-e-3".to_string(),
            name: "DALL-E 3".to_string(),
            description: "Advanced image generation with detailed prompts".to_string(),
            provider: ImageProvider::DallE3,
            api_key: var("AZURE_OPENAI_DALLE_API_KEY"),
            instance_name: var("AZURE_OPENAI_DALLE_API_INSTANCE_NAME"),
            deployment_name: var("AZURE_OPENAI_DALLE_API_DEPLOYMENT_NAME"),
            api_version: std::env::var("AZURE_OPENAI_DALLE_API_VERSION")
                .unwrap_or_else(|_| "2023-12-01-preview".to_string()),
        },
        ImageModelConfig {
            id: "gpt-image-1".to_string(),
            name: "GPT-image-1".to_string(),
            description: "Latest image generation model with enhanced capabilities".to_string(),
            provider: ImageProvider::GptImage1,
            api_key: var("IMAGE_GEN_OAI_API_KEY"),
            instance_name: var("IMAGE_GEN_OAI_API_INSTANCE_NAME"),
            deployment_name: var("IMAGE_GEN_OAI_API_DEPLOYMENT_NAME"),
            api_version: std::env::var("IMAGE_GEN_OAI_AZURE_API_VERSION")
                .unwrap_or_else(|_| "2025-04-01-preview".to_string()),
        },
    ]
}
