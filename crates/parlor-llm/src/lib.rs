pub mod azure;
pub mod streaming;
pub mod traits;
pub mod types;

pub use traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, TokenUsage};

pub use azure::client::AzureOpenAIClient;
pub use azure::images::{
    AzureImageClient, ContentFilterResult, ContentFilterResults, GeneratedImage, ImageError,
    ImageGenerationRequest, ImageGenerationResponse, ImageGenerator, ImageModelCatalog,
    ImageModelConfig, ImageProvider,
};
pub use streaming::StreamEvent;
pub use types::{Content, ContentPart, ImageUrl, Message, Tool, ToolCall, ToolChoice};
