//! # Parlor
//!
//! Multi-tenant chat service over Azure OpenAI: per-thread model
//! selection, document-grounded (hybrid) answering, an image-generation
//! tool with a layered safety pipeline, and typed server-sent-event
//! streaming.
//!
//! ## Architecture
//!
//! Parlor is organized into focused crates:
//!
//! - **`parlor-chat`**: chat turn orchestration, safety pipeline, stream
//!   multiplexing
//! - **`parlor-llm`**: Azure OpenAI chat and image clients with streaming
//! - **`parlor-persist`**: MongoDB persistence, model registry, image
//!   store
//! - **`parlor-types`**: wire event model and safety-block payloads
//! - **`parlor-api`**: axum HTTP/SSE surface

pub mod prelude;

pub use parlor_chat::{
    ChatError, ChatMode, ChatOrchestrator, CompletionRunner, ContextAssembler, ImageToolExecutor,
    LexicalClassifier, RiskCategory, RiskClassifier, RunnerConfig, RunnerEvent, TokenCounter,
    ToolError, TurnInput, TurnRequest, TurnUser,
};

pub use parlor_llm::{
    AzureImageClient, AzureOpenAIClient, ChatClient, ChatOptions, ChatRequest, Content,
    ImageGenerator, ImageModelCatalog, ImageModelConfig, Message, StreamEvent, Tool, ToolCall,
    ToolChoice,
};

pub use parlor_persist::{
    ChatMessage, ChatThread, MessageRole, ModelConfig, ModelRegistry, PersistClient, PersistError,
    SecretCipher,
};

pub use parlor_types::{BlockSource, ChatCompletionEvent, ImageBlockedPayload};
