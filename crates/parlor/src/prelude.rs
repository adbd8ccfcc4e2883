//! Prelude module for convenient imports
//!
//! ```rust
//! use parlor::prelude::*;
//! ```

pub use crate::{
    AzureOpenAIClient, BlockSource, ChatClient, ChatCompletionEvent, ChatError, ChatMode,
    ChatMessage, ChatOptions, ChatOrchestrator, ChatRequest, ChatThread, CompletionRunner,
    Content, ContextAssembler, ImageBlockedPayload, ImageModelCatalog, Message, MessageRole,
    ModelRegistry, PersistClient, RunnerConfig, StreamEvent, TokenCounter, Tool, ToolCall,
    TurnInput, TurnUser,
};
