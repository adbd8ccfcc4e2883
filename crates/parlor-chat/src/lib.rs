pub mod collaborators;
pub mod context;
pub mod error;
pub mod mode;
pub mod orchestrator;
pub mod prompts;
pub mod runner;
pub mod safety;
pub mod stream;
pub mod tokens;
pub mod tools;

pub use collaborators::{
    AzureClientFactory, ChatClientFactory, DocumentExcerpt, DocumentStore, ExtensionProvider,
    HistoryStore, ImageBlobStore, MessageSink, ModelResolver, NewMessage, NullExtensions,
    NullSearch, SearchScope, SimilaritySearch,
};
pub use context::{build_turn_messages, map_stored_messages, ContextAssembler};
pub use error::{ChatError, ToolError};
pub use mode::{select_chat_mode, ChatMode};
pub use orchestrator::{validate_multimodal_image, ChatOrchestrator, TurnInput, TurnUser};
pub use runner::{CompletionRunner, RunnerConfig, RunnerEvent, TurnRequest};
pub use safety::lexical::{CategoryHits, LexicalClassifier, RiskCategory, RiskClassifier};
pub use safety::prevalidate::{prevalidate, risk_threshold_from_env, PreValidation};
pub use stream::{
    blocked_meta_from_payload, classify_function_result, multiplex, StreamContext, StreamGate,
};
pub use tokens::TokenCounter;
pub use tools::image::{
    create_img_tool, CreateImageArgs, CreateImageOutput, ImageToolExecutor, CREATE_IMG,
};
