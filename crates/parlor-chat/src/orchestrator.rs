//! Entry point for one chat turn: fan out context reads, run the
//! pre-validation gate, persist the user message, invoke the completion
//! runner and hand the multiplexed event stream back to the transport.

use std::sync::Arc;
use std::sync::OnceLock;

use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use parlor_llm::{ChatOptions, ChatRequest, Message};
use parlor_persist::{ChatThread, MessageRole, NEW_CHAT_NAME};
use parlor_types::ChatCompletionEvent;

use crate::collaborators::{ChatClientFactory, MessageSink, ModelResolver, NewMessage};
use crate::context::{build_turn_messages, ContextAssembler};
use crate::error::ChatError;
use crate::mode::{select_chat_mode, ChatMode};
use crate::prompts::{title_prompt, CHAT_DEFAULT_SYSTEM_PROMPT};
use crate::runner::{CompletionRunner, TurnRequest};
use crate::safety::prevalidate::prevalidate;
use crate::stream::{blocked_meta_from_payload, multiplex, StreamContext};
use crate::tokens::TokenCounter;

/// Inbound user turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub message: String,
    pub multimodal_image: Option<String>,
}

/// The resolved caller; session resolution happens upstream.
#[derive(Debug, Clone)]
pub struct TurnUser {
    pub id: String,
    pub name: String,
}

const TITLE_COMPLETION_TOKENS: u32 = 1000;

/// Image payload types accepted on multimodal turns.
const SUPPORTED_IMAGE_EXTENSIONS: [&str; 4] = ["JPEG", "JPG", "PNG", "WEBP"];

fn data_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data:image/([a-zA-Z]+);base64,").expect("static data-uri pattern")
    })
}

/// Check an inbound `data:image/...;base64,` payload before any work.
pub fn validate_multimodal_image(data_uri: &str) -> Result<(), ChatError> {
    let captures = data_uri_regex()
        .captures(data_uri)
        .ok_or(ChatError::MissingImageExtension)?;
    let extension = captures
        .get(1)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default();

    if SUPPORTED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ChatError::UnsupportedImage(extension))
    }
}

pub struct ChatOrchestrator {
    assembler: ContextAssembler,
    runner: Arc<CompletionRunner>,
    sink: Arc<dyn MessageSink>,
    resolver: Arc<dyn ModelResolver>,
    factory: Arc<dyn ChatClientFactory>,
    tokens: Arc<TokenCounter>,
    risk_threshold: f64,
}

impl ChatOrchestrator {
    pub fn new(
        assembler: ContextAssembler,
        runner: Arc<CompletionRunner>,
        sink: Arc<dyn MessageSink>,
        resolver: Arc<dyn ModelResolver>,
        factory: Arc<dyn ChatClientFactory>,
        tokens: TokenCounter,
        risk_threshold: f64,
    ) -> Self {
        Self {
            assembler,
            runner,
            sink,
            resolver,
            factory,
            tokens: Arc::new(tokens),
            risk_threshold,
        }
    }

    /// Run one chat turn. The returned stream yields typed SSE events and
    /// terminates after exactly one terminal event.
    pub async fn stream_turn(
        &self,
        thread: ChatThread,
        user: TurnUser,
        input: TurnInput,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, ChatCompletionEvent>, ChatError> {
        let multimodal_image = input
            .multimodal_image
            .as_deref()
            .filter(|image| !image.is_empty());
        if let Some(image) = multimodal_image {
            validate_multimodal_image(image)?;
        }

        // Independent reads run concurrently; each degrades to empty on
        // failure so the chat proceeds with whatever is available
        let (history, document_count, tools) = tokio::join!(
            self.assembler.history(&thread),
            self.assembler.document_count(&thread),
            self.assembler.tools(&thread),
        );

        let persona = format!(
            "{} \n\n {}",
            CHAT_DEFAULT_SYSTEM_PROMPT, thread.persona_message
        );
        let mode = select_chat_mode(multimodal_image.is_some(), document_count, tools.len());

        tracing::info!(
            thread_id = %thread.id,
            ?mode,
            document_count,
            tool_count = tools.len(),
            "chat turn"
        );

        let pre = prevalidate(&input.message, self.risk_threshold);
        if pre.high_risk {
            return self.short_circuit_blocked(&thread, &user, &input, &pre).await;
        }

        self.sink
            .create_message(
                NewMessage::new(
                    &thread.id,
                    &user.id,
                    &user.name,
                    MessageRole::User,
                    &input.message,
                )
                .with_multimodal_image(input.multimodal_image.clone()),
            )
            .await
            .map_err(ChatError::Other)?;

        let connection = self
            .resolver
            .resolve(thread.model_id.as_deref())
            .await
            .map_err(ChatError::Other)?;

        let document_context = if mode == ChatMode::Hybrid {
            self.assembler
                .document_context(&thread, &input.message)
                .await
        } else {
            String::new()
        };

        let messages = build_turn_messages(
            mode,
            &persona,
            &document_context,
            history,
            &input.message,
            multimodal_image,
        );

        // Usage reporting only; no control flow hangs off these counts
        for (role, count) in self.tokens.count_history(&messages) {
            tracing::debug!(role = %role, tokens = count, "prompt tokens");
        }

        let turn_tools = if mode == ChatMode::Extensions {
            tools
        } else {
            Vec::new()
        };

        let request = TurnRequest {
            connection,
            mode,
            messages,
            tools: turn_tools,
            thread: thread.clone(),
            user_message: input.message.clone(),
        };

        let rx = self.runner.spawn(request, cancel);
        let ctx = StreamContext {
            sink: Arc::clone(&self.sink),
            resolver: Arc::clone(&self.resolver),
            thread_id: thread.id.clone(),
            user_id: user.id.clone(),
            model_id: thread.model_id.clone(),
            tokens: Some(Arc::clone(&self.tokens)),
        };

        Ok(multiplex(rx, ctx).boxed())
    }

    /// Pre-validation short circuit: persist the user message and a
    /// blocked assistant message, emit a single `imageBlocked` event, and
    /// never call the provider.
    async fn short_circuit_blocked(
        &self,
        thread: &ChatThread,
        user: &TurnUser,
        input: &TurnInput,
        pre: &crate::safety::prevalidate::PreValidation,
    ) -> Result<BoxStream<'static, ChatCompletionEvent>, ChatError> {
        tracing::info!(
            thread_id = %thread.id,
            risk_score = pre.risk_score,
            "image request blocked by pre-validation"
        );

        let guidance = pre.guidance();
        let payload = pre.blocked_payload(&input.message);

        // User message first for continuity
        self.sink
            .create_message(
                NewMessage::new(
                    &thread.id,
                    &user.id,
                    &user.name,
                    MessageRole::User,
                    &input.message,
                )
                .with_multimodal_image(input.multimodal_image.clone()),
            )
            .await
            .map_err(ChatError::Other)?;

        let model_name = self.resolver.friendly_name(thread.model_id.as_deref()).await;
        self.sink
            .create_message(
                NewMessage::new(
                    &thread.id,
                    &user.id,
                    "system",
                    MessageRole::Assistant,
                    &guidance,
                )
                .with_model(thread.model_id.clone(), model_name)
                .with_blocked_meta(blocked_meta_from_payload(&payload)),
            )
            .await
            .map_err(ChatError::Other)?;

        Ok(stream::iter(vec![ChatCompletionEvent::ImageBlocked(payload)]).boxed())
    }

    /// Name a thread from its first user message, via a non-streaming
    /// completion on the thread's model.
    pub async fn generate_title(
        &self,
        thread: &ChatThread,
        first_message: &str,
    ) -> Result<String, ChatError> {
        let connection = self
            .resolver
            .resolve(thread.model_id.as_deref())
            .await
            .map_err(ChatError::Other)?;
        let client = self
            .factory
            .client_for(&connection)
            .map_err(ChatError::Other)?;

        let request = ChatRequest::new(
            connection.deployment_name.clone(),
            vec![Message::human(title_prompt(first_message))],
        )
        .with_options(ChatOptions::new().max_completion_tokens(TITLE_COMPLETION_TOKENS));

        let response = client.chat(request).await.map_err(ChatError::Other)?;
        let title = response
            .content
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| NEW_CHAT_NAME.to_string());

        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_image_payloads_pass() {
        for ext in ["png", "PNG", "jpeg", "jpg", "webp"] {
            let uri = format!("data:image/{ext};base64,AAAA");
            assert!(validate_multimodal_image(&uri).is_ok(), "rejected {ext}");
        }
    }

    #[test]
    fn unsupported_image_payloads_are_rejected() {
        let result = validate_multimodal_image("data:image/gif;base64,AAAA");
        assert!(matches!(result, Err(ChatError::UnsupportedImage(ext)) if ext == "GIF"));
    }

    #[test]
    fn payload_without_extension_is_rejected() {
        let result = validate_multimodal_image("base64,AAAA");
        assert!(matches!(result, Err(ChatError::MissingImageExtension)));
    }
}
