//! Consumes the runner's event sequence and re-emits the typed SSE event
//! stream, performing message-persistence side effects per event type.
//! Exactly one terminal event closes the stream.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;

use parlor_persist::{BlockedMeta, MessageRole};
use parlor_types::{
    ChatCompletionEvent, ContentSnapshot, FunctionCallPayload, ImageBlockedPayload,
};

use crate::collaborators::{MessageSink, ModelResolver, NewMessage};
use crate::error::ChatError;
use crate::prompts::AI_NAME;
use crate::runner::RunnerEvent;
use crate::safety::diagnostic::BLOCKED_IMAGE_BANNER;
use crate::tokens::TokenCounter;
use crate::tools::image::CREATE_IMG;

const FINAL_ERROR_MARKER: &str = "FINAL_ERROR:";

/// Everything the multiplexer needs to persist messages for one turn.
pub struct StreamContext {
    pub sink: Arc<dyn MessageSink>,
    pub resolver: Arc<dyn ModelResolver>,
    pub thread_id: String,
    pub user_id: String,
    pub model_id: Option<String>,
    /// Usage reporting only.
    pub tokens: Option<Arc<TokenCounter>>,
}

/// Close guard for the outbound stream. Closing an already-closed stream
/// is a safe no-op.
#[derive(Debug, Default)]
pub struct StreamGate {
    closed: bool,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Classify a function result and extract the content to store.
///
/// New-style object results carry explicit error/success flags; legacy
/// string results are classified by substring markers.
pub fn classify_function_result(result: &serde_json::Value) -> (bool, String) {
    match result {
        serde_json::Value::Object(map) => {
            let error_flag = map.get("error");
            let is_error = error_flag == Some(&serde_json::Value::Bool(true))
                || map.get("success") == Some(&serde_json::Value::Bool(false))
                || matches!(error_flag, Some(serde_json::Value::String(s)) if !s.is_empty());

            if is_error {
                let content = map
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| result.to_string());
                (true, content)
            } else {
                (false, result.to_string())
            }
        }
        serde_json::Value::String(s) => {
            let is_error = s.contains(FINAL_ERROR_MARKER) || s.contains(BLOCKED_IMAGE_BANNER);
            (is_error, s.clone())
        }
        other => (false, other.to_string()),
    }
}

/// Structured metadata stored on a blocked assistant message.
pub fn blocked_meta_from_payload(payload: &ImageBlockedPayload) -> BlockedMeta {
    BlockedMeta {
        source: Some(payload.source.as_str().to_string()),
        blocked_categories: payload.blocked_categories.clone(),
        risk_score: payload.risk_score,
        suggestions: payload.suggestions.clone(),
    }
}

/// Relay runner events to the client, persisting per event type. The
/// persistence call is awaited before the event is yielded, so every
/// terminal outcome leaves a durable record before the stream closes.
pub fn multiplex(
    mut rx: mpsc::Receiver<RunnerEvent>,
    ctx: StreamContext,
) -> impl Stream<Item = ChatCompletionEvent> {
    async_stream::stream! {
        let mut gate = StreamGate::new();
        let mut last_message = String::new();

        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Content { snapshot } => {
                    last_message = snapshot.clone();
                    yield ChatCompletionEvent::Content(ContentSnapshot { content: snapshot });
                }

                RunnerEvent::FunctionCall { name, arguments } => {
                    persist(&ctx, NewMessage::new(
                        &ctx.thread_id,
                        &ctx.user_id,
                        &name,
                        MessageRole::Function,
                        &arguments,
                    ))
                    .await;

                    yield ChatCompletionEvent::FunctionCall(FunctionCallPayload {
                        name,
                        arguments,
                    });
                }

                RunnerEvent::FunctionCallResult { result } => {
                    let (is_error, content) = classify_function_result(&result);
                    // Error results are stored under the tool's own name so
                    // they render as that tool's output; successes under
                    // the generic name
                    let name = if is_error { CREATE_IMG } else { "tool" };

                    persist(&ctx, NewMessage::new(
                        &ctx.thread_id,
                        &ctx.user_id,
                        name,
                        MessageRole::Function,
                        content,
                    ))
                    .await;

                    yield ChatCompletionEvent::FunctionCallResult(result);
                }

                RunnerEvent::Abort => {
                    // Client-initiated cancellation, not a conversational
                    // turn; nothing is persisted
                    yield ChatCompletionEvent::abort();
                    gate.close();
                }

                RunnerEvent::Error { error } => {
                    match error {
                        ChatError::ImageBlocked { message, payload } => {
                            let model_name =
                                ctx.resolver.friendly_name(ctx.model_id.as_deref()).await;
                            let mut payload = *payload;
                            payload.backfill_risk();

                            persist(&ctx, NewMessage::new(
                                &ctx.thread_id,
                                &ctx.user_id,
                                AI_NAME,
                                MessageRole::Assistant,
                                &message,
                            )
                            .with_model(ctx.model_id.clone(), model_name)
                            .with_blocked_meta(blocked_meta_from_payload(&payload)))
                            .await;

                            yield ChatCompletionEvent::ImageBlocked(payload);
                        }
                        other => {
                            // Best-effort recovery: whatever partial content
                            // accumulated is still saved
                            let model_name =
                                ctx.resolver.friendly_name(ctx.model_id.as_deref()).await;

                            persist(&ctx, NewMessage::new(
                                &ctx.thread_id,
                                &ctx.user_id,
                                AI_NAME,
                                MessageRole::Assistant,
                                last_message.clone(),
                            )
                            .with_model(ctx.model_id.clone(), model_name))
                            .await;

                            yield ChatCompletionEvent::Error(other.to_string());
                        }
                    }
                    gate.close();
                }

                RunnerEvent::FinalContent { content } => {
                    if let Some(counter) = &ctx.tokens {
                        tracing::debug!(tokens = counter.count(&content), "completion tokens");
                    }

                    // Friendly name resolved at completion time, not cached
                    // from turn start
                    let model_name = ctx.resolver.friendly_name(ctx.model_id.as_deref()).await;

                    persist(&ctx, NewMessage::new(
                        &ctx.thread_id,
                        &ctx.user_id,
                        AI_NAME,
                        MessageRole::Assistant,
                        &content,
                    )
                    .with_model(ctx.model_id.clone(), model_name))
                    .await;

                    yield ChatCompletionEvent::FinalContent(content);
                    gate.close();
                }
            }

            if gate.is_closed() {
                break;
            }
        }
    }
}

async fn persist(ctx: &StreamContext, message: NewMessage) {
    if let Err(e) = ctx.sink.create_message(message).await {
        tracing::error!("failed to save chat message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    use parlor_persist::ModelConnection;
    use parlor_types::{BlockSource, TokenCategorySummary};

    #[test]
    fn gate_close_is_idempotent() {
        let mut gate = StreamGate::new();
        assert!(!gate.is_closed());
        gate.close();
        gate.close();
        assert!(gate.is_closed());
    }

    #[test]
    fn object_result_with_error_flag_classifies_as_error() {
        let result = serde_json::json!({"error": true, "message": "boom"});
        let (is_error, content) = classify_function_result(&result);
        assert!(is_error);
        assert_eq!(content, "boom");
    }

    #[test]
    fn object_result_with_error_string_classifies_as_error() {
        let result = serde_json::json!({"error": "bad input"});
        let (is_error, _) = classify_function_result(&result);
        assert!(is_error);
    }

    #[test]
    fn object_result_with_empty_error_string_is_success() {
        let result = serde_json::json!({"error": "", "url": "/api/x.png"});
        let (is_error, _) = classify_function_result(&result);
        assert!(!is_error);
    }

    #[test]
    fn success_object_serializes_whole_result() {
        let result = serde_json::json!({"url": "/api/x.png"});
        let (is_error, content) = classify_function_result(&result);
        assert!(!is_error);
        assert!(content.contains("/api/x.png"));
    }

    #[test]
    fn legacy_string_with_final_error_marker_is_error() {
        let result = serde_json::Value::String("FINAL_ERROR: no model".to_string());
        let (is_error, _) = classify_function_result(&result);
        assert!(is_error);
    }

    #[test]
    fn legacy_string_with_blocked_banner_is_error() {
        let result = serde_json::Value::String(format!("{BLOCKED_IMAGE_BANNER}\ndetails"));
        let (is_error, _) = classify_function_result(&result);
        assert!(is_error);
    }

    #[test]
    fn plain_string_is_success() {
        let result = serde_json::Value::String("all good".to_string());
        let (is_error, _) = classify_function_result(&result);
        assert!(!is_error);
    }

    struct RecordingSink {
        messages: Mutex<Vec<NewMessage>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn create_message(&self, message: NewMessage) -> anyhow::Result<()> {
            self.messages.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct StaticResolver;

    #[async_trait]
    impl ModelResolver for StaticResolver {
        async fn resolve(&self, _model_id: Option<&str>) -> anyhow::Result<ModelConnection> {
            anyhow::bail!("not used in these tests")
        }

        async fn friendly_name(&self, _model_id: Option<&str>) -> Option<String> {
            Some("GPT-4o".to_string())
        }
    }

    fn context(sink: Arc<RecordingSink>) -> StreamContext {
        StreamContext {
            sink,
            resolver: Arc::new(StaticResolver),
            thread_id: "thread-1".to_string(),
            user_id: "user-1".to_string(),
            model_id: Some("model-1".to_string()),
            tokens: None,
        }
    }

    async fn run_events(events: Vec<RunnerEvent>, sink: Arc<RecordingSink>) -> Vec<ChatCompletionEvent> {
        let (tx, rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        multiplex(rx, context(sink)).collect().await
    }

    #[tokio::test]
    async fn final_content_persists_exactly_one_assistant_message() {
        let sink = RecordingSink::new();
        let events = run_events(
            vec![
                RunnerEvent::Content { snapshot: "Hel".into() },
                RunnerEvent::Content { snapshot: "Hello".into() },
                RunnerEvent::FinalContent { content: "Hello".into() },
            ],
            sink.clone(),
        )
        .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], ChatCompletionEvent::FinalContent(_)));

        let saved = sink.messages.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].role, MessageRole::Assistant);
        assert_eq!(saved[0].content, "Hello");
        assert_eq!(saved[0].name, AI_NAME);
        assert_eq!(saved[0].model_id.as_deref(), Some("model-1"));
        assert_eq!(saved[0].model_name.as_deref(), Some("GPT-4o"));
    }

    #[tokio::test]
    async fn abort_persists_nothing_and_closes() {
        let sink = RecordingSink::new();
        let events = run_events(
            vec![
                RunnerEvent::Content { snapshot: "partial".into() },
                RunnerEvent::Abort,
                // Anything after the terminal event must be dropped
                RunnerEvent::FinalContent { content: "late".into() },
            ],
            sink.clone(),
        )
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatCompletionEvent::Abort(_)));
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_error_persists_partial_content() {
        let sink = RecordingSink::new();
        let events = run_events(
            vec![
                RunnerEvent::Content { snapshot: "partial answer".into() },
                RunnerEvent::Error {
                    error: ChatError::Stream("connection reset".into()),
                },
            ],
            sink.clone(),
        )
        .await;

        assert!(matches!(events.last(), Some(ChatCompletionEvent::Error(_))));

        let saved = sink.messages.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].content, "partial answer");
        assert_eq!(saved[0].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn image_blocked_error_persists_guidance_and_backfills_risk() {
        let mut payload = ImageBlockedPayload::new(BlockSource::ApiContentFilter, "guidance");
        payload.token_summary.insert(
            "violence".to_string(),
            TokenCategorySummary {
                count: 6,
                samples: vec!["blood".to_string()],
            },
        );

        let sink = RecordingSink::new();
        let events = run_events(
            vec![RunnerEvent::Error {
                error: ChatError::ImageBlocked {
                    message: "guidance".into(),
                    payload: Box::new(payload),
                },
            }],
            sink.clone(),
        )
        .await;

        match events.last() {
            Some(ChatCompletionEvent::ImageBlocked(payload)) => {
                // 6 hits / 12 = 0.5 backfilled from the token summary
                assert_eq!(payload.risk_score, Some(0.5));
                let breakdown = payload.risk_breakdown.as_ref().unwrap();
                assert!((breakdown["violence"] - 0.25).abs() < 1e-9);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let saved = sink.messages.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].content, "guidance");
        assert_eq!(
            saved[0].blocked_meta.as_ref().unwrap().source.as_deref(),
            Some("api_content_filter")
        );
    }

    #[tokio::test]
    async fn function_call_and_result_persist_function_messages() {
        let sink = RecordingSink::new();
        let events = run_events(
            vec![
                RunnerEvent::FunctionCall {
                    name: "create_img".into(),
                    arguments: r#"{"prompt":"a cat"}"#.into(),
                },
                RunnerEvent::FunctionCallResult {
                    result: serde_json::json!({"url": "/api/threads/t/images/x.png"}),
                },
                RunnerEvent::FinalContent { content: "done".into() },
            ],
            sink.clone(),
        )
        .await;

        assert_eq!(events.len(), 3);

        let saved = sink.messages.lock().unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[0].role, MessageRole::Function);
        assert_eq!(saved[0].name, "create_img");
        assert_eq!(saved[1].role, MessageRole::Function);
        assert_eq!(saved[1].name, "tool");
        assert_eq!(saved[2].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn error_classified_result_is_stored_under_tool_name() {
        let sink = RecordingSink::new();
        run_events(
            vec![
                RunnerEvent::FunctionCallResult {
                    result: serde_json::Value::String("FINAL_ERROR: invalid model".into()),
                },
                RunnerEvent::FinalContent { content: "sorry".into() },
            ],
            sink.clone(),
        )
        .await;

        let saved = sink.messages.lock().unwrap();
        assert_eq!(saved[0].name, CREATE_IMG);
        assert_eq!(saved[0].content, "FINAL_ERROR: invalid model");
    }

    #[tokio::test]
    async fn only_one_terminal_event_is_emitted() {
        let sink = RecordingSink::new();
        let events = run_events(
            vec![
                RunnerEvent::FinalContent { content: "first".into() },
                RunnerEvent::Error {
                    error: ChatError::Stream("late error".into()),
                },
                RunnerEvent::Abort,
            ],
            sink.clone(),
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ChatCompletionEvent::FinalContent(_)));
        assert_eq!(sink.messages.lock().unwrap().len(), 1);
    }
}
