//! Drives the provider's streaming chat-completion API for one turn and
//! emits a normalized event sequence over a channel. Function calls are
//! serviced synchronously between provider rounds; the model stream pauses
//! while a call runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlor_llm::{
    types::FunctionCall, ChatOptions, ChatRequest, Message, StreamEvent, Tool, ToolCall,
    ToolChoice,
};
use parlor_persist::{ChatThread, ModelConnection};

use crate::collaborators::ChatClientFactory;
use crate::error::{ChatError, ToolError};
use crate::mode::ChatMode;
use crate::tools::image::{CreateImageArgs, ImageToolExecutor, CREATE_IMG};

/// Events produced by one streaming turn, consumed by the multiplexer.
#[derive(Debug)]
pub enum RunnerEvent {
    /// Accumulated assistant text after each delta.
    Content { snapshot: String },
    FunctionCall { name: String, arguments: String },
    /// Object for structured tool results, string for legacy-format ones.
    FunctionCallResult { result: serde_json::Value },
    FinalContent { content: String },
    Error { error: ChatError },
    Abort,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Completion-length ceiling, applied to every mode.
    pub max_completion_tokens: u32,
    /// Guardrail on the model/tool loop.
    pub max_tool_rounds: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_completion_tokens: 8192,
            max_tool_rounds: 10,
        }
    }
}

/// Everything the runner needs for one turn.
pub struct TurnRequest {
    pub connection: ModelConnection,
    pub mode: ChatMode,
    pub messages: Vec<Message>,
    /// Empty unless the mode exposes tools to the model.
    pub tools: Vec<Tool>,
    pub thread: ChatThread,
    /// Verbatim user message; the image tool uses this, not the model's
    /// rewritten prompt argument.
    pub user_message: String,
}

pub struct CompletionRunner {
    factory: Arc<dyn ChatClientFactory>,
    image_tool: Arc<ImageToolExecutor>,
    config: RunnerConfig,
}

impl CompletionRunner {
    pub fn new(
        factory: Arc<dyn ChatClientFactory>,
        image_tool: Arc<ImageToolExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            factory,
            image_tool,
            config,
        }
    }

    /// Spawn the turn in the background and return the event receiver.
    pub fn spawn(self: &Arc<Self>, request: TurnRequest, cancel: CancellationToken) -> mpsc::Receiver<RunnerEvent> {
        let (tx, rx) = mpsc::channel(64);
        let runner = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(error) = runner.execute(request, tx.clone(), cancel).await {
                let _ = tx.send(RunnerEvent::Error { error }).await;
            }
        });

        rx
    }

    /// Ok(()) means a terminal event was already emitted (finalContent or
    /// abort); errors are emitted by the caller.
    async fn execute(
        &self,
        request: TurnRequest,
        tx: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ChatError> {
        let client = self
            .factory
            .client_for(&request.connection)
            .map_err(ChatError::Other)?;

        let mut messages = request.messages.clone();
        let mut round = 0;

        loop {
            tracing::debug!(
                mode = ?request.mode,
                round,
                deployment = %request.connection.deployment_name,
                "completion round"
            );

            if round >= self.config.max_tool_rounds {
                return Err(ChatError::Stream(format!(
                    "Max tool rounds ({}) reached",
                    self.config.max_tool_rounds
                )));
            }

            let mut options =
                ChatOptions::new().max_completion_tokens(self.config.max_completion_tokens);
            if !request.tools.is_empty() {
                options = options
                    .tools(request.tools.clone())
                    .tool_choice(ToolChoice::auto());
            }

            let chat_request =
                ChatRequest::new(request.connection.deployment_name.clone(), messages.clone())
                    .with_options(options);

            let mut stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.send(RunnerEvent::Abort).await;
                    return Ok(());
                }
                result = client.chat_stream(chat_request) => {
                    result.map_err(|e| ChatError::Stream(e.to_string()))?
                }
            };

            let mut content = String::new();
            // (id, name, arguments) buffers keyed by tool-call index;
            // deltas arrive in fragments
            let mut tool_buffers: BTreeMap<u32, (Option<String>, Option<String>, String)> =
                BTreeMap::new();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(RunnerEvent::Abort).await;
                        return Ok(());
                    }
                    event = stream.next() => event,
                };

                let Some(event) = event else { break };
                let event = event.map_err(|e| ChatError::Stream(e.to_string()))?;

                match event {
                    StreamEvent::Message { content: delta } => {
                        content.push_str(&delta);
                        let _ = tx
                            .send(RunnerEvent::Content {
                                snapshot: content.clone(),
                            })
                            .await;
                    }
                    StreamEvent::ToolCall {
                        index,
                        id,
                        name,
                        arguments,
                    } => {
                        let entry = tool_buffers.entry(index).or_default();
                        if let Some(id) = id {
                            entry.0 = Some(id);
                        }
                        if let Some(name) = name {
                            entry.1 = Some(name);
                        }
                        if let Some(arguments) = arguments {
                            entry.2.push_str(&arguments);
                        }
                    }
                    StreamEvent::Done { .. } => break,
                }
            }

            let tool_calls: Vec<ToolCall> = tool_buffers
                .into_values()
                .filter_map(|(id, name, arguments)| {
                    let (id, name) = (id?, name?);
                    Some(ToolCall {
                        id,
                        tool_type: "function".to_string(),
                        function: FunctionCall { name, arguments },
                    })
                })
                .collect();

            if tool_calls.is_empty() {
                let _ = tx.send(RunnerEvent::FinalContent { content }).await;
                return Ok(());
            }

            // Tool-call protocol: the assistant turn carrying the calls
            // precedes the tool results in the next request.
            let assistant_content = if content.is_empty() {
                None
            } else {
                Some(content.into())
            };
            messages.push(Message::ai_with_tools(
                assistant_content,
                tool_calls.clone(),
            ));

            for call in tool_calls {
                let _ = tx
                    .send(RunnerEvent::FunctionCall {
                        name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                    })
                    .await;

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(RunnerEvent::Abort).await;
                        return Ok(());
                    }
                    outcome = self.execute_call(&request, &call) => outcome,
                };

                match outcome {
                    Ok(value) => {
                        let result_text = value.to_string();
                        messages.push(Message::tool_result(call.id.clone(), result_text));
                        let _ = tx
                            .send(RunnerEvent::FunctionCallResult { result: value })
                            .await;
                    }
                    Err(ToolError::Safety { message, payload }) => {
                        return Err(ChatError::ImageBlocked { message, payload });
                    }
                    Err(recoverable) => {
                        // The model sees the failure as the function result
                        // and can respond to the user about it
                        let text = format!("FINAL_ERROR: {recoverable}");
                        messages.push(Message::tool_result(call.id.clone(), text.clone()));
                        let _ = tx
                            .send(RunnerEvent::FunctionCallResult {
                                result: serde_json::Value::String(text),
                            })
                            .await;
                    }
                }
            }

            round += 1;
        }
    }

    async fn execute_call(
        &self,
        request: &TurnRequest,
        call: &ToolCall,
    ) -> Result<serde_json::Value, ToolError> {
        if call.function.name == CREATE_IMG {
            let args: CreateImageArgs = call.parse_arguments().unwrap_or_default();
            let output = self
                .image_tool
                .execute(&request.thread, &request.user_message, &args)
                .await?;
            serde_json::to_value(output)
                .map_err(|e| ToolError::Provider(format!("failed to encode tool result: {e}")))
        } else {
            // Dynamic extensions are definitions only in this deployment;
            // a call to one without a registered executor is surfaced to
            // the model rather than crashing the turn.
            Err(ToolError::Provider(format!(
                "No executor registered for function '{}'",
                call.function.name
            )))
        }
    }
}
