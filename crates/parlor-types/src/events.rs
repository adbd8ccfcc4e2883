use serde::{Deserialize, Serialize};

use crate::blocked::ImageBlockedPayload;

/// Events delivered to the browser over the chat SSE stream.
///
/// Wire format per event: `event: <type>` / `data: <json of this enum>`,
/// where the JSON is `{"type": "...", "response": ...}`. Exactly one of
/// `finalContent`, `error` or `abort` terminates a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "response")]
pub enum ChatCompletionEvent {
    #[serde(rename = "content")]
    Content(ContentSnapshot),

    #[serde(rename = "functionCall")]
    FunctionCall(FunctionCallPayload),

    /// Raw function result: an object for structured tool results, a plain
    /// string for legacy-format results.
    #[serde(rename = "functionCallResult")]
    FunctionCallResult(serde_json::Value),

    #[serde(rename = "finalContent")]
    FinalContent(String),

    #[serde(rename = "error")]
    Error(String),

    #[serde(rename = "abort")]
    Abort(String),

    #[serde(rename = "imageBlocked")]
    ImageBlocked(ImageBlockedPayload),
}

impl ChatCompletionEvent {
    /// SSE `event:` field name for this variant.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::FunctionCall(_) => "functionCall",
            Self::FunctionCallResult(_) => "functionCallResult",
            Self::FinalContent(_) => "finalContent",
            Self::Error(_) => "error",
            Self::Abort(_) => "abort",
            Self::ImageBlocked(_) => "imageBlocked",
        }
    }

    /// Whether this event closes the stream. `imageBlocked` is the safety
    /// branch of `error` and closes the stream the same way.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinalContent(_) | Self::Error(_) | Self::Abort(_) | Self::ImageBlocked(_)
        )
    }

    pub fn abort() -> Self {
        Self::Abort("Chat aborted".to_string())
    }
}

/// Accumulated assistant text at the time the event was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    pub arguments: String,
}
