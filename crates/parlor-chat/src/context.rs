//! Gathers everything a turn sends to the provider: history, document
//! excerpts, persona system prompt and tool definitions.

use std::sync::Arc;

use parlor_llm::{Content, ImageModelCatalog, Message, Tool};
use parlor_persist::{ChatMessage, ChatThread, MessageRole};

use crate::collaborators::{
    DocumentExcerpt, DocumentStore, ExtensionProvider, HistoryStore, SearchScope, SimilaritySearch,
};
use crate::mode::ChatMode;
use crate::prompts::{hybrid_system_prompt, MULTIMODAL_SYSTEM_SUFFIX};
use crate::tools::image::create_img_tool;

/// Provider-imposed history cap; enforcement beyond this window is a UI
/// concern upstream.
const HISTORY_LIMIT: i64 = 30;

/// Fewer results keep the hybrid context manageable.
const HYBRID_TOP_K: usize = 5;

pub struct ContextAssembler {
    messages: Arc<dyn HistoryStore>,
    documents: Arc<dyn DocumentStore>,
    search: Arc<dyn SimilaritySearch>,
    extensions: Arc<dyn ExtensionProvider>,
    catalog: Arc<ImageModelCatalog>,
}

impl ContextAssembler {
    pub fn new(
        messages: Arc<dyn HistoryStore>,
        documents: Arc<dyn DocumentStore>,
        search: Arc<dyn SimilaritySearch>,
        extensions: Arc<dyn ExtensionProvider>,
        catalog: Arc<ImageModelCatalog>,
    ) -> Self {
        Self {
            messages,
            documents,
            search,
            extensions,
            catalog,
        }
    }

    /// Recent history mapped to provider messages. Fetch failures degrade
    /// to an empty history; the chat proceeds with what is available.
    pub async fn history(&self, thread: &ChatThread) -> Vec<Message> {
        match self
            .messages
            .recent_messages(&thread.id, &thread.user_id, HISTORY_LIMIT)
            .await
        {
            Ok(stored) => map_stored_messages(&stored),
            Err(e) => {
                tracing::error!("error on getting history: {}", e);
                Vec::new()
            }
        }
    }

    /// Live document count for the thread, degrading to zero.
    pub async fn document_count(&self, thread: &ChatThread) -> usize {
        match self.documents.count_for_thread(&thread.id).await {
            Ok(count) => count as usize,
            Err(e) => {
                tracing::error!("error on counting documents: {}", e);
                0
            }
        }
    }

    /// Tool definitions for the turn: the image tool is always present,
    /// dynamic per-thread extensions are spliced in after it. Extension
    /// resolution failures degrade to the default tool set.
    pub async fn tools(&self, thread: &ChatThread) -> Vec<Tool> {
        let mut tools = vec![create_img_tool(&self.catalog)];

        match self.extensions.tools_for(&thread.extension).await {
            Ok(dynamic) => tools.extend(dynamic),
            Err(e) => {
                tracing::error!("error on resolving extensions: {}", e);
            }
        }

        tools
    }

    /// Document-context block for hybrid mode: top excerpts scoped to the
    /// user and thread, concatenated with per-document headers. Search
    /// failures degrade to an empty block.
    pub async fn document_context(&self, thread: &ChatThread, query: &str) -> String {
        let scope = SearchScope {
            user_id: thread.user_id.clone(),
            thread_id: thread.id.clone(),
        };

        let excerpts = match self
            .search
            .search(query, HYBRID_TOP_K, &scope, thread.model_id.as_deref())
            .await
        {
            Ok(excerpts) => excerpts,
            Err(e) => {
                tracing::error!("error on similarity search: {}", e);
                Vec::new()
            }
        };

        format_document_context(&excerpts)
    }
}

/// Final provider message list for the selected mode.
pub fn build_turn_messages(
    mode: ChatMode,
    persona: &str,
    document_context: &str,
    history: Vec<Message>,
    user_message: &str,
    multimodal_image: Option<&str>,
) -> Vec<Message> {
    match mode {
        ChatMode::Multimodal => {
            let system = format!("{persona}{MULTIMODAL_SYSTEM_SUFFIX}");
            let image_url = multimodal_image.unwrap_or_default();
            vec![
                Message::system(system),
                Message::human(Content::text_with_image(user_message, image_url)),
            ]
        }
        ChatMode::Hybrid => {
            let mut messages = vec![Message::system(hybrid_system_prompt(persona, document_context))];
            messages.extend(history);
            // The raw user message, not a document-augmented variant
            messages.push(Message::human(user_message));
            messages
        }
        ChatMode::Extensions => {
            let mut messages = vec![Message::system(persona)];
            messages.extend(history);
            messages.push(Message::human(user_message));
            messages
        }
    }
}

/// Map stored messages to provider messages, preserving order and role.
/// The deprecated `function` role is rewritten as an assistant message for
/// backward compatibility with older stored transcripts.
pub fn map_stored_messages(stored: &[ChatMessage]) -> Vec<Message> {
    stored
        .iter()
        .map(|message| match message.role {
            MessageRole::Function => Message::ai(format!(
                "Function result from {}: {}",
                message.name, message.content
            )),
            MessageRole::System => Message::system(message.content.clone()),
            MessageRole::Assistant => Message::ai(message.content.clone()),
            MessageRole::Tool => Message::ai(format!(
                "Function result from {}: {}",
                message.name, message.content
            )),
            MessageRole::User => Message::human(message.content.clone()),
        })
        .collect()
}

fn format_document_context(excerpts: &[DocumentExcerpt]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(index, excerpt)| {
            format!(
                "[Document {}] name: \"{}\" id: \"{}\"\n{}",
                index + 1,
                excerpt.name,
                excerpt.id,
                excerpt.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_llm::ContentPart;

    fn stored(role: MessageRole, name: &str, content: &str) -> ChatMessage {
        ChatMessage::new("thread-1", "user-1", name, role, content)
    }

    #[test]
    fn multimodal_turn_is_system_plus_image_pair() {
        let messages = build_turn_messages(
            ChatMode::Multimodal,
            "persona",
            "",
            vec![Message::human("older turn")],
            "what is in this image?",
            Some("data:image/png;base64,AAAA"),
        );

        // History is not carried on multimodal turns
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), "system");
        match &messages[1] {
            Message::Human { content: Content::Parts(parts), .. } => {
                assert!(matches!(parts[0], ContentPart::Text { .. }));
                assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn hybrid_turn_carries_history_and_raw_user_message() {
        let messages = build_turn_messages(
            ChatMode::Hybrid,
            "persona",
            "[Document 1] name: \"a\" id: \"1\"\ntext",
            vec![Message::human("earlier"), Message::ai("reply")],
            "question about docs",
            None,
        );

        assert_eq!(messages.len(), 4);
        match &messages[0] {
            Message::System { content, .. } => {
                assert!(content.as_text().unwrap().contains("DOCUMENT CONTEXT:"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match messages.last().unwrap() {
            Message::Human { content, .. } => {
                assert_eq!(content.as_text(), Some("question about docs"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn extensions_turn_keeps_plain_persona_system_prompt() {
        let messages = build_turn_messages(
            ChatMode::Extensions,
            "persona text",
            "",
            vec![Message::human("earlier")],
            "hello",
            None,
        );

        assert_eq!(messages.len(), 3);
        match &messages[0] {
            Message::System { content, .. } => {
                assert_eq!(content.as_text(), Some("persona text"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn mapping_preserves_order_and_roles() {
        let history = vec![
            stored(MessageRole::User, "alice", "hello"),
            stored(MessageRole::Assistant, "Parlor", "hi there"),
            stored(MessageRole::User, "alice", "and now?"),
        ];

        let mapped = map_stored_messages(&history);
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0].role(), "user");
        assert_eq!(mapped[1].role(), "assistant");
        assert_eq!(mapped[2].role(), "user");
    }

    #[test]
    fn function_role_is_rewritten_as_assistant() {
        let history = vec![stored(
            MessageRole::Function,
            "create_img",
            r#"{"url":"/api/x.png"}"#,
        )];

        let mapped = map_stored_messages(&history);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].role(), "assistant");

        match &mapped[0] {
            Message::AI { content, .. } => {
                let text = content.as_ref().and_then(|c| c.as_text()).unwrap();
                assert!(text.starts_with("Function result from "));
                assert!(text.starts_with("Function result from create_img: "));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn document_context_formats_excerpts_with_separators() {
        let excerpts = vec![
            DocumentExcerpt {
                id: "doc-1".to_string(),
                name: "notes.txt".to_string(),
                content: "first excerpt".to_string(),
                score: 0.9,
            },
            DocumentExcerpt {
                id: "doc-2".to_string(),
                name: "report.pdf".to_string(),
                content: "second excerpt".to_string(),
                score: 0.8,
            },
        ];

        let block = format_document_context(&excerpts);
        assert!(block.contains("[Document 1] name: \"notes.txt\" id: \"doc-1\""));
        assert!(block.contains("[Document 2] name: \"report.pdf\" id: \"doc-2\""));
        assert!(block.contains("\n---\n"));
    }

    #[test]
    fn empty_excerpts_produce_empty_block() {
        assert_eq!(format_document_context(&[]), "");
    }
}
