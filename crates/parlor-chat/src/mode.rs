use serde::{Deserialize, Serialize};

/// How a turn is sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Image attached to the user turn; no tools.
    Multimodal,
    /// Uploaded documents blended into the system prompt; no tools.
    Hybrid,
    /// Tool-bearing default, even with zero tools.
    Extensions,
}

/// Pick the mode for an incoming message, by strict priority:
/// multimodal image present, else documents present, else extensions.
pub fn select_chat_mode(
    has_multimodal_image: bool,
    document_count: usize,
    _tool_count: usize,
) -> ChatMode {
    if has_multimodal_image {
        ChatMode::Multimodal
    } else if document_count > 0 {
        ChatMode::Hybrid
    } else {
        ChatMode::Extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_wins_over_everything() {
        assert_eq!(select_chat_mode(true, 5, 3), ChatMode::Multimodal);
        assert_eq!(select_chat_mode(true, 0, 0), ChatMode::Multimodal);
    }

    #[test]
    fn documents_win_over_tools() {
        assert_eq!(select_chat_mode(false, 1, 3), ChatMode::Hybrid);
    }

    #[test]
    fn extensions_is_the_default_even_with_zero_tools() {
        assert_eq!(select_chat_mode(false, 0, 0), ChatMode::Extensions);
        assert_eq!(select_chat_mode(false, 0, 7), ChatMode::Extensions);
    }
}
