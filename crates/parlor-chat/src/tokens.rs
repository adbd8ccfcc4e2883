use anyhow::Result;
use tiktoken_rs::{cl100k_base, CoreBPE};

use parlor_llm::Message;

/// Token counts for usage reporting. No control-flow decisions hang off
/// these numbers.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn new() -> Result<Self> {
        Ok(Self { bpe: cl100k_base()? })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Per-message (role, token count) pairs over a prompt history.
    pub fn count_history(&self, messages: &[Message]) -> Vec<(String, usize)> {
        messages
            .iter()
            .map(|message| {
                let text = match message {
                    Message::System { content, .. }
                    | Message::Human { content, .. }
                    | Message::Tool { content, .. } => content.as_text().unwrap_or(""),
                    Message::AI { content, .. } => content
                        .as_ref()
                        .and_then(|c| c.as_text())
                        .unwrap_or(""),
                };
                (message.role().to_string(), self.count(text))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_stable_and_nonzero_for_text() {
        let counter = TokenCounter::new().unwrap();
        let count = counter.count("The quick brown fox jumps over the lazy dog.");
        assert!(count > 0);
        assert_eq!(
            count,
            counter.count("The quick brown fox jumps over the lazy dog.")
        );
    }

    #[test]
    fn empty_text_counts_zero() {
        let counter = TokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn history_counts_pair_roles_with_counts() {
        let counter = TokenCounter::new().unwrap();
        let history = vec![Message::system("be helpful"), Message::human("hello")];

        let counts = counter.count_history(&history);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].0, "system");
        assert_eq!(counts[1].0, "user");
        assert!(counts[1].1 > 0);
    }
}
