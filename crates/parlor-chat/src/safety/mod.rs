pub mod diagnostic;
pub mod lexical;
pub mod prevalidate;

/// Char-safe prefix, used for prompt excerpts in blocked payloads.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
