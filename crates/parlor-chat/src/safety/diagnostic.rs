//! Builds the human-readable markdown guidance and the structured payload
//! for blocked image requests.

use parlor_llm::ContentFilterResults;
use parlor_types::{BlockSource, ImageBlockedPayload};

use super::lexical::{intensity_hits, CategoryHits, RiskCategory};
use super::truncate_chars;

/// Marker recognized by the legacy string classification in the stream
/// multiplexer. Must stay byte-identical across producers and consumers.
pub const BLOCKED_IMAGE_BANNER: &str = "🚫 **Image blocked by Azure Content Safety**";

const PROMPT_EXCERPT_CHARS: usize = 240;

/// Provider categories reported by the content filter, in display order.
const FILTER_CATEGORIES: [&str; 4] = ["hate", "sexual", "violence", "self_harm"];

/// Rolling multiplicative hash of the prompt, for correlating blocked
/// requests without storing the text. Not cryptographic.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hash: u32 = 0;
    for c in prompt.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(c as u32);
    }
    format!("{:08x}", hash)
}

/// Rich diagnostic for a provider content-filter block: provider-reported
/// per-category verdicts when present, otherwise the lexical analysis,
/// plus remediation suggestions.
pub fn content_filter_block(
    prompt: &str,
    provider_message: Option<&str>,
    request_id: Option<&str>,
    filter_results: Option<&ContentFilterResults>,
    hits: &CategoryHits,
) -> (String, ImageBlockedPayload) {
    let mut message = BLOCKED_IMAGE_BANNER.to_string();

    if let Some(id) = request_id {
        message.push_str(&format!("\n📋 Request ID: {id}"));
    }

    if let Some(text) = provider_message {
        message.push_str(&format!("\n⚠️ {text}"));
    }

    let mut filter_summary: Vec<String> = Vec::new();
    match filter_results {
        Some(results) => {
            message.push_str("\n\n📊 **Content Filter Analysis:**");
            for category in FILTER_CATEGORIES {
                if let Some(result) = results.get(category) {
                    let severity = result
                        .severity
                        .as_deref()
                        .unwrap_or("unknown")
                        .to_lowercase();
                    if result.filtered {
                        filter_summary.push(format!("{category}:{severity}"));
                        message.push_str(&format!(
                            "\n• ❌ **{}**: Blocked (severity: {severity})",
                            category.to_uppercase()
                        ));
                    } else {
                        message.push_str(&format!(
                            "\n• ✅ **{}**: Allowed (severity: {severity})",
                            category.to_uppercase()
                        ));
                    }
                }
            }
            if !filter_summary.is_empty() {
                message.push_str(&format!(
                    "\n\n🚨 **Blocked Categories:** {}",
                    filter_summary.join(", ")
                ));
            }
        }
        None => {
            message.push_str(
                "\n\n🔍 **Content Filter Details:** Not available in response - using lexical analysis.",
            );
        }
    }

    if hits.any() {
        message.push_str("\n\n🔍 **Detected category indicators (token counts):**");
        for category in RiskCategory::ALL {
            let matches = hits.matches(category);
            if !matches.is_empty() {
                let summary = hits
                    .token_counts(category)
                    .into_iter()
                    .take(8)
                    .map(|(token, count)| {
                        if count > 1 {
                            format!("{token}×{count}")
                        } else {
                            token
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                message.push_str(&format!(
                    "\n• {}: {} match(es) → {}",
                    category.key(),
                    matches.len(),
                    summary
                ));
            }
        }

        message.push_str("\n\n💡 **Suggestions:**");
        for category in RiskCategory::ALL {
            if !hits.matches(category).is_empty() {
                message.push_str(&format!(
                    "\n• **{}**: {}",
                    category.label(),
                    category.suggestion()
                ));
                let unique = hits.unique_tokens(category, 6);
                if !unique.is_empty() {
                    message.push_str(&format!(" (triggered by: {})", unique.join(", ")));
                }
                let replacements = category.safe_replacements();
                if !replacements.is_empty() {
                    message.push_str(&format!(
                        "\n  → Try: {}",
                        replacements
                            .iter()
                            .take(4)
                            .copied()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
            }
        }

        if !hits.matches(RiskCategory::Violence).is_empty()
            && !hits.matches(RiskCategory::Hate).is_empty()
        {
            message.push_str(
                "\n\n⚠️ Combined violent + hateful terms can elevate severity—remove one or both categories entirely.",
            );
        }
    } else {
        message.push_str("\n\n🔍 **No direct high-risk tokens matched**");
        message.push_str(
            "\n💡 The block may be due to contextual phrasing, implied harm, or internal prompt expansion. Try neutral, descriptive language.",
        );
    }

    if hits.matches(RiskCategory::Violence).is_empty() {
        let intensity = intensity_hits(prompt);
        if !intensity.is_empty() {
            message.push_str(&format!(
                "\n\nℹ️ Detected intensity terms: {} — softening them may help.",
                intensity.join(", ")
            ));
        }
    }

    message.push_str("\n\n🔄 **Try:** Rephrasing with different words or removing potentially sensitive terms.");
    message.push_str(&format!("\n\n📝 **Original prompt:** \"{prompt}\""));

    let suggestions = RiskCategory::ALL
        .into_iter()
        .filter(|category| !hits.matches(*category).is_empty())
        .map(|category| format!("{}: {}", category.label(), category.suggestion()))
        .collect();

    let mut payload = ImageBlockedPayload::new(BlockSource::ApiContentFilter, message.clone());
    payload.original_prompt = Some(truncate_chars(prompt, PROMPT_EXCERPT_CHARS));
    payload.request_id = request_id.map(str::to_string);
    payload.block_id = Some(uuid::Uuid::new_v4().to_string());
    payload.prompt_hash = Some(prompt_hash(prompt));
    payload.blocked_categories = filter_summary;
    payload.token_summary = hits.token_summary();
    payload.suggestions = suggestions;
    payload.retry_allowed = Some(false);

    (message, payload)
}

/// A structurally successful image call without image data is treated as
/// an undisclosed safety refusal.
pub fn model_refusal_block(prompt: &str) -> (String, ImageBlockedPayload) {
    let message = format!(
        "🚫 **Image request not fulfilled (model_refusal)**\nThe model did not return image data for this request. This often indicates an internal safety or policy refusal even if no explicit content filter error was raised.\n\n📝 **Original prompt:** \"{prompt}\"\n\n🔄 **Try:** Adjust wording to remove explicit conflict, weapons, injury, or gore; focus on neutral descriptors."
    );

    let mut payload = ImageBlockedPayload::new(BlockSource::ModelRefusal, message.clone());
    payload.original_prompt = Some(truncate_chars(prompt, PROMPT_EXCERPT_CHARS));
    payload.block_id = Some(uuid::Uuid::new_v4().to_string());
    payload.prompt_hash = Some(prompt_hash(prompt));
    payload.suggestions = vec![
        "General: Remove explicit conflict / harm terms; use neutral descriptive language."
            .to_string(),
    ];
    payload.retry_allowed = Some(false);

    (message, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::lexical::{LexicalClassifier, RiskClassifier};
    use parlor_llm::ContentFilterResult;

    #[test]
    fn prompt_hash_is_stable_hex() {
        let a = prompt_hash("a violent battle");
        let b = prompt_hash("a violent battle");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prompt_hash_differs_for_different_prompts() {
        assert_ne!(prompt_hash("one prompt"), prompt_hash("another prompt"));
    }

    #[test]
    fn provider_results_take_precedence_in_message() {
        let mut results = ContentFilterResults::new();
        results.insert(
            "violence".to_string(),
            ContentFilterResult {
                filtered: true,
                severity: Some("high".to_string()),
            },
        );
        results.insert(
            "sexual".to_string(),
            ContentFilterResult {
                filtered: false,
                severity: Some("safe".to_string()),
            },
        );

        let hits = LexicalClassifier::new().classify("a battle");
        let (message, payload) =
            content_filter_block("a battle", Some("filtered"), Some("req-1"), Some(&results), &hits);

        assert!(message.starts_with(BLOCKED_IMAGE_BANNER));
        assert!(message.contains("📋 Request ID: req-1"));
        assert!(message.contains("❌ **VIOLENCE**: Blocked (severity: high)"));
        assert!(message.contains("✅ **SEXUAL**: Allowed (severity: safe)"));
        assert!(message.contains("🚨 **Blocked Categories:** violence:high"));
        assert_eq!(payload.blocked_categories, vec!["violence:high".to_string()]);
        assert_eq!(payload.request_id.as_deref(), Some("req-1"));
        assert_eq!(payload.retry_allowed, Some(false));
    }

    #[test]
    fn lexical_fallback_reports_tokens_and_suggestions() {
        let hits = LexicalClassifier::new().classify("blood and gore and more blood");
        let (message, payload) =
            content_filter_block("blood and gore and more blood", None, None, None, &hits);

        assert!(message.contains("using lexical analysis"));
        assert!(message.contains("blood×2"));
        assert!(message.contains("**Violence**:"));
        assert_eq!(payload.token_summary["violence"].count, 3);
        assert!(payload.suggestions[0].starts_with("Violence:"));
    }

    #[test]
    fn violence_and_hate_together_escalate() {
        let hits = LexicalClassifier::new().classify("nazi battle blood");
        let (message, _) = content_filter_block("nazi battle blood", None, None, None, &hits);

        assert!(message.contains("Combined violent + hateful terms"));
    }

    #[test]
    fn intensity_terms_noted_when_no_violence_token_matched() {
        let hits = LexicalClassifier::new().classify("a severe and brutal landscape");
        let (message, _) =
            content_filter_block("a severe and brutal landscape", None, None, None, &hits);

        assert!(hits.matches(RiskCategory::Violence).is_empty());
        assert!(message.contains("Detected intensity terms: severe, brutal"));
    }

    #[test]
    fn no_matches_yields_contextual_guidance() {
        let hits = LexicalClassifier::new().classify("a quiet library");
        let (message, payload) = content_filter_block("a quiet library", None, None, None, &hits);

        assert!(message.contains("**No direct high-risk tokens matched**"));
        assert!(payload.token_summary.is_empty());
        assert!(payload.suggestions.is_empty());
    }

    #[test]
    fn refusal_block_is_tagged_model_refusal() {
        let (message, payload) = model_refusal_block("a grim scene");

        assert!(message.contains("model_refusal"));
        assert_eq!(payload.source, BlockSource::ModelRefusal);
        assert_eq!(payload.retry_allowed, Some(false));
        assert!(payload.prompt_hash.is_some());
        assert!(payload.token_summary.is_empty());
    }
}
