//! Pre-validation risk gate.
//!
//! Runs before the model is ever invoked: when a message shows image
//! intent and carries high-risk tokens, the turn is short-circuited with
//! an `imageBlocked` event instead of paying for a provider call that is
//! virtually certain to be rejected.
//!
//! Token matching here is substring-based over the lowercased message,
//! unlike the word-boundary classifier used on the executor side. The
//! asymmetry mirrors tuned production behavior and is intentional.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use parlor_types::{BlockSource, ImageBlockedPayload, TokenCategorySummary};

use super::lexical::RiskCategory;
use super::truncate_chars;

pub const DEFAULT_RISK_THRESHOLD: f64 = 0.45;
pub const RISK_THRESHOLD_ENV: &str = "IMAGE_PREVALIDATION_RISK_THRESHOLD";

const PREVALIDATION_TOKENS: &[(RiskCategory, &[&str])] = &[
    (
        RiskCategory::Violence,
        &[
            "blood",
            "bloody",
            "gore",
            "gory",
            "decapitated",
            "severed",
            "disemboweled",
            "corpse",
            "zombie",
            "kill",
            "killing",
        ],
    ),
    (
        RiskCategory::Sexual,
        &["nude", "nudity", "naked", "sexual", "erotic", "fetish"],
    ),
    (
        RiskCategory::Hate,
        &["nazi", "terrorist", "genocide", "supremacist", "racist"],
    ),
    (
        RiskCategory::SelfHarm,
        &["suicide", "self-harm", "self harm", "kill myself"],
    ),
];

const MAX_TOKENS_PER_CATEGORY: usize = 5;

fn image_intent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(generate|create|make|draw|design|produce)\s+(an?\s+)?(image|picture|logo|icon|illustration|art|artwork)|\bimage of\b|\billustration of\b",
        )
        .expect("static intent pattern")
    })
}

/// Result of the pre-validation risk check for one user message.
#[derive(Debug, Clone)]
pub struct PreValidation {
    pub image_intent: bool,
    /// Matched tokens per category, capped at five.
    pub detected: BTreeMap<RiskCategory, Vec<String>>,
    pub risk_score: f64,
    pub risk_breakdown: BTreeMap<String, f64>,
    pub high_risk: bool,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Score a user message. Each category contributes up to 0.25, scaled by
/// token count / 5; the sum is capped at 1. A turn is high risk when the
/// score meets the threshold OR any single category has two or more
/// distinct token hits.
pub fn prevalidate(message: &str, threshold: f64) -> PreValidation {
    let lower = message.to_lowercase();
    let image_intent = image_intent_regex().is_match(&lower);

    let mut detected: BTreeMap<RiskCategory, Vec<String>> = BTreeMap::new();
    if image_intent {
        for (category, tokens) in PREVALIDATION_TOKENS {
            let hits: Vec<String> = tokens
                .iter()
                .filter(|token| lower.contains(**token))
                .take(MAX_TOKENS_PER_CATEGORY)
                .map(|token| token.to_string())
                .collect();
            if !hits.is_empty() {
                detected.insert(*category, hits);
            }
        }
    }

    let mut risk_score = 0.0;
    let mut risk_breakdown = BTreeMap::new();
    for (category, tokens) in &detected {
        let contribution = (tokens.len() as f64 / 5.0).min(1.0) * 0.25;
        risk_breakdown.insert(category.key().to_string(), round3(contribution));
        risk_score += contribution;
    }
    let risk_score = round3(risk_score.min(1.0));

    let token_multiplicity = detected.values().any(|tokens| tokens.len() >= 2);
    let high_risk = image_intent && (risk_score >= threshold || token_multiplicity);

    PreValidation {
        image_intent,
        detected,
        risk_score,
        risk_breakdown,
        high_risk,
    }
}

/// Threshold tunable, env-driven with a 0.45 default.
pub fn risk_threshold_from_env() -> f64 {
    std::env::var(RISK_THRESHOLD_ENV)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(DEFAULT_RISK_THRESHOLD)
}

const PRE_VALIDATION_GUIDANCE: &str = "🚫 **Potentially unsafe image request (pre-validation)**\n\nThe prompt contains multiple high-risk terms likely to trigger the image safety filter. Please soften or remove them before retrying.";

impl PreValidation {
    /// Guidance text persisted as the blocked assistant message.
    pub fn guidance(&self) -> String {
        PRE_VALIDATION_GUIDANCE.to_string()
    }

    /// Full payload for the single `imageBlocked` event of a
    /// short-circuited turn.
    pub fn blocked_payload(&self, message: &str) -> ImageBlockedPayload {
        let mut suggestions = Vec::new();
        if self.detected.contains_key(&RiskCategory::Violence) {
            suggestions.push("Violence: reduce graphic or gory terms".to_string());
        }
        if self.detected.contains_key(&RiskCategory::Sexual) {
            suggestions.push("Sexual: remove sexual descriptors".to_string());
        }
        if self.detected.contains_key(&RiskCategory::Hate) {
            suggestions.push("Hate: remove extremist/hate references".to_string());
        }
        if self.detected.contains_key(&RiskCategory::SelfHarm) {
            suggestions.push("Self-harm: remove self-injury references".to_string());
        }

        let detail = self
            .detected
            .iter()
            .map(|(category, tokens)| format!("{}({})", category.key(), tokens.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        let mut payload = ImageBlockedPayload::new(
            BlockSource::PreValidation,
            format!("{}\n\nDetected: {}", self.guidance(), detail),
        );
        payload.original_prompt = Some(truncate_chars(message, 240));
        payload.blocked_categories = self
            .detected
            .keys()
            .map(|category| category.key().to_string())
            .collect();
        payload.token_summary = self
            .detected
            .iter()
            .map(|(category, tokens)| {
                (
                    category.key().to_string(),
                    TokenCategorySummary {
                        count: tokens.len(),
                        samples: tokens.clone(),
                    },
                )
            })
            .collect();
        payload.suggestions = suggestions;
        payload.risk_score = Some(self.risk_score);
        payload.risk_breakdown = Some(self.risk_breakdown.clone());
        payload
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gore_prompt_short_circuits_on_token_multiplicity() {
        let pre = prevalidate(
            "generate an image of blood, gore, and a severed corpse",
            DEFAULT_RISK_THRESHOLD,
        );

        assert!(pre.image_intent);
        let violence = &pre.detected[&RiskCategory::Violence];
        assert!(violence.contains(&"blood".to_string()));
        assert!(violence.contains(&"gore".to_string()));
        assert!(violence.contains(&"severed".to_string()));
        assert!(violence.contains(&"corpse".to_string()));

        // Four distinct tokens: min(4/5, 1) * 0.25 = 0.2, below the
        // threshold, but two or more hits in one category trigger anyway.
        assert_eq!(pre.risk_score, 0.2);
        assert!(pre.risk_score < DEFAULT_RISK_THRESHOLD);
        assert!(pre.high_risk);
    }

    #[test]
    fn no_intent_means_no_detection() {
        let pre = prevalidate("blood gore corpse everywhere", DEFAULT_RISK_THRESHOLD);

        assert!(!pre.image_intent);
        assert!(pre.detected.is_empty());
        assert_eq!(pre.risk_score, 0.0);
        assert!(!pre.high_risk);
    }

    #[test]
    fn benign_image_request_passes() {
        let pre = prevalidate(
            "draw a picture of a sunny meadow with flowers",
            DEFAULT_RISK_THRESHOLD,
        );

        assert!(pre.image_intent);
        assert!(pre.detected.is_empty());
        assert!(!pre.high_risk);
    }

    #[test]
    fn single_token_stays_below_trigger() {
        let pre = prevalidate(
            "generate an image of a zombie parade float",
            DEFAULT_RISK_THRESHOLD,
        );

        assert!(pre.image_intent);
        assert_eq!(pre.detected[&RiskCategory::Violence], vec!["zombie"]);
        // One token: 0.05 score, no multiplicity
        assert_eq!(pre.risk_score, 0.05);
        assert!(!pre.high_risk);
    }

    #[test]
    fn risk_breakdown_uses_stated_formula() {
        let pre = prevalidate(
            "create an image of a nude erotic nazi terrorist",
            DEFAULT_RISK_THRESHOLD,
        );

        // sexual: nude, erotic (2 tokens); hate: nazi, terrorist (2 tokens)
        assert_eq!(pre.risk_breakdown["sexual"], 0.1);
        assert_eq!(pre.risk_breakdown["hate"], 0.1);
        assert_eq!(pre.risk_score, 0.2);
        assert!(pre.high_risk); // multiplicity in both categories
    }

    #[test]
    fn score_meets_threshold_without_multiplicity() {
        // One token in each of four categories: 4 * 0.05 = 0.2; below the
        // default threshold but above a stricter one.
        let pre = prevalidate(
            "generate an image of a zombie, a fetish, a nazi and a suicide note",
            0.2,
        );

        assert!(pre.high_risk);
    }

    #[test]
    fn payload_carries_detected_tokens_and_score() {
        let message = "generate an image of blood and gore";
        let pre = prevalidate(message, DEFAULT_RISK_THRESHOLD);
        let payload = pre.blocked_payload(message);

        assert_eq!(payload.source, BlockSource::PreValidation);
        assert_eq!(payload.original_prompt.as_deref(), Some(message));
        assert_eq!(payload.blocked_categories, vec!["violence".to_string()]);
        assert_eq!(payload.token_summary["violence"].count, 2);
        assert_eq!(
            payload.suggestions,
            vec!["Violence: reduce graphic or gory terms".to_string()]
        );
        assert_eq!(payload.risk_score, Some(pre.risk_score));
        assert!(payload.message.contains("Detected: violence(blood, gore)"));
    }

    #[test]
    fn excerpt_is_capped_at_240_chars() {
        let long = format!("generate an image of blood gore {}", "x".repeat(400));
        let pre = prevalidate(&long, DEFAULT_RISK_THRESHOLD);
        let payload = pre.blocked_payload(&long);

        assert_eq!(payload.original_prompt.unwrap().chars().count(), 240);
    }
}
