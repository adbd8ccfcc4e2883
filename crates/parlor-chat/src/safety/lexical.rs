//! Lexical risk heuristic over prompt text.
//!
//! Inherently approximate; used when the provider blocks a request without
//! reporting per-category results, and to enrich the guidance shown to the
//! user. The token lists and the context-exclusion rule are product-tuned;
//! behavior is preserved exactly as enumerated rather than generalized.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use parlor_types::TokenCategorySummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskCategory {
    Violence,
    Sexual,
    Hate,
    SelfHarm,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Violence,
        RiskCategory::Sexual,
        RiskCategory::Hate,
        RiskCategory::SelfHarm,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Violence => "violence",
            Self::Sexual => "sexual",
            Self::Hate => "hate",
            Self::SelfHarm => "self_harm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Violence => "Violence",
            Self::Sexual => "Sexual",
            Self::Hate => "Hate / Harassment",
            Self::SelfHarm => "Self-harm",
        }
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Violence => "Reduce or remove explicit violence / weapon / gore terms; describe neutral actions or high-level context.",
            Self::Sexual => "Remove sexual descriptors; focus on neutral appearance, pose, or context.",
            Self::Hate => "Remove hateful / extremist / dehumanizing language; use neutral, inclusive wording.",
            Self::SelfHarm => "Remove self-harm references; reframe toward supportive, positive, or recovery-oriented themes.",
        }
    }

    pub fn safe_replacements(self) -> &'static [&'static str] {
        match self {
            Self::Violence => &[
                "training",
                "practice",
                "peaceful scene",
                "historic setting",
                "strategic board game",
            ],
            Self::Sexual => &[
                "professional attire",
                "neutral clothing",
                "artistic style",
                "portrait style",
            ],
            Self::Hate => &["group", "people", "community", "team", "audience"],
            Self::SelfHarm => &[
                "support",
                "help",
                "well-being",
                "encouragement",
                "resilience",
            ],
        }
    }
}

const VIOLENCE_TOKENS: &[&str] = &[
    "battle", "battles", "fight", "fighting", "blood", "bloody", "gore", "gory", "weapon",
    "weapons", "gun", "guns", "rifle", "pistol", "knife", "sword", "war", "warfare", "dead body",
    "corpse", "death", "kill", "killing", "attack", "attacking", "destroy", "destruction",
    "combat", "wound", "wounded", "injury", "injuries", "beaten", "shoot", "shooting",
    "explosion", "explosive", "grenade", "burn", "burning",
];

const SEXUAL_TOKENS: &[&str] = &[
    "nude", "nudity", "naked", "sexual", "sexually", "erotic", "adult", "explicit",
    "provocative", "seductive", "intimate", "sensual", "lingerie", "fetish", "bedroom", "kiss",
    "kissing", "cleavage", "underwear", "topless", "bottomless",
];

const HATE_TOKENS: &[&str] = &[
    "hate", "hating", "nazi", "terrorist", "terrorism", "supremacist", "racist", "racism",
    "discrimination", "slur", "bigot", "ethnic cleansing", "genocide", "kill them", "wipe out",
];

const SELF_HARM_TOKENS: &[&str] = &[
    "suicide", "suicidal", "self-harm", "self harm", "cutting", "overdose", "depression",
    "self-injury", "self injury", "self-mutilation", "self mutilation", "harm myself",
    "end my life", "kill myself",
];

/// Phrases indicating conceptual/non-sexual usage; suppress the `explicit`
/// token when one appears near the match.
const SEXUAL_CONTEXT_EXCLUSIONS: &[&str] = &[
    "post-apocalyptic",
    "scene",
    "environment",
    "atmosphere",
    "stylized",
    "comic book",
    "emphasizing mood",
];

/// High-intensity adjectives flagged when no direct violence token matched.
const INTENSITY_TOKENS: &[&str] = &["severe", "extreme", "brutal", "aggressive", "bloody", "horrific"];

const CONTEXT_WINDOW_RADIUS: usize = 60;

#[derive(Debug, Clone)]
pub struct MatchInfo {
    pub token: String,
    pub index: usize,
}

/// Per-category token matches for one piece of text.
#[derive(Debug, Clone, Default)]
pub struct CategoryHits {
    hits: BTreeMap<RiskCategory, Vec<MatchInfo>>,
}

impl CategoryHits {
    pub fn push(&mut self, category: RiskCategory, info: MatchInfo) {
        self.hits.entry(category).or_default().push(info);
    }

    pub fn matches(&self, category: RiskCategory) -> &[MatchInfo] {
        self.hits.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn any(&self) -> bool {
        self.hits.values().any(|v| !v.is_empty())
    }

    /// (token, count) pairs sorted by frequency, first-seen order on ties.
    pub fn token_counts(&self, category: RiskCategory) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for info in self.matches(category) {
            match counts.iter_mut().find(|(token, _)| token == &info.token) {
                Some((_, count)) => *count += 1,
                None => counts.push((info.token.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Unique tokens in first-seen order, capped at `limit`.
    pub fn unique_tokens(&self, category: RiskCategory, limit: usize) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for info in self.matches(category) {
            if !tokens.contains(&info.token) {
                tokens.push(info.token.clone());
                if tokens.len() == limit {
                    break;
                }
            }
        }
        tokens
    }

    /// Payload form: total match count plus up to five sample tokens per
    /// category with at least one hit.
    pub fn token_summary(&self) -> BTreeMap<String, TokenCategorySummary> {
        let mut summary = BTreeMap::new();
        for category in RiskCategory::ALL {
            let matches = self.matches(category);
            if !matches.is_empty() {
                summary.insert(
                    category.key().to_string(),
                    TokenCategorySummary {
                        count: matches.len(),
                        samples: self.unique_tokens(category, 5),
                    },
                );
            }
        }
        summary
    }
}

/// Pluggable classification strategy so the word lists and exclusion rules
/// can evolve without touching orchestration logic.
pub trait RiskClassifier: Send + Sync {
    fn classify(&self, text: &str) -> CategoryHits;
}

struct TokenPattern {
    regex: Regex,
    canonical: String,
}

struct CategoryRules {
    category: RiskCategory,
    patterns: Vec<TokenPattern>,
    context_exclusions: Vec<Regex>,
}

/// Word-boundary token matcher over the category lists above.
pub struct LexicalClassifier {
    rules: Vec<CategoryRules>,
}

fn word_pattern(token: &str) -> Regex {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(token)))
        .case_insensitive(true)
        .build()
        .expect("static token pattern")
}

fn phrase_pattern(phrase: &str) -> Regex {
    RegexBuilder::new(&regex::escape(phrase))
        .case_insensitive(true)
        .build()
        .expect("static phrase pattern")
}

impl Default for LexicalClassifier {
    fn default() -> Self {
        let build = |category: RiskCategory, tokens: &[&str], exclusions: &[&str]| CategoryRules {
            category,
            patterns: tokens
                .iter()
                .map(|token| TokenPattern {
                    regex: word_pattern(token),
                    canonical: token.to_string(),
                })
                .collect(),
            context_exclusions: exclusions.iter().map(|p| phrase_pattern(p)).collect(),
        };

        Self {
            rules: vec![
                build(RiskCategory::Violence, VIOLENCE_TOKENS, &[]),
                build(RiskCategory::Sexual, SEXUAL_TOKENS, SEXUAL_CONTEXT_EXCLUSIONS),
                build(RiskCategory::Hate, HATE_TOKENS, &[]),
                build(RiskCategory::SelfHarm, SELF_HARM_TOKENS, &[]),
            ],
        }
    }
}

impl LexicalClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RiskClassifier for LexicalClassifier {
    fn classify(&self, text: &str) -> CategoryHits {
        let mut hits = CategoryHits::default();

        for rule in &self.rules {
            for pattern in &rule.patterns {
                for found in pattern.regex.find_iter(text) {
                    // The exclusion only fires for 'explicit' in the sexual
                    // category; a window around the match is checked for
                    // atmospheric phrasing.
                    if rule.category == RiskCategory::Sexual
                        && pattern.canonical == "explicit"
                        && !rule.context_exclusions.is_empty()
                    {
                        let window = context_window(text, found.start(), found.len());
                        if rule.context_exclusions.iter().any(|rx| rx.is_match(window)) {
                            continue;
                        }
                    }

                    hits.push(
                        rule.category,
                        MatchInfo {
                            token: pattern.canonical.clone(),
                            index: found.start(),
                        },
                    );
                }
            }
        }

        hits
    }
}

fn context_window(text: &str, start: usize, token_len: usize) -> &str {
    let mut lo = start.saturating_sub(CONTEXT_WINDOW_RADIUS);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (start + token_len + CONTEXT_WINDOW_RADIUS).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

/// Intensity terms present in the prompt (substring match, lowercased).
pub fn intensity_hits(prompt: &str) -> Vec<&'static str> {
    let lower = prompt.to_lowercase();
    INTENSITY_TOKENS
        .iter()
        .copied()
        .filter(|token| lower.contains(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battle_reenactment_hits_violence_but_not_sexual() {
        let classifier = LexicalClassifier::new();
        let hits = classifier
            .classify("a peaceful image of a battle reenactment at a historic festival");

        let violence_tokens: Vec<&str> = hits
            .matches(RiskCategory::Violence)
            .iter()
            .map(|m| m.token.as_str())
            .collect();
        assert!(violence_tokens.contains(&"battle"));
        assert!(hits.matches(RiskCategory::Sexual).is_empty());
    }

    #[test]
    fn explicit_is_suppressed_in_atmospheric_context() {
        let classifier = LexicalClassifier::new();
        let hits = classifier
            .classify("explicit post-apocalyptic wasteland scene, stylized comic book style");

        let sexual_tokens: Vec<&str> = hits
            .matches(RiskCategory::Sexual)
            .iter()
            .map(|m| m.token.as_str())
            .collect();
        assert!(!sexual_tokens.contains(&"explicit"));
    }

    #[test]
    fn explicit_counts_without_excluding_context() {
        let classifier = LexicalClassifier::new();
        let hits = classifier.classify("an explicit photograph of a couple");

        let sexual_tokens: Vec<&str> = hits
            .matches(RiskCategory::Sexual)
            .iter()
            .map(|m| m.token.as_str())
            .collect();
        assert!(sexual_tokens.contains(&"explicit"));
    }

    #[test]
    fn word_boundaries_reject_substrings() {
        let classifier = LexicalClassifier::new();
        let hits = classifier.classify("explicitly warlike skillful");

        // 'explicitly' is not 'explicit', 'warlike' is not 'war',
        // 'skillful' is not 'kill'
        assert!(hits.matches(RiskCategory::Sexual).is_empty());
        assert!(hits.matches(RiskCategory::Violence).is_empty());
    }

    #[test]
    fn multi_word_tokens_match_across_spaces() {
        let classifier = LexicalClassifier::new();
        let hits = classifier.classify("a dead body on the street");

        let tokens: Vec<&str> = hits
            .matches(RiskCategory::Violence)
            .iter()
            .map(|m| m.token.as_str())
            .collect();
        assert!(tokens.contains(&"dead body"));
    }

    #[test]
    fn token_counts_sort_by_frequency() {
        let classifier = LexicalClassifier::new();
        let hits = classifier.classify("blood and gore, more blood, blood everywhere");

        let counts = hits.token_counts(RiskCategory::Violence);
        assert_eq!(counts[0], ("blood".to_string(), 3));
        assert_eq!(counts[1], ("gore".to_string(), 1));
    }

    #[test]
    fn token_summary_caps_samples_at_five() {
        let classifier = LexicalClassifier::new();
        let hits =
            classifier.classify("gun rifle pistol knife sword grenade explosion");

        let summary = hits.token_summary();
        let violence = &summary["violence"];
        assert_eq!(violence.count, 7);
        assert_eq!(violence.samples.len(), 5);
    }

    #[test]
    fn intensity_terms_detected_by_substring() {
        let found = intensity_hits("a Brutal and horrific landscape");
        assert_eq!(found, vec!["brutal", "horrific"]);
    }
}
