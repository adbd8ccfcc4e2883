use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where in the pipeline an image request was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    PreValidation,
    ApiContentFilter,
    ModelRefusal,
}

impl BlockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreValidation => "pre_validation",
            Self::ApiContentFilter => "api_content_filter",
            Self::ModelRefusal => "model_refusal",
        }
    }
}

/// Per-category token-hit summary attached to a blocked-image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCategorySummary {
    pub count: usize,
    pub samples: Vec<String>,
}

/// Unified payload for the `imageBlocked` SSE event, regardless of whether
/// the block came from pre-validation, the provider content filter, or a
/// detected model refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlockedPayload {
    pub source: BlockSource,

    /// Human readable guidance, may be markdown.
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,

    /// e.g. `["violence:high"]` when the provider reported severities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_categories: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token_summary: BTreeMap<String, TokenCategorySummary>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    /// Aggregated lexical risk heuristic, 0-1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,

    /// Per-category normalized weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_breakdown: Option<BTreeMap<String, f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_allowed: Option<bool>,

    pub guidance_version: u32,
    pub schema_version: u32,
}

pub const GUIDANCE_VERSION: u32 = 2;
pub const SCHEMA_VERSION: u32 = 1;

impl ImageBlockedPayload {
    pub fn new(source: BlockSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            original_prompt: None,
            request_id: None,
            block_id: None,
            prompt_hash: None,
            blocked_categories: Vec::new(),
            token_summary: BTreeMap::new(),
            suggestions: Vec::new(),
            risk_score: None,
            risk_breakdown: None,
            retry_allowed: None,
            guidance_version: GUIDANCE_VERSION,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Derive `risk_score`/`risk_breakdown` from `token_summary` when the
    /// upstream payload omitted them. Score is the total hit count
    /// normalized by 12 and capped at 1; each category contributes
    /// `min(count / 5, 1) * 0.25`.
    pub fn backfill_risk(&mut self) {
        if self.risk_score.is_some() || self.token_summary.is_empty() {
            return;
        }

        let total: usize = self.token_summary.values().map(|s| s.count).sum();
        self.risk_score = Some((total as f64 / 12.0).min(1.0));
        self.risk_breakdown = Some(
            self.token_summary
                .iter()
                .map(|(cat, s)| (cat.clone(), (s.count as f64 / 5.0).min(1.0) * 0.25))
                .collect(),
        );
    }
}
