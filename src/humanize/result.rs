use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::humanize::request::{HumanizeRequest, QuickHumanizeRequest, TextLength, TextStyle};

/// Used when a provider omits its own confidence estimate.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HumanizedResult {
    pub original_text: String,
    pub humanized_text: String,
    pub style_applied: TextStyle,
    pub length_change: TextLength,
    pub confidence_score: f64,
    pub changes_made: Vec<String>,
}

/// The JSON object a provider answers with, before it is reconciled with the request.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HumanizedDraft {
    pub humanized_text: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub changes_made: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PartialHumanizedResult {
    pub original_text: String,
    pub humanized_text: String,
    pub style_applied: TextStyle,
    pub length_change: TextLength,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes_made: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QuickHumanizedResult {
    pub original_text: String,
    pub humanized_text: String,
    pub style_applied: TextStyle,
}

impl HumanizedDraft {
    pub fn parse(content: &str) -> Result<Self> {
        let draft: HumanizedDraft = serde_json::from_str(strip_code_fence(content))
            .context("Response is not a valid humanization result")?;
        if draft.humanized_text.trim().is_empty() {
            bail!("Response contains an empty humanized_text");
        }
        Ok(draft)
    }
}

impl HumanizedResult {
    pub fn from_draft(request: &HumanizeRequest, draft: HumanizedDraft) -> Self {
        HumanizedResult {
            original_text: request.text.clone(),
            humanized_text: draft.humanized_text,
            style_applied: request.style,
            length_change: request.length,
            confidence_score: clamp_confidence(draft.confidence_score),
            changes_made: draft.changes_made,
        }
    }

    /// JSON schema handed to providers that support structured output.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "original_text": { "type": "string" },
                "humanized_text": { "type": "string" },
                "style_applied": { "type": "string" },
                "length_change": { "type": "string" },
                "confidence_score": { "type": "number" },
                "changes_made": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": [
                "original_text",
                "humanized_text",
                "style_applied",
                "length_change",
                "confidence_score",
                "changes_made"
            ]
        })
    }
}

impl QuickHumanizedResult {
    pub fn new(request: &QuickHumanizeRequest, humanized_text: String) -> Self {
        QuickHumanizedResult {
            original_text: request.text.clone(),
            humanized_text,
            style_applied: request.style,
        }
    }
}

pub(crate) fn clamp_confidence(score: Option<f64>) -> f64 {
    match score {
        Some(score) if score.is_finite() => score.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}
