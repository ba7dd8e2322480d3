use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::extractors::Validate;

pub const MAX_TEXT_CHARS: usize = 10_000;
pub const MAX_QUICK_TEXT_CHARS: usize = 5_000;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextStyle {
    Casual,
    Professional,
    Academic,
    #[default]
    Conversational,
    Technical,
    Creative,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextLength {
    #[default]
    Preserve,
    Expand,
    Condense,
}

impl TextStyle {
    pub const ALL: [TextStyle; 6] = [
        TextStyle::Casual,
        TextStyle::Professional,
        TextStyle::Academic,
        TextStyle::Conversational,
        TextStyle::Technical,
        TextStyle::Creative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextStyle::Casual => "CASUAL",
            TextStyle::Professional => "PROFESSIONAL",
            TextStyle::Academic => "ACADEMIC",
            TextStyle::Conversational => "CONVERSATIONAL",
            TextStyle::Technical => "TECHNICAL",
            TextStyle::Creative => "CREATIVE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextStyle::Casual => "Casual",
            TextStyle::Professional => "Professional",
            TextStyle::Academic => "Academic",
            TextStyle::Conversational => "Conversational",
            TextStyle::Technical => "Technical",
            TextStyle::Creative => "Creative",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TextStyle::Casual => "Conversational and relaxed tone",
            TextStyle::Professional => "Business-appropriate tone",
            TextStyle::Academic => "Scholarly and formal tone",
            TextStyle::Conversational => "Direct and engaging tone",
            TextStyle::Technical => "Precise and informative tone",
            TextStyle::Creative => "Imaginative and expressive tone",
        }
    }
}

impl TextLength {
    pub const ALL: [TextLength; 3] = [TextLength::Preserve, TextLength::Expand, TextLength::Condense];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextLength::Preserve => "PRESERVE",
            TextLength::Expand => "EXPAND",
            TextLength::Condense => "CONDENSE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextLength::Preserve => "Preserve",
            TextLength::Expand => "Expand",
            TextLength::Condense => "Condense",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TextLength::Preserve => "Keep similar length",
            TextLength::Expand => "Add more detail and examples",
            TextLength::Condense => "Make more concise",
        }
    }
}

impl Display for TextStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for TextLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HumanizeRequest {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
    #[serde(default)]
    pub length: TextLength,
    #[serde(default = "preserve_technical_terms_default")]
    pub preserve_technical_terms: bool,
    #[serde(default)]
    pub target_audience: Option<String>,
}

fn preserve_technical_terms_default() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct QuickHumanizeRequest {
    pub text: String,
    #[serde(default = "quick_style_default")]
    pub style: TextStyle,
}

fn quick_style_default() -> TextStyle {
    TextStyle::Casual
}

impl Validate for HumanizeRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        validate_text(&self.text, MAX_TEXT_CHARS)
    }
}

impl Validate for QuickHumanizeRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        validate_text(&self.text, MAX_QUICK_TEXT_CHARS)
    }
}

fn validate_text(text: &str, max_chars: usize) -> Result<(), Vec<FieldError>> {
    let chars = text.chars().count();
    if chars == 0 {
        return Err(vec![FieldError::new("text", "Text is required")]);
    }
    if chars > max_chars {
        return Err(vec![FieldError::new(
            "text",
            format!(
                "Text must be at most {} characters, got {}",
                max_chars, chars
            ),
        )]);
    }
    Ok(())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

/// Everything `/humanize/styles` advertises, generated from the same enums requests deserialize into.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StyleCatalog {
    pub styles: Vec<CatalogEntry>,
    pub length_options: Vec<CatalogEntry>,
}

impl StyleCatalog {
    pub fn new() -> Self {
        let styles = TextStyle::ALL
            .iter()
            .map(|style| CatalogEntry {
                value: style.as_str(),
                label: style.label(),
                description: style.description(),
            })
            .collect();
        let length_options = TextLength::ALL
            .iter()
            .map(|length| CatalogEntry {
                value: length.as_str(),
                label: length.label(),
                description: length.description(),
            })
            .collect();
        StyleCatalog {
            styles,
            length_options,
        }
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        StyleCatalog::new()
    }
}
