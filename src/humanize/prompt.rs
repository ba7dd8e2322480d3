use crate::humanize::request::{HumanizeRequest, QuickHumanizeRequest, TextLength, TextStyle};

/// Appended for providers that cannot be constrained to a JSON schema.
pub const JSON_ONLY_INSTRUCTIONS: &str = r#"You must respond with valid JSON only, no other text. Use this exact schema:
{
  "original_text": "string",
  "humanized_text": "string",
  "style_applied": "string",
  "length_change": "string",
  "confidence_score": number,
  "changes_made": ["string"]
}"#;

const STYLE_GUIDE: &str = r#"## Style Guide Rules:
- Use title case for headlines and sentence case for everything else
- Refer to companies as "it" and to teams or people within them as "they"
- Delete filler such as "actually," "very," or "just" and cut adverbs where possible
- Do not open sentences with "This," "We have," or "We get"; say directly what is happening
- Avoid cliches, jargon, slashes, and emojis
- Use "more than" and "fewer than" for quantities, and "earlier" or "later" instead of "above" or "below"
- Prefer the active voice
- Spell out numbers one through nine and use numerals for 10 and greater; numbers over three digits take a comma
- Percentages use numerals with the word "percent"; use a dollar sign for money
- Use the Oxford comma and place periods and commas inside quotation marks
- Hyphenate compound adjectives unless the adverb ends in "-ly"
- Use italics for emphasis, never bold or underline
- Do not capitalize job titles; use a full name on first mention and the last name afterwards"#;

/// Both renditions of one request's instructions. Built once, then each provider picks the one
/// matching how it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Asks for the full JSON humanization result.
    pub structured: String,
    /// Asks for the rewritten text only.
    pub plain: String,
}

impl Prompt {
    pub fn for_request(request: &HumanizeRequest) -> Self {
        Prompt {
            structured: structured_prompt(request),
            plain: plain_prompt(request),
        }
    }
}

pub(crate) fn style_guidance(style: TextStyle) -> &'static str {
    match style {
        TextStyle::Casual => "Use conversational tone, contractions, and informal language. Include relatable examples and analogies. Make it feel like a friendly conversation.",
        TextStyle::Professional => "Maintain professional tone while being approachable. Use clear, direct language. Include relevant examples and insights.",
        TextStyle::Academic => "Use scholarly tone with precise language. Include proper transitions and logical flow. Maintain formality while being accessible.",
        TextStyle::Conversational => "Write as if speaking directly to the reader. Use questions and direct address (\"you\", \"your\"). Include natural speech patterns and rhythm.",
        TextStyle::Technical => "Maintain technical accuracy while improving readability. Add explanations for complex concepts. Use clear, logical structure.",
        TextStyle::Creative => "Use engaging language and creative expressions. Include metaphors, analogies, and vivid descriptions. Make it memorable and interesting.",
    }
}

pub(crate) fn length_guidance(length: TextLength) -> &'static str {
    match length {
        TextLength::Preserve => "Keep similar length to original",
        TextLength::Expand => "Add detail, examples, and elaboration (20-50% longer)",
        TextLength::Condense => "Remove redundancy while keeping key points (20-30% shorter)",
    }
}

fn requirements(request: &HumanizeRequest) -> String {
    let mut requirements = format!(
        "- Style: {}\n- Length: {}\n- Preserve technical terms: {}\n",
        request.style, request.length, request.preserve_technical_terms
    );
    if let Some(audience) = request.target_audience.as_deref().filter(|a| !a.trim().is_empty()) {
        requirements.push_str(&format!("- Target audience: {}\n", audience));
    }
    requirements
}

fn goals(request: &HumanizeRequest) -> String {
    let mut goals = String::from(
        "1. Make the text sound natural and human-like\n\
         2. Vary sentence structure and length\n\
         3. Add appropriate transitions and connective phrases\n\
         4. Include subtle personality and warmth\n\
         5. Maintain factual accuracy\n",
    );
    if request.preserve_technical_terms {
        goals.push_str("6. Keep technical terms unchanged but explain them naturally if needed\n");
    }
    goals
}

fn structured_prompt(request: &HumanizeRequest) -> String {
    format!(
        "You are an expert editor and text humanizer. Take AI-generated or robotic text and make it \
         sound more human, natural, and engaging while applying the style guide below.\n\n\
         ## Input Text:\n{text}\n\n\
         ## Humanization Requirements:\n{requirements}\n\
         {style_guide}\n\n\
         ## Style-Specific Guidelines:\n{style}\n\n\
         ## Length Guidelines:\n{length}\n\n\
         ## Additional Humanization Goals:\n{goals}\n\
         Please humanize the text according to all guidelines above. Provide:\n\
         - original_text: The original input text\n\
         - humanized_text: Your humanized version\n\
         - style_applied: The style that was applied ({style_value})\n\
         - length_change: The length change applied ({length_value})\n\
         - confidence_score: Your confidence in the humanization (0-1 scale)\n\
         - changes_made: List of specific changes you made",
        text = request.text,
        requirements = requirements(request),
        style_guide = STYLE_GUIDE,
        style = style_guidance(request.style),
        length = length_guidance(request.length),
        goals = goals(request),
        style_value = request.style,
        length_value = request.length,
    )
}

fn plain_prompt(request: &HumanizeRequest) -> String {
    format!(
        "Humanize this text with {style_value} style:\n\n{text}\n\n\
         Style guidance: {style}\n\
         Length guidance: {length}\n\
         {audience}\
         Rewrite it to sound more natural and human-like. Return only the humanized text, no JSON.",
        style_value = request.style,
        text = request.text,
        style = style_guidance(request.style),
        length = length_guidance(request.length),
        audience = request
            .target_audience
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(|a| format!("Target audience: {}\n", a))
            .unwrap_or_default(),
    )
}

pub fn quick_prompt(request: &QuickHumanizeRequest) -> String {
    format!(
        "Quickly humanize this text to sound more natural and engaging:\n\n\
         Text: {}\n\
         Style: {}\n\n\
         Make it sound human while preserving the meaning. Return only the humanized text, no JSON.",
        request.text, request.style
    )
}
