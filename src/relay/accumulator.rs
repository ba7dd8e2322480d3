use lazy_static::lazy_static;
use regex::Regex;

use crate::humanize::request::HumanizeRequest;
use crate::humanize::result::{clamp_confidence, HumanizedDraft, PartialHumanizedResult};
use crate::provider::StreamFormat;

/// Reported for plain text streams, which carry no confidence of their own.
const PLAIN_TEXT_CONFIDENCE: f64 = 0.8;
const PLAIN_TEXT_CHANGE: &str = "Streamlined for real-time generation";

lazy_static! {
    // The closing quote is optional so a string still being streamed is matched too.
    static ref HUMANIZED_TEXT: Regex =
        Regex::new(r#""humanized_text"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap();
}

/// Collects one provider's streamed fragments and renders the full text seen so far.
///
/// Owned by a single in-flight stream, a fresh one is created for every provider attempt.
pub(crate) struct StreamAccumulator {
    format: StreamFormat,
    request: HumanizeRequest,
    buffer: String,
    last: Option<PartialHumanizedResult>,
}

impl StreamAccumulator {
    pub(crate) fn new(format: StreamFormat, request: &HumanizeRequest) -> Self {
        StreamAccumulator {
            format,
            request: request.clone(),
            buffer: String::new(),
            last: None,
        }
    }

    /// Append a fragment. Returns a partial result when the visible output changed.
    pub(crate) fn push(&mut self, fragment: &str) -> Option<PartialHumanizedResult> {
        self.buffer.push_str(fragment);
        let partial = match self.format {
            StreamFormat::PlainText => self.plain_partial(),
            StreamFormat::Json => self.json_partial(),
        }?;

        if self.last.as_ref() == Some(&partial) {
            return None;
        }
        self.last = Some(partial.clone());
        Some(partial)
    }

    /// Whether any partial result has been produced yet.
    pub(crate) fn has_output(&self) -> bool {
        self.last.is_some()
    }

    fn plain_partial(&self) -> Option<PartialHumanizedResult> {
        let text = self.buffer.trim_start();
        if text.is_empty() {
            return None;
        }
        Some(self.partial(
            text.to_string(),
            Some(PLAIN_TEXT_CONFIDENCE),
            Some(vec![PLAIN_TEXT_CHANGE.to_string()]),
        ))
    }

    fn json_partial(&self) -> Option<PartialHumanizedResult> {
        // A parseable buffer always wins over the regex guess.
        if let Ok(draft) = HumanizedDraft::parse(&self.buffer) {
            return Some(self.partial(
                draft.humanized_text,
                Some(clamp_confidence(draft.confidence_score)),
                Some(draft.changes_made),
            ));
        }
        extract_humanized_text(&self.buffer)
            .filter(|text| !text.is_empty())
            .map(|text| self.partial(text, None, None))
    }

    fn partial(
        &self,
        humanized_text: String,
        confidence_score: Option<f64>,
        changes_made: Option<Vec<String>>,
    ) -> PartialHumanizedResult {
        PartialHumanizedResult {
            original_text: self.request.text.clone(),
            humanized_text,
            style_applied: self.request.style,
            length_change: self.request.length,
            confidence_score,
            changes_made,
        }
    }
}

/// Best-effort pull of the `humanized_text` string out of incomplete JSON.
pub(crate) fn extract_humanized_text(buffer: &str) -> Option<String> {
    HUMANIZED_TEXT
        .captures(buffer)
        .and_then(|captures| captures.get(1))
        .map(|raw| unescape_partial(raw.as_str()))
}

/// Decode JSON string escapes, stopping quietly at an escape cut off by the end of the buffer.
fn unescape_partial(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let Some(high) = read_hex4(&mut chars) else {
                    break;
                };
                if (0xD800..0xDC00).contains(&high) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        break;
                    }
                    let Some(low) = read_hex4(&mut chars) else {
                        break;
                    };
                    let decoded = if (0xDC00..0xE000).contains(&low) {
                        char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
                    } else {
                        None
                    };
                    out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
                } else {
                    out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

fn read_hex4(chars: &mut impl Iterator<Item = char>) -> Option<u32> {
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}
