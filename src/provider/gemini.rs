//! Google Gemini `generateContent` adapter.
//!
//! The key travels in the `x-goog-api-key` header rather than the `?key=` query parameter so it
//! never shows up in logged URLs. Structured answers use `responseSchema`; streaming uses
//! `streamGenerateContent?alt=sse` with the plain prompt, since partial JSON is of no use there.

use anyhow::{Context, Result};
use axum::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tracing::warn;

use crate::humanize::prompt::Prompt;
use crate::humanize::result::{HumanizedDraft, HumanizedResult};
use crate::provider::{
    parse_draft, send_checked, sse, text_at, Fragment, FragmentStream, Provider, ProviderKind,
    ProviderSettings, StreamFormat, MAX_OUTPUT_TOKENS, MAX_QUICK_OUTPUT_TOKENS, TEMPERATURE,
};

const KIND: ProviderKind = ProviderKind::Gemini;
const CONTENT_POINTER: &str = "/candidates/0/content/parts/0/text";

pub struct GeminiProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
    /// Lighter model used for streaming and plain completions.
    fast_model: String,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, settings: ProviderSettings, fast_model: String) -> Self {
        GeminiProvider {
            http,
            settings,
            fast_model,
        }
    }

    fn request(&self, model: &str, method: &str, body: &Value) -> Result<reqwest::RequestBuilder> {
        let key = self.settings.api_key(KIND)?;
        let url = self
            .settings
            .endpoint(&format!("v1beta/models/{}:{}", model, method));
        Ok(self
            .http
            .post(url)
            .header("x-goog-api-key", key)
            .json(body))
    }
}

fn contents(prompt: &str) -> Value {
    json!([{ "parts": [{ "text": prompt }] }])
}

/// Decode one `streamGenerateContent` event.
pub(crate) fn decode_event(data: &str) -> Result<Vec<Fragment>> {
    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "Failed to parse Gemini streaming chunk");
            return Ok(Vec::new());
        }
    };

    let mut fragments = Vec::new();
    if let Some(text) = event.pointer(CONTENT_POINTER).and_then(|t| t.as_str()) {
        if !text.is_empty() {
            fragments.push(Fragment::Delta(text.to_string()));
        }
    }
    if event
        .pointer("/candidates/0/finishReason")
        .and_then(|r| r.as_str())
        .is_some()
    {
        fragments.push(Fragment::End);
    }
    Ok(fragments)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "gemini"))]
    async fn humanize(&self, prompt: &Prompt) -> Result<HumanizedDraft> {
        let body = json!({
            "contents": contents(&prompt.structured),
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "responseMimeType": "application/json",
                "responseSchema": HumanizedResult::json_schema(),
            },
        });
        let request = self
            .request(&self.settings.model, "generateContent", &body)?
            .timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let content = text_at(KIND, response, CONTENT_POINTER).await?;
        parse_draft(KIND, &content)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "gemini"))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": contents(prompt),
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_QUICK_OUTPUT_TOKENS,
            },
        });
        let request = self
            .request(&self.fast_model, "generateContent", &body)?
            .timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let text = text_at(KIND, response, CONTENT_POINTER).await?;
        Ok(text.trim().to_string())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "gemini"))]
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let body = json!({
            "contents": contents(&prompt.plain),
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });
        let request = self
            .request(&self.fast_model, "streamGenerateContent", &body)?
            .query(&[("alt", "sse")]);
        let response = send_checked(KIND, request)
            .await
            .context("Gemini streaming request failed")?;

        Ok(sse::data_payloads(response.bytes_stream())
            .and_then(|data| async move { decode_event(&data) })
            .map_ok(|fragments| stream::iter(fragments.into_iter().map(Ok::<_, anyhow::Error>)))
            .try_flatten()
            .boxed())
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::PlainText
    }
}
