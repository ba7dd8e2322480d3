//! Anthropic Messages API adapter.
//!
//! There is no schema-constrained output here, so the structured prompt gets the JSON-only
//! appendix and the answer is parsed like any other provider's.

use anyhow::{anyhow, Context, Result};
use axum::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tracing::warn;

use crate::humanize::prompt::{Prompt, JSON_ONLY_INSTRUCTIONS};
use crate::humanize::result::HumanizedDraft;
use crate::provider::{
    parse_draft, send_checked, sse, text_at, Fragment, FragmentStream, Provider, ProviderKind,
    ProviderSettings, StreamFormat, MAX_OUTPUT_TOKENS, MAX_QUICK_OUTPUT_TOKENS, TEMPERATURE,
};

const KIND: ProviderKind = ProviderKind::Anthropic;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl AnthropicProvider {
    pub fn new(http: reqwest::Client, settings: ProviderSettings) -> Self {
        AnthropicProvider { http, settings }
    }

    fn request(&self, content: &str, max_tokens: u32, stream: bool) -> Result<reqwest::RequestBuilder> {
        let key = self.settings.api_key(KIND)?;
        let body = json!({
            "model": self.settings.model,
            "max_tokens": max_tokens,
            "temperature": TEMPERATURE,
            "stream": stream,
            "messages": [{ "role": "user", "content": content }],
        });
        Ok(self
            .http
            .post(self.settings.endpoint("v1/messages"))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body))
    }
}

fn json_only(prompt: &Prompt) -> String {
    format!("{}\n\n{}", prompt.structured, JSON_ONLY_INSTRUCTIONS)
}

/// Decode one Messages API stream event. `message_stop` is the end signal; an `error` event
/// fails the stream.
pub(crate) fn decode_event(data: &str) -> Result<Vec<Fragment>> {
    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "Failed to parse Anthropic streaming chunk");
            return Ok(Vec::new());
        }
    };

    match event.get("type").and_then(|t| t.as_str()).unwrap_or_default() {
        "content_block_delta" => Ok(event
            .pointer("/delta/text")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| vec![Fragment::Delta(t.to_string())])
            .unwrap_or_default()),
        "message_stop" => Ok(vec![Fragment::End]),
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            Err(anyhow!("Anthropic stream error: {}", message))
        }
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "anthropic"))]
    async fn humanize(&self, prompt: &Prompt) -> Result<HumanizedDraft> {
        let request = self
            .request(&json_only(prompt), MAX_OUTPUT_TOKENS, false)?
            .timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let content = text_at(KIND, response, "/content/0/text").await?;
        parse_draft(KIND, &content)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "anthropic"))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self
            .request(prompt, MAX_QUICK_OUTPUT_TOKENS, false)?
            .timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let text = text_at(KIND, response, "/content/0/text").await?;
        Ok(text.trim().to_string())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "anthropic"))]
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let request = self
            .request(&json_only(prompt), MAX_OUTPUT_TOKENS, true)?
            .header("accept", "text/event-stream");
        let response = send_checked(KIND, request)
            .await
            .context("Anthropic streaming request failed")?;

        Ok(sse::data_payloads(response.bytes_stream())
            .and_then(|data| async move { decode_event(&data) })
            .map_ok(|fragments| stream::iter(fragments.into_iter().map(Ok::<_, anyhow::Error>)))
            .try_flatten()
            .boxed())
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::Json
    }
}
