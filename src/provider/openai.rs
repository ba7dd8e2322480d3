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

const KIND: ProviderKind = ProviderKind::OpenAi;
const DONE_SIGNAL: &str = "[DONE]";

pub struct OpenAiProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, settings: ProviderSettings) -> Self {
        OpenAiProvider { http, settings }
    }

    fn request(&self, body: &Value) -> Result<reqwest::RequestBuilder> {
        let key = self.settings.api_key(KIND)?;
        Ok(self
            .http
            .post(self.settings.endpoint("v1/chat/completions"))
            .bearer_auth(key)
            .json(body))
    }

    fn structured_body(&self, prompt: &str, stream: bool) -> Value {
        let mut schema = HumanizedResult::json_schema();
        schema["additionalProperties"] = json!(false);
        json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "stream": stream,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "humanized_text",
                    "strict": true,
                    "schema": schema,
                },
            },
        })
    }
}

/// Decode one chat completion chunk. `[DONE]` is the end signal.
pub(crate) fn decode_event(data: &str) -> Result<Vec<Fragment>> {
    if data.trim() == DONE_SIGNAL {
        return Ok(vec![Fragment::End]);
    }
    let chunk: Value = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(err) => {
            warn!(error = %err, "Failed to parse OpenAI streaming chunk");
            return Ok(Vec::new());
        }
    };
    Ok(chunk
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| vec![Fragment::Delta(c.to_string())])
        .unwrap_or_default())
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "openai"))]
    async fn humanize(&self, prompt: &Prompt) -> Result<HumanizedDraft> {
        let request = self
            .request(&self.structured_body(&prompt.structured, false))?
            .timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let content = text_at(KIND, response, "/choices/0/message/content").await?;
        parse_draft(KIND, &content)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "openai"))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": MAX_QUICK_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
        });
        let request = self.request(&body)?.timeout(self.settings.timeout);
        let response = send_checked(KIND, request).await?;
        let text = text_at(KIND, response, "/choices/0/message/content").await?;
        Ok(text.trim().to_string())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "openai"))]
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let request = self
            .request(&self.structured_body(&prompt.structured, true))?
            .header("accept", "text/event-stream");
        let response = send_checked(KIND, request)
            .await
            .context("OpenAI streaming request failed")?;

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
