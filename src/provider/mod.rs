use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::async_trait;
use clap::ValueEnum;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::humanize::prompt::Prompt;
use crate::humanize::result::HumanizedDraft;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub(crate) mod sse;

pub(crate) const TEMPERATURE: f64 = 0.3;
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 2000;
pub(crate) const MAX_QUICK_OUTPUT_TOKENS: u32 = 1000;

#[derive(
    PartialEq, Eq, Deserialize, Serialize, Clone, Copy, Debug, Default, ValueEnum, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "Gemini"),
            ProviderKind::OpenAi => write!(f, "OpenAI"),
            ProviderKind::Anthropic => write!(f, "Anthropic"),
        }
    }
}

/// How a provider's streamed fragments are to be read once concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// The fragments are the rewritten text itself.
    PlainText,
    /// The fragments build up a JSON humanization result.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Delta(String),
    /// The provider's own end-of-stream signal.
    End,
}

pub type FragmentStream = BoxStream<'static, Result<Fragment>>;

/// One upstream LLM API, adapted to the relay's request and response shapes.
///
/// Every method is a single attempt: implementations never retry on their own, fallback is the
/// relay's job.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn is_configured(&self) -> bool;

    /// Request the full structured humanization result.
    async fn humanize(&self, prompt: &Prompt) -> Result<HumanizedDraft>;

    /// Plain text completion for a ready-made prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Open a streaming humanization. The returned stream owns the upstream response, dropping it
    /// closes the connection.
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream>;

    fn stream_format(&self) -> StreamFormat;
}

/// Connection details shared by every provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub(crate) fn api_key(&self, kind: ProviderKind) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} API key is not configured", kind))
    }

    /// Resolve `path` below the base URL, keeping any path prefix the base URL carries.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }
}

/// The fixed priority order of the fallback chain.
pub fn chain(config: &Config, http: &reqwest::Client) -> Result<Vec<Arc<dyn Provider>>> {
    let gemini: Arc<dyn Provider> = Arc::new(gemini::GeminiProvider::new(
        http.clone(),
        config.gemini_settings()?,
        config.gemini_fast_model.clone(),
    ));
    let openai: Arc<dyn Provider> = Arc::new(openai::OpenAiProvider::new(
        http.clone(),
        config.openai_settings()?,
    ));
    let anthropic: Arc<dyn Provider> = Arc::new(anthropic::AnthropicProvider::new(
        http.clone(),
        config.anthropic_settings()?,
    ));
    Ok(vec![gemini, openai, anthropic])
}

pub(crate) async fn send_checked(
    kind: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", kind))?;
    let status = response.status();
    if !status.is_success() {
        bail!("{} API error: {}", kind, status);
    }
    Ok(response)
}

/// Read a JSON response body and pull the string at `pointer` out of it.
pub(crate) async fn text_at(
    kind: ProviderKind,
    response: reqwest::Response,
    pointer: &str,
) -> Result<String> {
    let body: serde_json::Value = response
        .json()
        .await
        .with_context(|| format!("Invalid JSON response from {} API", kind))?;
    match body.pointer(pointer).and_then(|text| text.as_str()) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => bail!("No content returned from {} API", kind),
    }
}

pub(crate) fn parse_draft(kind: ProviderKind, content: &str) -> Result<HumanizedDraft> {
    HumanizedDraft::parse(content).with_context(|| format!("Invalid JSON response from {} API", kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base: &str) -> ProviderSettings {
        ProviderSettings {
            base_url: Url::parse(base).unwrap(),
            api_key: None,
            model: "model".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn endpoint_keeps_base_path() {
        assert_eq!(
            settings("https://proxy.example/llm/").endpoint("/v1/messages").as_str(),
            "https://proxy.example/llm/v1/messages"
        );
        assert_eq!(
            settings("http://127.0.0.1:1234")
                .endpoint("v1beta/models/m:generateContent")
                .as_str(),
            "http://127.0.0.1:1234/v1beta/models/m:generateContent"
        );
    }

    #[test]
    fn missing_key_names_provider() {
        let err = settings("http://localhost").api_key(ProviderKind::OpenAi).unwrap_err();
        assert_eq!(err.to_string(), "OpenAI API key is not configured");
    }
}
