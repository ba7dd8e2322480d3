use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::Stream;
use tracing::{info, warn};

use crate::config::Config;
use crate::humanize::prompt::{quick_prompt, Prompt};
use crate::humanize::request::{HumanizeRequest, QuickHumanizeRequest};
use crate::humanize::result::{HumanizedResult, QuickHumanizedResult};
use crate::provider::{self, Provider};

mod accumulator;
mod stream;

pub use stream::StreamEvent;
use stream::StreamRelay;

/// Routes humanization requests across the provider chain.
///
/// Holds no per-request state, one instance is shared by every handler.
pub struct Relay {
    chain: Vec<Arc<dyn Provider>>,
    quick: Arc<dyn Provider>,
    stream_idle_timeout: Duration,
}

impl Relay {
    pub fn from_config(config: &Config, http: &reqwest::Client) -> Result<Self> {
        let chain = provider::chain(config, http)?;
        let quick = chain
            .iter()
            .find(|p| p.kind() == config.quick_provider)
            .cloned()
            .with_context(|| format!("Quick provider {} is not available", config.quick_provider))?;
        Ok(Relay::new(
            chain,
            quick,
            Duration::from_secs(config.stream_idle_timeout_secs),
        ))
    }

    pub fn new(
        chain: Vec<Arc<dyn Provider>>,
        quick: Arc<dyn Provider>,
        stream_idle_timeout: Duration,
    ) -> Self {
        Relay {
            chain,
            quick,
            stream_idle_timeout,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.chain
    }

    /// Full humanization, tried on each provider in order until one succeeds.
    #[tracing::instrument(level = "info", skip_all, fields(style = %request.style, length = %request.length))]
    pub async fn humanize(&self, request: &HumanizeRequest) -> Result<HumanizedResult> {
        let prompt = Prompt::for_request(request);
        let mut last_error = None;

        for (index, provider) in self.chain.iter().enumerate() {
            match provider.humanize(&prompt).await {
                Ok(draft) => {
                    info!(provider = %provider.kind(), "Text humanized");
                    return Ok(HumanizedResult::from_draft(request, draft));
                }
                Err(err) => {
                    match self.chain.get(index + 1) {
                        Some(next) => warn!(
                            provider = %provider.kind(),
                            next = %next.kind(),
                            error = %format!("{:#}", err),
                            monotonic_counter.provider_fallbacks = 1_u64,
                            "{} failed, trying {} fallback",
                            provider.kind(),
                            next.kind()
                        ),
                        None => warn!(
                            provider = %provider.kind(),
                            error = %format!("{:#}", err),
                            "{} failed, no providers left",
                            provider.kind()
                        ),
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No providers configured")))
    }

    /// Fast plain-text rewrite on the quick provider. Never falls back.
    #[tracing::instrument(level = "info", skip_all, fields(provider = %self.quick.kind(), style = %request.style))]
    pub async fn quick(&self, request: &QuickHumanizeRequest) -> Result<QuickHumanizedResult> {
        let text = self.quick.complete(&quick_prompt(request)).await?;
        if text.is_empty() {
            bail!("No content returned from {} API", self.quick.kind());
        }
        Ok(QuickHumanizedResult::new(request, text))
    }

    /// Streaming humanization. The returned stream yields `Started`, then partial results and
    /// exactly one terminal event. Dropping it cancels the upstream request.
    pub fn stream(&self, request: HumanizeRequest) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let relay = StreamRelay::new(self.chain.clone(), request, self.stream_idle_timeout);
        futures::stream::unfold(relay, |mut relay| async move {
            let event = relay.next_event().await?;
            Some((event, relay))
        })
    }
}
