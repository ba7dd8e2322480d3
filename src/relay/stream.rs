use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::HUMANIZE_FAILED;
use crate::humanize::prompt::Prompt;
use crate::humanize::request::HumanizeRequest;
use crate::humanize::result::PartialHumanizedResult;
use crate::provider::{Fragment, FragmentStream, Provider};
use crate::relay::accumulator::StreamAccumulator;

/// One event of a client-facing stream. Every stream is `Started`, any number of `Partial`s and
/// exactly one of `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Started,
    Partial(PartialHumanizedResult),
    Completed,
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed | StreamEvent::Failed(_))
    }

    /// The JSON carried on the event's `data:` line.
    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Started => json!({ "started": true }),
            StreamEvent::Partial(partial) => json!({
                "success": true,
                "partial": true,
                "data": partial,
            }),
            StreamEvent::Completed => json!({ "success": true, "completed": true }),
            StreamEvent::Failed(message) => json!({
                "success": false,
                "error": HUMANIZE_FAILED,
                "message": message,
            }),
        }
    }
}

enum Phase {
    Start,
    Connect(usize),
    Streaming {
        index: usize,
        fragments: FragmentStream,
        accumulator: StreamAccumulator,
    },
    Finished,
}

/// Per-request streaming state machine. It owns the active upstream stream, so dropping the
/// relay (the client went away) closes the upstream connection as well.
pub(crate) struct StreamRelay {
    chain: Vec<Arc<dyn Provider>>,
    request: HumanizeRequest,
    prompt: Prompt,
    idle_timeout: Duration,
    phase: Phase,
    last_error: Option<anyhow::Error>,
    terminated: bool,
}

impl StreamRelay {
    pub(crate) fn new(
        chain: Vec<Arc<dyn Provider>>,
        request: HumanizeRequest,
        idle_timeout: Duration,
    ) -> Self {
        let prompt = Prompt::for_request(&request);
        StreamRelay {
            chain,
            request,
            prompt,
            idle_timeout,
            phase: Phase::Start,
            last_error: None,
            terminated: false,
        }
    }

    pub(crate) async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.advance().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.terminated = true;
        }
        event
    }

    async fn advance(&mut self) -> Option<StreamEvent> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Start => {
                    self.phase = Phase::Connect(0);
                    return Some(StreamEvent::Started);
                }
                Phase::Connect(index) => {
                    let Some(provider) = self.chain.get(index).cloned() else {
                        return Some(self.exhausted());
                    };
                    let opened = timeout(self.idle_timeout, provider.stream(&self.prompt)).await;
                    match opened {
                        Ok(Ok(fragments)) => {
                            debug!(provider = %provider.kind(), "Upstream stream opened");
                            self.phase = Phase::Streaming {
                                index,
                                fragments,
                                accumulator: StreamAccumulator::new(
                                    provider.stream_format(),
                                    &self.request,
                                ),
                            };
                        }
                        Ok(Err(err)) => self.fall_through(index, err),
                        Err(_) => self.fall_through(
                            index,
                            anyhow!(
                                "{} stream did not open within {:?}",
                                provider.kind(),
                                self.idle_timeout
                            ),
                        ),
                    }
                }
                Phase::Streaming {
                    index,
                    mut fragments,
                    mut accumulator,
                } => {
                    let next = timeout(self.idle_timeout, fragments.next()).await;
                    match next {
                        Ok(Some(Ok(Fragment::Delta(text)))) => {
                            let partial = accumulator.push(&text);
                            self.phase = Phase::Streaming {
                                index,
                                fragments,
                                accumulator,
                            };
                            if let Some(partial) = partial {
                                return Some(StreamEvent::Partial(partial));
                            }
                        }
                        Ok(Some(Ok(Fragment::End))) if !accumulator.has_output() => {
                            let kind = self.chain[index].kind();
                            self.fall_through(
                                index,
                                anyhow!("{} stream completed without any humanized text", kind),
                            )
                        }
                        Ok(Some(Ok(Fragment::End))) => {
                            info!(provider = %self.chain[index].kind(), "Stream completed");
                            return Some(StreamEvent::Completed);
                        }
                        Ok(Some(Err(err))) => self.fall_through(index, err),
                        Ok(None) => {
                            let kind = self.chain[index].kind();
                            self.fall_through(index, anyhow!("{} stream ended before completion", kind))
                        }
                        Err(_) => {
                            let kind = self.chain[index].kind();
                            self.fall_through(
                                index,
                                anyhow!("{} stream was idle for more than {:?}", kind, self.idle_timeout),
                            )
                        }
                    }
                }
                Phase::Finished => return None,
            }
        }
    }

    fn fall_through(&mut self, index: usize, err: anyhow::Error) {
        let kind = self.chain[index].kind();
        match self.chain.get(index + 1) {
            Some(next) => warn!(
                provider = %kind,
                next = %next.kind(),
                error = %format!("{:#}", err),
                monotonic_counter.provider_fallbacks = 1_u64,
                "{} streaming failed, trying {} fallback",
                kind,
                next.kind()
            ),
            None => warn!(provider = %kind, error = %format!("{:#}", err), "{} streaming failed", kind),
        }
        self.last_error = Some(err);
        self.phase = Phase::Connect(index + 1);
    }

    fn exhausted(&mut self) -> StreamEvent {
        let message = match self.last_error.take() {
            Some(err) => format!("{:#}", err),
            None => "No providers configured".to_string(),
        };
        StreamEvent::Failed(message)
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if !self.terminated {
            debug!("Stream dropped before a terminal event, upstream released");
        }
    }
}
