//! Server-sent event framing for upstream provider responses.
//!
//! Bytes are buffered until a full line is available, so chunk boundaries may fall anywhere,
//! including inside a multi-byte character. Each event's `data:` lines are joined and handed
//! out as one payload; comments and the other SSE fields are dropped.

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};

struct SseReader {
    input: BoxStream<'static, Result<Bytes>>,
    buffer: Vec<u8>,
    data: Vec<String>,
    input_done: bool,
    failed: bool,
}

/// Turn a response body into the `data:` payloads of its events.
pub(crate) fn data_payloads<S, E>(body: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    let reader = SseReader {
        input: body.map_err(Into::into).boxed(),
        buffer: Vec::new(),
        data: Vec::new(),
        input_done: false,
        failed: false,
    };

    stream::unfold(reader, |mut reader| async move {
        reader.next_payload().await.map(|item| (item, reader))
    })
    .boxed()
}

impl SseReader {
    async fn next_payload(&mut self) -> Option<Result<String>> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                match self.take_line(&line) {
                    Ok(Some(payload)) => return Some(Ok(payload)),
                    Ok(None) => continue,
                    Err(err) => return Some(Err(self.fail(err))),
                }
            }

            if self.input_done {
                if !self.buffer.is_empty() {
                    let line = std::mem::take(&mut self.buffer);
                    if let Err(err) = self.take_line(&line) {
                        return Some(Err(self.fail(err)));
                    }
                }
                return self.flush().map(Ok);
            }

            match self.input.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Some(Err(self.fail(err))),
                None => self.input_done = true,
            }
        }
    }

    fn take_line(&mut self, raw: &[u8]) -> Result<Option<String>> {
        let line = std::str::from_utf8(raw).context("Event stream line is not valid UTF-8")?;
        let line = line.trim_end_matches(|c| c == '\n' || c == '\r');

        if line.is_empty() {
            return Ok(self.flush());
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        Ok(None)
    }

    fn flush(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data).join("\n"))
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> anyhow::Error {
        self.failed = true;
        err
    }
}
