use std::env;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use url::Url;

/// Container health probe: exits non-zero unless the relay reports itself healthy.
fn main() -> Result<()> {
    let Some(arg) = env::args().nth(1) else {
        bail!("Missing URL argument")
    };
    let url = Url::parse(&arg).with_context(|| format!("Invalid URL {}", arg))?;

    let response = reqwest::blocking::get(url).context("Health request failed")?;
    if !response.status().is_success() {
        bail!("Health check returned {}", response.status());
    }

    let body: Value = response.json().context("Health response is not JSON")?;
    match body.get("status").and_then(Value::as_str) {
        Some("healthy") => Ok(()),
        status => bail!("Service is not healthy: {}", status.unwrap_or("unknown")),
    }
}
