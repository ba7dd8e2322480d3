use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;
use url::Url;

use crate::provider::{ProviderKind, ProviderSettings};

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub(crate) address: String,

    /// The port the listener binds to
    #[default(25566)]
    #[arg(short, long, env)]
    pub(crate) port: u16,

    /// OTLP collector endpoint, traces and metrics are exported when set
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) otlp_endpoint: String,

    /// Keep logging to the console while exporting to OTLP
    #[default(false)]
    #[arg(long, env)]
    pub(crate) console: bool,

    /// PEM certificate, HTTPS is served when both this and the key file are set
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_cert_file: String,

    /// PEM private key matching the certificate
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_key_file: String,

    /// Comma separated list of origins allowed by CORS
    #[default("http://localhost:8080,http://localhost:3000".to_string())]
    #[arg(long, env)]
    pub(crate) cors_origins: String,

    /// Timeout in seconds for a single non-streaming provider call
    #[default(30)]
    #[arg(long, env)]
    pub(crate) provider_timeout_secs: u64,

    /// Longest silence in seconds tolerated between streamed fragments
    #[default(30)]
    #[arg(long, env)]
    pub(crate) stream_idle_timeout_secs: u64,

    /// Provider serving /humanize/quick
    #[default(ProviderKind::Gemini)]
    #[arg(long, env, value_enum)]
    pub(crate) quick_provider: ProviderKind,

    #[default(String::new())]
    #[arg(long, env, hide_env_values = true)]
    pub(crate) google_api_key: String,

    #[default(String::new())]
    #[arg(long, env, hide_env_values = true)]
    pub(crate) openai_api_key: String,

    #[default(String::new())]
    #[arg(long, env, hide_env_values = true)]
    pub(crate) anthropic_api_key: String,

    #[default("https://generativelanguage.googleapis.com".to_string())]
    #[arg(long, env)]
    pub(crate) gemini_base_url: String,

    #[default("https://api.openai.com".to_string())]
    #[arg(long, env)]
    pub(crate) openai_base_url: String,

    #[default("https://api.anthropic.com".to_string())]
    #[arg(long, env)]
    pub(crate) anthropic_base_url: String,

    /// Gemini model for structured humanization
    #[default("gemini-2.5-flash-lite".to_string())]
    #[arg(long, env)]
    pub(crate) gemini_model: String,

    /// Gemini model for streaming and quick requests
    #[default("gemini-2.0-flash-lite".to_string())]
    #[arg(long, env)]
    pub(crate) gemini_fast_model: String,

    #[default("gpt-4o".to_string())]
    #[arg(long, env)]
    pub(crate) openai_model: String,

    #[default("claude-3-5-sonnet-20241022".to_string())]
    #[arg(long, env)]
    pub(crate) anthropic_model: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<<Config as ClapSerde>::Opt> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }

    pub fn gemini_settings(&self) -> Result<ProviderSettings> {
        self.provider_settings(
            ProviderKind::Gemini,
            &self.gemini_base_url,
            &self.google_api_key,
            &self.gemini_model,
        )
    }

    pub fn openai_settings(&self) -> Result<ProviderSettings> {
        self.provider_settings(
            ProviderKind::OpenAi,
            &self.openai_base_url,
            &self.openai_api_key,
            &self.openai_model,
        )
    }

    pub fn anthropic_settings(&self) -> Result<ProviderSettings> {
        self.provider_settings(
            ProviderKind::Anthropic,
            &self.anthropic_base_url,
            &self.anthropic_api_key,
            &self.anthropic_model,
        )
    }

    fn provider_settings(
        &self,
        kind: ProviderKind,
        base_url: &str,
        api_key: &str,
        model: &str,
    ) -> Result<ProviderSettings> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid {} base URL {}", kind, base_url))?;
        Ok(ProviderSettings {
            base_url,
            api_key: non_empty(api_key),
            model: model.to_string(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
        })
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        Some(self.otlp_endpoint.trim()).filter(|endpoint| !endpoint.is_empty())
    }

    pub fn cors_origins(&self) -> Result<Vec<HeaderValue>> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("Invalid CORS origin {}", origin))
            })
            .collect()
    }

    /// Certificate and key paths, present only when both are configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (non_empty(&self.tls_cert_file), non_empty(&self.tls_key_file)) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        }
    }

    /// Defaults with every provider pointed at `base_url` and given a key.
    #[cfg(test)]
    pub(crate) fn for_mock(base_url: &str) -> Self {
        Config {
            google_api_key: "test-google-key".into(),
            openai_api_key: "test-openai-key".into(),
            anthropic_api_key: "test-anthropic-key".into(),
            gemini_base_url: base_url.into(),
            openai_base_url: base_url.into(),
            anthropic_base_url: base_url.into(),
            provider_timeout_secs: 5,
            stream_idle_timeout_secs: 5,
            ..Config::default()
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults_match_public_endpoints() {
        let config = Config::default();

        assert_eq!(config.port, 25566);
        assert_eq!(config.quick_provider, ProviderKind::Gemini);
        assert_eq!(config.otlp_endpoint(), None);
        assert_eq!(config.tls_paths(), None);
        assert_eq!(config.cors_origins().unwrap().len(), 2);

        let gemini = config.gemini_settings().unwrap();
        assert_eq!(gemini.model, "gemini-2.5-flash-lite");
        assert_eq!(gemini.api_key, None);
        assert_eq!(gemini.timeout, Duration::from_secs(30));
    }

    #[test]
    fn file_values_are_overridden_by_flags() {
        let file: <Config as ClapSerde>::Opt = toml::from_str(
            r#"
            port = 8080
            openai_api_key = "sk-file"
            quick_provider = "anthropic"
            "#,
        )
        .unwrap();
        let from_file = Config::from(file);
        assert_eq!(from_file.port, 8080);
        assert_eq!(
            from_file.openai_settings().unwrap().api_key.as_deref(),
            Some("sk-file")
        );

        let args = crate::Args::parse_from(["humanize_relay", "--port", "9090"]);
        let config = from_file.merge(args.opt_config);

        assert_eq!(config.port, 9090);
        assert_eq!(config.quick_provider, ProviderKind::Anthropic);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = Config {
            anthropic_base_url: "not a url".into(),
            ..Config::default()
        };
        let err = config.anthropic_settings().unwrap_err();
        assert_eq!(err.to_string(), "Invalid Anthropic base URL not a url");
    }

    #[test]
    fn tls_requires_both_files() {
        let config = Config {
            tls_cert_file: "cert.pem".into(),
            ..Config::default()
        };
        assert_eq!(config.tls_paths(), None);

        let config = Config {
            tls_key_file: "key.pem".into(),
            ..config
        };
        assert_eq!(
            config.tls_paths(),
            Some((PathBuf::from("cert.pem"), PathBuf::from("key.pem")))
        );
    }
}
