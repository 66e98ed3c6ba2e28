use std::time::Duration;

use reqwest::Url;

use crate::core::config::data::Config;
use crate::core::config::io::ConfigError;
use crate::core::connection::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
use crate::core::session::SessionConfig;
use crate::core::submission::{SubmissionTiming, DEFAULT_DEBOUNCE, DEFAULT_FALLBACK};
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Overrides `base_url` from the config file.
pub const BASE_URL_ENV: &str = "MANUSCRIPT_SYNC_BASE_URL";

impl Config {
    /// Service address in precedence order: `cli_override`, then
    /// [`BASE_URL_ENV`], then the config file, then [`DEFAULT_BASE_URL`].
    pub fn resolve_base_url(&self, cli_override: Option<&str>) -> Result<String, ConfigError> {
        let from_env = std::env::var(BASE_URL_ENV).ok();
        self.resolve_base_url_with(cli_override, from_env.as_deref())
    }

    pub(crate) fn resolve_base_url_with(
        &self,
        cli_override: Option<&str>,
        from_env: Option<&str>,
    ) -> Result<String, ConfigError> {
        let candidate = [cli_override, from_env, self.base_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);
        validate_base_url(candidate)
    }

    pub fn submission_timing(&self) -> SubmissionTiming {
        SubmissionTiming {
            debounce: self
                .debounce_ms
                .map_or(DEFAULT_DEBOUNCE, Duration::from_millis),
            fallback: self
                .fallback_ms
                .map_or(DEFAULT_FALLBACK, Duration::from_millis),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let delay = self
            .reconnect_ms
            .map_or(DEFAULT_RECONNECT_DELAY, Duration::from_millis);
        ReconnectPolicy::fixed(delay).with_max_attempts(self.max_reconnect_attempts)
    }

    pub fn session_config(&self, base_url: String) -> SessionConfig {
        SessionConfig {
            base_url,
            timing: self.submission_timing(),
            reconnect: self.reconnect_policy(),
        }
    }
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let normalized = normalize_base_url(raw);
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.has_host() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(normalized)
}
