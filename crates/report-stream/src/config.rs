use std::time::Duration;

use crate::errors::ReportError;
use crate::playback::PacingConfig;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/api/query/stream";
pub const DEFAULT_HTTP_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SESSION_HEADER: &str = "X-Session-Id";
pub const DEFAULT_SEGMENT_MAX_CHARS: usize = 540;

/// Configuration shared by every session a client starts.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Streaming channel endpoint.
    pub ws_url: String,
    /// Base URL of the blocking API; the fallback posts to `{base}/api/query`.
    pub http_base_url: String,
    /// Header carrying the session id on both paths.
    pub session_header: String,
    pub pacing: PacingConfig,
    /// Longest content block shown as one display event.
    pub segment_max_chars: usize,
    pub connect_timeout: Duration,
    /// Silence on an open channel longer than this counts as a transport failure.
    pub idle_timeout: Option<Duration>,
    pub fallback_timeout: Duration,
    /// Whether to show a notice when switching to the blocking request.
    pub fallback_notice: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            http_base_url: DEFAULT_HTTP_BASE_URL.to_string(),
            session_header: DEFAULT_SESSION_HEADER.to_string(),
            pacing: PacingConfig::default(),
            segment_max_chars: DEFAULT_SEGMENT_MAX_CHARS,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: None,
            fallback_timeout: Duration::from_secs(180),
            fallback_notice: true,
        }
    }
}

impl PipelineConfig {
    /// Builds a config from `REPORT_STREAM_*` environment variables, keeping
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ReportError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("REPORT_STREAM_WS_URL") {
            config.ws_url = url.trim().to_string();
        }
        if let Some(url) = get("REPORT_STREAM_HTTP_URL") {
            config.http_base_url = url.trim().to_string();
        }
        if let Some(header) = get("REPORT_STREAM_SESSION_HEADER") {
            config.session_header = header.trim().to_string();
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_CHAR_INTERVAL_MS", get)? {
            config.pacing.char_interval = ms;
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_LABEL_FLASH_MS", get)? {
            config.pacing.label_flash = ms;
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_EVENT_PAUSE_MS", get)? {
            config.pacing.inter_event_pause = ms;
        }
        if let Some(raw) = get("REPORT_STREAM_SEGMENT_MAX_CHARS") {
            config.segment_max_chars = raw.trim().parse().map_err(|e| {
                ReportError::config(format!("invalid REPORT_STREAM_SEGMENT_MAX_CHARS: {e}"))
            })?;
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_CONNECT_TIMEOUT_MS", get)? {
            config.connect_timeout = ms;
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_IDLE_TIMEOUT_MS", get)? {
            config.idle_timeout = Some(ms);
        }
        if let Some(ms) = parse_millis("REPORT_STREAM_FALLBACK_TIMEOUT_MS", get)? {
            config.fallback_timeout = ms;
        }
        if let Some(raw) = get("REPORT_STREAM_FALLBACK_NOTICE") {
            config.fallback_notice = parse_bool(&raw).ok_or_else(|| {
                ReportError::config(format!("invalid REPORT_STREAM_FALLBACK_NOTICE: {raw}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn http_base_url(mut self, url: impl Into<String>) -> Self {
        self.http_base_url = url.into();
        self
    }

    pub fn session_header(mut self, header: impl Into<String>) -> Self {
        self.session_header = header.into();
        self
    }

    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn segment_max_chars(mut self, max_chars: usize) -> Self {
        self.segment_max_chars = max_chars;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn fallback_notice(mut self, enabled: bool) -> Self {
        self.fallback_notice = enabled;
        self
    }

    pub(crate) fn query_url(&self) -> String {
        format!("{}/api/query", self.http_base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if self.ws_url.trim().is_empty() {
            return Err(ReportError::config("ws_url must not be empty"));
        }
        if self.http_base_url.trim().is_empty() {
            return Err(ReportError::config("http_base_url must not be empty"));
        }
        if self.session_header.trim().is_empty() {
            return Err(ReportError::config("session_header must not be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ReportError::config(
                "connect_timeout must be greater than 0",
            ));
        }
        if self.pacing.char_interval.is_zero() {
            return Err(ReportError::config(
                "pacing.char_interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_millis(
    key: &str,
    get: impl Fn(&str) -> Option<String>,
) -> Result<Option<Duration>, ReportError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ReportError::config(format!("invalid {key}: {e}"))),
        None => Ok(None),
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<PipelineConfig, ReportError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]).expect("config");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.segment_max_chars, 540);
        assert_eq!(config.query_url(), "http://127.0.0.1:8000/api/query");
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = from_pairs(&[
            ("REPORT_STREAM_HTTP_URL", "https://reports.example/"),
            ("REPORT_STREAM_CHAR_INTERVAL_MS", "5"),
            ("REPORT_STREAM_IDLE_TIMEOUT_MS", "30000"),
            ("REPORT_STREAM_SEGMENT_MAX_CHARS", "200"),
            ("REPORT_STREAM_FALLBACK_NOTICE", "off"),
        ])
        .expect("config");
        assert_eq!(config.query_url(), "https://reports.example/api/query");
        assert_eq!(config.pacing.char_interval, Duration::from_millis(5));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.segment_max_chars, 200);
        assert!(!config.fallback_notice);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = from_pairs(&[("REPORT_STREAM_EVENT_PAUSE_MS", "soon")]).expect_err("invalid");
        assert!(matches!(err, ReportError::Config(msg) if msg.contains("EVENT_PAUSE")));
    }

    #[test]
    fn zero_char_interval_is_rejected() {
        let err = from_pairs(&[("REPORT_STREAM_CHAR_INTERVAL_MS", "0")]).expect_err("zero");
        assert!(matches!(err, ReportError::Config(_)));
    }
}
