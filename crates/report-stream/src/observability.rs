use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "report-stream.logs.jsonl";

/// Where and how much the subscriber logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// Filter directive; `None` defers to `RUST_LOG`, then `warn`.
    pub filter: Option<String>,
    /// JSONL output file. Without one, logs go to stderr in compact form so
    /// stdout stays free for the rendered report.
    pub json_path: Option<PathBuf>,
}

impl LogSettings {
    /// Reads `REPORT_STREAM_OBSERVABILITY[_ENABLED]`, `REPORT_STREAM_LOG_LEVEL`
    /// and `REPORT_STREAM_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = [
            "REPORT_STREAM_OBSERVABILITY_ENABLED",
            "REPORT_STREAM_OBSERVABILITY",
        ]
        .iter()
        .find_map(|key| lookup(*key))
        .map(|raw| parse_bool(&raw).unwrap_or(true))
        .unwrap_or(true);
        Self {
            enabled,
            filter: lookup("REPORT_STREAM_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_path: lookup("REPORT_STREAM_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(directive) = self.filter.as_deref()
            && let Ok(filter) = EnvFilter::try_new(directive)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the process-wide tracing subscriber from the environment. Only
/// the first call has any effect.
pub fn init_observability() {
    init_observability_with(LogSettings::from_env());
}

pub fn init_observability_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match settings.json_path.as_deref() {
            Some(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let _ = std::fs::create_dir_all(dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
