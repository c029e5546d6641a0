//! Tracing setup for structured logging.
//!
//! Logs always go to stderr: stdout carries the rendered invoice.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Filter directives used when `RUST_LOG` is unset (e.g. "warn",
    /// "worker=debug")
    pub filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
    /// Log span open/close events
    pub span_events: bool,
    /// Print thread names (producer vs enrichment workers)
    pub thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            json: false,
            span_events: false,
            thread_names: true,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    pub fn with_thread_names(mut self, thread_names: bool) -> Self {
        self.thread_names = thread_names;
        self
    }

    /// Reads `LOG_JSON` (`1` or `true`). `debug` lowers the default filter
    /// from `warn` to `debug`.
    pub fn from_env(debug: bool) -> Self {
        let json = std::env::var("LOG_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self::new()
            .with_filter(if debug { "debug" } else { "warn" })
            .with_json(json)
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which happens
/// when tests initialize tracing more than once.
pub fn init_tracing(config: TracingConfig) -> bool {
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events.clone())
            .with_thread_names(config.thread_names)
            .with_file(true)
            .with_line_number(true)
    });

    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_thread_names(config.thread_names)
    });

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    installed
}

/// Initialize tracing from environment variables.
pub fn init_tracing_from_env(debug: bool) -> bool {
    init_tracing(TracingConfig::from_env(debug))
}
