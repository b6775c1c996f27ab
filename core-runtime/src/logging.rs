//! # Logging & Tracing Infrastructure
//!
//! Installs the global `tracing` subscriber for the evidence core:
//! - JSON, pretty and compact output formats
//! - Per-crate filtering, with `RUST_LOG` honoured unless disabled
//! - Forwarding to a host [`LoggerSink`]
//! - Redaction helpers for request headers and precise coordinates
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::logging::{BufferedLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! let diagnostics = Arc::new(BufferedLogger::new(LogLevel::Warn, 200));
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Json)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(diagnostics.clone()),
//! )?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Error, Result};

/// Crates that receive the configured level.
const WORKSPACE_TARGETS: &[&str] = &[
    "evidence_queue",
    "core_runtime",
    "core_watermark",
    "core_queue",
    "core_sync",
    "core_service",
    "bridge_desktop",
];

/// Chatty dependencies held at `warn`.
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls", "sqlx"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full filter directive; replaces the per-crate defaults
    pub filter: Option<String>,
    /// Read `RUST_LOG` when no explicit filter is set
    pub use_env_filter: bool,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span enter/exit and attach span context to JSON events
    pub enable_spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            use_env_filter: true,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_env_filter(mut self, enabled: bool) -> Self {
        self.use_env_filter = enabled;
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the filter does not parse.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(LoggerSinkLayer::new(config.logger_sink.clone()));

    registry
        .with(fmt_layer(&config))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.display_target)
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(false)
            .with_target(config.display_target)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(config.display_target)
            .with_writer(io::stdout)
            .boxed(),
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Some(custom) = &config.filter {
        return EnvFilter::try_new(custom)
            .map_err(|e| Error::Logging(format!("invalid filter '{}': {}", custom, e)));
    }

    if config.use_env_filter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }

    let level = config.level.as_str();
    let directives = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Logging(format!("invalid filter: {}", e)))
}

/// Converts events into [`LogEntry`] values for the host sink.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = visitor.fields;
        entry.span = ctx.lookup_current().map(|span| span.name().to_string());

        let sink = Arc::clone(sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl EntryVisitor {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Header value safe to log.
///
/// Credentials in static headers (`Authorization`, API keys, cookies) are
/// replaced; other values pass through.
pub fn redact_header(name: &str, value: &str) -> String {
    const SENSITIVE: &[&str] = &[
        "authorization",
        "token",
        "secret",
        "password",
        "api-key",
        "api_key",
        "cookie",
    ];

    let lower = name.to_ascii_lowercase();
    if SENSITIVE.iter().any(|marker| lower.contains(marker)) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

/// Round a `"lat,lon"` label to two decimals (roughly 1 km) for logs.
///
/// Labels that don't parse as two numbers are replaced entirely.
pub fn coarse_coordinates(label: &str) -> String {
    let mut parts = label.split(',').map(|p| p.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(lat)), Some(Ok(lon)), None) => format!("{:.2},{:.2}", lat, lon),
        _ => REDACTED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::logging::BufferedLogger;

    fn no_env() -> LoggingConfig {
        LoggingConfig::default().with_env_filter(false)
    }

    #[test]
    fn test_default_filter_covers_workspace() {
        let filter = build_filter(&no_env().with_level(LogLevel::Debug))
            .unwrap()
            .to_string();
        assert!(filter.contains("core_sync=debug"));
        assert!(filter.contains("core_queue=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = no_env()
            .with_level(LogLevel::Error)
            .with_filter("core_queue=trace");
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_queue=trace"));
        assert!(!filter.contains("core_sync"));
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = no_env().with_filter("core_queue=loud");
        assert!(matches!(build_filter(&config), Err(Error::Logging(_))));
    }

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "Bearer abc"), REDACTED);
        assert_eq!(redact_header("X-Api-Key", "k"), REDACTED);
        assert_eq!(redact_header("Idempotency-Key", "f00d"), "f00d");
        assert_eq!(redact_header("X-Device", "tablet-4"), "tablet-4");
    }

    #[test]
    fn test_coarse_coordinates() {
        assert_eq!(coarse_coordinates("-6.812345,107.143210"), "-6.81,107.14");
        assert_eq!(coarse_coordinates(" 1.5 , 2.25 "), "1.50,2.25");
        assert_eq!(coarse_coordinates("somewhere"), REDACTED);
        assert_eq!(coarse_coordinates("1,2,3"), REDACTED);
    }

    #[test]
    fn test_sink_layer_forwards_fields_and_span() {
        let sink = Arc::new(BufferedLogger::new(LogLevel::Debug, 16));
        let layer = LoggerSinkLayer::new(Some(sink.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = tracing::info_span!("run_round");
        span.in_scope(|| {
            tracing::warn!(
                target: "core_sync",
                upload_id = "u-1",
                http_status = 503u64,
                "Upload failed"
            );
            tracing::trace!(target: "core_sync", "below sink level");
        });

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_sync");
        assert_eq!(entry.message, "Upload failed");
        assert_eq!(entry.field("upload_id"), Some("u-1"));
        assert_eq!(entry.field("http_status"), Some("503"));
        assert_eq!(entry.span.as_deref(), Some("run_round"));
    }
}
