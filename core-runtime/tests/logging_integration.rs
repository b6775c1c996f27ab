//! Integration tests for logging setup

use std::sync::Arc;

use bridge_traits::logging::{BufferedLogger, LogLevel};
use core_runtime::logging::{coarse_coordinates, redact_header, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.use_env_filter);
    assert!(config.logger_sink.is_none());
    assert!(config.enable_spans);
}

#[test]
fn test_config_chaining() {
    let sink = Arc::new(BufferedLogger::new(LogLevel::Warn, 50));
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_filter("core_sync=trace")
        .with_env_filter(false)
        .with_logger_sink(sink)
        .with_spans(false)
        .with_target(false);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert_eq!(config.filter.as_deref(), Some("core_sync=trace"));
    assert!(!config.use_env_filter);
    assert!(config.logger_sink.is_some());
    assert!(!config.enable_spans);
    assert!(!config.display_target);
}

#[test]
fn test_static_header_redaction() {
    assert_eq!(redact_header("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_header("x-session-token", "abc"), "[REDACTED]");
    assert_eq!(redact_header("Cookie", "session=1"), "[REDACTED]");
    assert_eq!(redact_header("X-Client-Version", "4.2.0"), "4.2.0");
}

#[test]
fn test_coordinates_are_coarsened() {
    assert_eq!(coarse_coordinates("-6.81,107.14"), "-6.81,107.14");
    assert_eq!(coarse_coordinates("51.507351,-0.127758"), "51.51,-0.13");
    assert_eq!(coarse_coordinates(""), "[REDACTED]");
}
