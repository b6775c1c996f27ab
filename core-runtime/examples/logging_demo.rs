//! Shows what a sync pass looks like in each log format.
//!
//! ```bash
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "core_sync=trace"
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::logging::{BufferedLogger, LogLevel};
use core_runtime::logging::{
    coarse_coordinates, init_logging, redact_header, LogFormat, LoggingConfig,
};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

#[tokio::main]
async fn main() -> core_runtime::Result<()> {
    let args: Vec<String> = env::args().collect();
    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let diagnostics = Arc::new(BufferedLogger::new(LogLevel::Warn, 32));
    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug)
        .with_logger_sink(diagnostics.clone());
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }
    init_logging(config)?;

    info!(
        header = "Authorization",
        value = %redact_header("Authorization", "Bearer 9f2c..."),
        "Static header configured"
    );
    info!(
        coordinates = %coarse_coordinates("-6.812345,107.143210"),
        "Capture enqueued"
    );

    run_pass(3)
        .instrument(info_span!("sync_pass", pass_id = "demo"))
        .await;

    // Let the sink tasks drain
    tokio::time::sleep(Duration::from_millis(20)).await;
    for entry in diagnostics.snapshot() {
        println!("diagnostics: [{}] {}", entry.level.as_str(), entry.message);
    }
    Ok(())
}

#[instrument]
async fn run_pass(items: u32) {
    for index in 0..items {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if index == 1 {
            warn!(upload_id = index, http_status = 503u64, "Upload failed, will retry");
        } else {
            debug!(upload_id = index, "Upload delivered");
        }
    }
    info!(attempted = items, "Pass completed");
}
