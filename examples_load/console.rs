use std::sync::Arc;
use tracing::{info, info_span, warn};

use structured_log_formatter::init::init_json_logging_with_options;
use structured_log_formatter::options::FormatterOptions;
use structured_log_formatter::sink::WriterSink;

fn main() {
    let options = FormatterOptions::from_env().unwrap_or_else(|e| {
        eprintln!("ignoring invalid log format environment: {}", e);
        FormatterOptions {
            include_scopes: true,
            ..Default::default()
        }
    });
    init_json_logging_with_options(Arc::new(WriterSink::stdout()), options);

    info!("starting service");

    let span = info_span!("request", request_id = "8f2c", user_id = 42);
    let _guard = span.enter();

    warn!(event_id = 1001, event_name = "slow_query", elapsed_ms = 1250.5, "query took too long");

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "upstream refused connection");
    tracing::error!(error = &err as &(dyn std::error::Error + 'static), retry = false, "request failed");
}
