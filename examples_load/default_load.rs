use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info_span};

use structured_log_formatter::init::init_json_logging;
use structured_log_formatter::noop_sink::NoopSink;

fn main() {
    let sink = Arc::new(NoopSink::default());
    let options = init_json_logging(sink);

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default options: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Same run with scopes on and pretty-printing, to see what they cost.
    options
        .update(|o| {
            o.include_scopes = true;
            o.indented = true;
        })
        .expect("valid options");

    let span = info_span!("request", request_id = "r-1", attempt = 1);
    let _guard = span.enter();

    let start = Instant::now();
    for i in 0..n {
        error!(iteration = i, "scoped load test error");
    }

    let elapsed = start.elapsed();
    println!("scoped + indented: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
