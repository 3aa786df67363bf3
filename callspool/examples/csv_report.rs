//! Records calls from a few worker threads into a CSV file.
//!
//! ```text
//! CALLSPOOL_LOG=callspool=debug cargo run --example csv_report -- calls.csv
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use callspool::sink::{CsvSink, JsonLinesSink};
use callspool::{Engine, Tracer, call_site};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn checksum(tracer: &Tracer, input: &str) -> Result<u32, String> {
    tracer.try_call_summarized(call_site!(), || {
        if input.is_empty() {
            return Err(String::from("empty input"));
        }
        Ok(input.bytes().map(u32::from).sum())
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .with_env_var("CALLSPOOL_LOG")
                    .from_env()?,
            )
            .with_writer(std::io::stderr)
            .compact()
            .finish(),
    )?;

    let output = std::env::args_os()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("callspool.csv"), PathBuf::from);

    let engine = Engine::builder()
        .max_queue_size(8)
        .flush_interval(Duration::from_millis(200))
        .sink(CsvSink::new(&output)?)
        .sink(JsonLinesSink::stdout())
        .build()?;

    thread::scope(|scope| {
        for worker in 0..3 {
            let tracer = engine.tracer(format!("worker-{worker}"));
            scope.spawn(move || {
                for input in ["alpha", "", "gamma", "delta"] {
                    let _ = checksum(&tracer, input);
                    thread::sleep(Duration::from_millis(50));
                }
            });
        }
    });

    engine.shutdown();
    tracing::info!(path = %output.display(), metadata = ?engine.metadata(), "report written");
    Ok(())
}
