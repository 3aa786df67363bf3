//! # `callspool`
//!
//! Buffered telemetry for instrumented calls.
//!
//! Every wrapped call produces one [`Record`] (who called what, when, how long it took and how it
//! ended). Records are buffered in a bounded in-memory queue and delivered in batches to any number
//! of [`sink::Sink`]s, so the hot path never waits on file or network I/O.
//!
//! ## Features
//!
//! - **Wrapping**: [`Tracer`] methods and the [`traced`] attribute wrap closures and functions
//!   without changing what they return or raise
//! - **Bounded buffering**: a full queue triggers one synchronous flush instead of growing
//! - **Periodic flushing**: a background task flushes on a fixed interval until shutdown
//! - **Sink isolation**: a failing or panicking sink is logged and never affects the others
//! - **Sinks**: CSV files, JSON lines and an in-memory sink for tests
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use callspool::sink::JsonLinesSink;
//! use callspool::{Engine, call_site};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder()
//!     .max_queue_size(500)
//!     .flush_interval(Duration::from_secs(2))
//!     .sink(JsonLinesSink::stdout())
//!     .build()?;
//!
//! let tracer = engine.tracer("worker-1");
//! let total: u64 = tracer.call(call_site!("total"), || (1..=10).sum());
//! assert_eq!(total, 55);
//!
//! // Flushes whatever is left and stops the periodic task.
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! Functions can be instrumented with an attribute instead:
//!
//! ```rust
//! use std::sync::LazyLock;
//!
//! use callspool::{Engine, Tracer, traced};
//!
//! static ENGINE: LazyLock<Engine> = LazyLock::new(|| Engine::builder().build().unwrap());
//! static TRACER: LazyLock<Tracer> = LazyLock::new(|| ENGINE.tracer("billing"));
//!
//! #[traced(tracer = TRACER)]
//! fn charge(cents: u64) -> Result<u64, String> {
//!     if cents == 0 {
//!         return Err("nothing to charge".into());
//!     }
//!     Ok(cents)
//! }
//!
//! assert_eq!(charge(250), Ok(250));
//! assert!(charge(0).is_err());
//! ```
//!
//! ## Diagnostics
//!
//! The engine reports on itself (flushes, full queues, dropped records, sink failures) through
//! [`tracing`](https://docs.rs/tracing) events. Install any subscriber to see them; the
//! `log_level` option additionally caps their verbosity per engine.

pub mod config;
mod engine;
mod instrument;
mod log;
#[doc(hidden)]
pub mod macro_helpers;
mod macros;
mod record;
pub mod sink;

pub use callspool_macros::traced;
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineError, EngineMetadata, FlushReport, FlushTrigger};
pub use instrument::Tracer;
pub use record::{CallSite, Outcome, Record, Status, TIMESTAMP_FORMAT, summarize};
