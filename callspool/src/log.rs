//! Operator-facing diagnostics of the engine itself.
//!
//! Every engine carries its own [`LevelFilter`](tracing::level_filters::LevelFilter) on top of
//! whatever filter the installed subscriber applies, so a chatty engine can be quieted without
//! touching the global subscriber.

/// Emits a `tracing` event at `$level` if `$filter` allows it.
///
/// ```ignore
/// diag!(filter, WARN, records = 3, "queue is full");
/// ```
macro_rules! diag {
    ($filter:expr, $level:ident, $($arg:tt)+) => {
        if ::tracing::Level::$level <= $filter {
            ::tracing::event!(::tracing::Level::$level, $($arg)+);
        }
    };
}

pub(crate) use diag;
