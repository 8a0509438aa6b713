//! Process-global structured logging, wired the same way across both the
//! server and client binaries: an async-drained `slog` sink installed as
//! both the `slog_scope` global logger and the `log` facade backend, so
//! library code using either macro family lands in the same sink.

use slog::{o, Drain};

/// Builds and installs the global logger. Returns a guard that must be
/// kept alive for the lifetime of the process; dropping it flushes the
/// async drain.
#[must_use]
pub fn init() -> slog_scope::GlobalLoggerGuard {
    let decorator = slog_term_like_json();
    let drain = slog_envlogger::new(decorator);
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")));

    let guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().expect("slog_stdlog::init must only be called once");
    guard
}

fn slog_term_like_json() -> impl Drain<Ok = (), Err = slog::Never> {
    slog_json::Json::new(std::io::stdout())
        .add_default_keys()
        .build()
        .fuse()
}
