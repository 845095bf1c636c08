//! Tracing setup shared by the server and the CLI.

use std::io::{self, IsTerminal};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let s = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// `RUST_LOG` if set, otherwise `default_directives` (e.g. `"info,novel_analysis=debug"`).
pub fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Installs the global subscriber: compact single-line events, RFC3339 timestamps,
/// ANSI only on a terminal. Writes to stderr so CLI output on stdout stays clean.
///
/// Calling it twice is harmless; the second install is ignored.
pub fn init(default_directives: &str) {
    let use_ansi = io::stderr().is_terminal();

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_ansi(use_ansi)
        .event_format(fmt::format().compact().with_timer(ChronoRfc3339Utc));

    let _ = tracing_subscriber::registry()
        .with(env_filter(default_directives))
        .with(fmt_layer)
        .try_init();
}
