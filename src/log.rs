//! Logging setup for flowdeck.
//!
//! Log levels:
//! - ERROR: Critical failures that prevent operations from completing
//! - WARN: Unexpected conditions that are recoverable (failed requests, dropped frames)
//! - INFO: High-level notifications (startup, workflow created, channel connected)
//! - DEBUG: Detailed operation traces
//! - TRACE: Very detailed traces (poll results, ignored frames)
//!
//! Debug mode can be enabled with `--debug` flag or `FLOWDECK_DEBUG=1` env var.
//! `RUST_LOG` overrides the level entirely.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file location, `~/.flowdeck/flowdeck.log`.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".flowdeck").join("flowdeck.log"))
}

/// Initialize logging with explicit debug mode setting.
///
/// The log file is truncated on startup. Calling this more than once keeps
/// the first subscriber and its file.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug(std::env::var("FLOWDECK_DEBUG").ok().as_deref());
    if let Some(path) = log_path() {
        init_at(&path, debug_enabled);
    }
}

/// Install the file subscriber writing to `path`.
///
/// Returns false when a global subscriber is already set; the file is left
/// untouched in that case.
fn init_at(path: &Path, debug_enabled: bool) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(file) = File::create(path) else {
        return false;
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .is_ok()
}

fn env_debug(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "flowdeck=debug,info"
    } else {
        "info"
    }
}
