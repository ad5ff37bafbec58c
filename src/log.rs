//! Structured logging for debugging devskyy.
//!
//! Events are emitted with `tracing` and written as JSON lines to
//! `~/.devskyy/devskyy.log`, truncated on startup. Without a home
//! directory the log goes to stderr.
//!
//! Debug mode can be enabled with `--debug` flag or `DEVSKYY_DEBUG=1` env var.
//! `DEVSKYY_LOG` takes an env-filter directive that overrides both.

use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const DEBUG_ENV: &str = "DEVSKYY_DEBUG";
const FILTER_ENV: &str = "DEVSKYY_LOG";

/// Initialize logging at INFO level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_with_debug(debug: bool) {
    let filter = build_filter(debug || env_debug(std::env::var(DEBUG_ENV).ok().as_deref()));

    let builder = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .with_target(true);

    let result = match open_log_file() {
        Some(file) => builder.with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    // A subscriber is already installed, e.g. by a test harness.
    let _ = result;
}

fn env_debug(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "devskyy=debug,info"
    } else {
        "info"
    }
}

fn build_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

fn open_log_file() -> Option<File> {
    let path = Config::log_path().ok()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    // Truncate file on startup
    File::create(&path).ok()
}
