use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable read for the log filter
pub const LOG_ENV: &str = "ANYCHAT_LOG";

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Log to a file. Used while the terminal UI owns the screen.
pub fn init_file(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("anychat=info"))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/// Log warnings and errors to stderr for one-shot commands
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("anychat=warn"))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}
