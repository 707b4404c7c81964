//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered at `level`.
///
/// `RUST_LOG`, when set, replaces `level` entirely. Returns an error if a
/// global subscriber is already installed.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
