//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`; defaults to `callgraph_db=info`. Later calls are
/// ignored, so tests and embedders may call it freely.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("callgraph_db=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("logging initialized twice without panicking");
    }
}
