use tracing_subscriber::EnvFilter;

/// Shared tracing setup for the server and the import binary. `RUST_LOG`
/// takes precedence when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,readings_service=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
