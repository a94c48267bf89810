use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr, tagging each line with the emitting thread's name.
///
/// `RUST_LOG` overrides `log_level` when set. stdout stays free for run summaries.
pub fn init(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(false)
        .init();
}
