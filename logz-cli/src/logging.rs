/// Installs the CLI's own diagnostics on stderr.
///
/// `RUST_LOG` controls the filter; without it only warnings are shown, so
/// records written to stdout are not interleaved with engine chatter.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // try_init: tests and repeated entry points may have installed one already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
