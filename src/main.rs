use apipulse::status::ExitStatus;
use tracing_subscriber::EnvFilter;

/// Entry point. Logging goes to stderr so stdout stays parseable; verbosity
/// is controlled through RUST_LOG.
#[tokio::main]
async fn main() -> ExitStatus {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    apipulse::cli::run().await
}
