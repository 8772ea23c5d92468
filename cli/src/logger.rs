use tracing_subscriber::EnvFilter;

const VERBOSE_FILTER: &str = "info,elastic_log=debug,elastic_log_client=debug,elastic_log_query=debug";

/// `RUST_LOG` wins when set, otherwise `--verbose` picks debug over info.
/// Logs go to stderr so stdout only carries hits.
pub fn init_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
