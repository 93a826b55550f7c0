//! Logging initialization shared by pogomap binaries.

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pogomap=info,pogomap_core=info";
const VERBOSE_LOG_FILTER: &str = "pogomap=debug,pogomap_core=debug";

/// Initialize tracing output to stderr.
///
/// `RUST_LOG` takes precedence when set; otherwise `verbose` selects
/// between the default info-level filter and debug.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
