use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "herd_census=info";

/// Initializes logging to stderr, human-readable or JSON lines.
///
/// Stdout is left to the report itself so `--json` output stays parseable.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    // A subscriber set earlier (tests, embedding binaries) wins
    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}
