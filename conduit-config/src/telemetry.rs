use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when neither `RUST_LOG` nor the config file sets one.
pub const DEFAULT_LOG_FILTER: &str =
    "info,conduit::checkpoint=warn,conduit::interfaces=warn";

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns `false` if a subscriber was already installed (tests install
/// their own, hosts may call this more than once).
pub fn init_tracing(default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_filter.unwrap_or(DEFAULT_LOG_FILTER))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
