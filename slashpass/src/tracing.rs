use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "slashpass=INFO";

/// Installs the global subscriber.
///
/// `filter` is either a plain level, applied to the relay's own targets, or a full
/// `EnvFilter` directive string. Calling this more than once is a no-op.
pub fn setup_tracing(filter: Option<String>) {
    let builder = match DEFAULT_DIRECTIVE.parse() {
        Ok(default) => EnvFilter::builder().with_default_directive(default),
        Err(_) => EnvFilter::builder(),
    };

    let filter = if let Some(filter) = filter {
        let filter = match Level::from_str(&filter) {
            Ok(level) => format!("slashpass={level}"),
            Err(_) => filter,
        };
        builder.parse_lossy(filter)
    } else {
        builder.parse_lossy("")
    };

    tracing_subscriber::registry()
        .with(Layer::default())
        .with(filter)
        .try_init()
        .ok();
}
