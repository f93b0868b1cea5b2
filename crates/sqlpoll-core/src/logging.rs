use tracing_subscriber::EnvFilter;

use crate::models::{CoreError, CoreErrorKind};

/// Installs the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_directive` when set.
pub fn init_logging(default_directive: &str) -> Result<(), CoreError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidArgument,
                format!("invalid log filter '{default_directive}': {error}"),
            )
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to install log subscriber: {error}"),
            )
        })
}
