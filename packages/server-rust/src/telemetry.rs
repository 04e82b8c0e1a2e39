//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::service::RegistryConfig;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global subscriber described by `config.log_filter` and
/// `config.log_format`. `RUST_LOG` takes precedence over the configured
/// filter.
///
/// Returns `false` when another subscriber was already installed, in which
/// case that one stays in place.
///
/// # Errors
///
/// Fails if `config.log_filter` does not parse.
pub fn init_tracing(config: &RegistryConfig) -> anyhow::Result<bool> {
    let configured = EnvFilter::try_new(&config.log_filter)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or(configured);
    Ok(install(filter, config.log_format).is_ok())
}

fn install(filter: EnvFilter, format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_keeps_first() {
        let config = RegistryConfig {
            log_format: LogFormat::Json,
            log_filter: "debug".into(),
            ..RegistryConfig::default()
        };
        // Another test may have installed a subscriber first; either way the
        // second call here cannot install.
        init_tracing(&config).unwrap();
        assert!(!init_tracing(&RegistryConfig::default()).unwrap());
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let config = RegistryConfig {
            log_filter: "registry=notalevel".into(),
            ..RegistryConfig::default()
        };
        assert!(init_tracing(&config).is_err());
    }
}
