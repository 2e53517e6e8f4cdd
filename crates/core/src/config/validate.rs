use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Connection ceilings are positive
/// - Executor tick and monitor poll periods are positive
/// - Catalog page size is positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Fetcher validation
    if config.fetcher.max_connections_per_host == 0 {
        return Err(invalid("fetcher.max_connections_per_host must be at least 1"));
    }
    if config.fetcher.max_connections_total == 0 {
        return Err(invalid("fetcher.max_connections_total must be at least 1"));
    }

    // Timers
    if config.executor.tick_interval_ms == 0 {
        return Err(invalid("executor.tick_interval_ms cannot be 0"));
    }
    if config.monitor.poll_interval_ms == 0 {
        return Err(invalid("monitor.poll_interval_ms cannot be 0"));
    }

    if config.catalog.page_size == 0 {
        return Err(invalid("catalog.page_size cannot be 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
