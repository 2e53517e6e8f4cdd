use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use reqwest::Url;
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Overrides use a double underscore between section and key, so
/// `MOSAIC_CATALOG__PAGE_SIZE=50` sets `catalog.page_size`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MOSAIC_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    normalize(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    normalize(config)
}

/// The catalog endpoint must be an absolute http(s) URL. It is stored
/// without a trailing slash since request paths are appended to it.
fn normalize(mut config: Config) -> Result<Config, ConfigError> {
    let url = config.catalog.url.trim();
    if url.is_empty() {
        return Err(ConfigError::ParseError("catalog.url is empty".to_string()));
    }
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::ParseError(format!("catalog.url {:?}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::ParseError(format!(
            "catalog.url {:?} is not an http(s) endpoint",
            url
        )));
    }
    config.catalog.url = url.trim_end_matches('/').to_string();
    Ok(config)
}
