use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides, e.g. `INCIDENT_RELAY__BACKEND__TIMEOUT_MS`
pub const ENV_PREFIX: &str = "INCIDENT_RELAY";

/// Load configuration from a file using the config crate, with environment overrides
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(Some(config_path))
}

/// Load configuration synchronously; `None` means defaults plus environment only
pub fn load_config_sync(config_path: Option<&str>) -> Result<ServerConfig> {
    load_config_with_env(config_path, None)
}

/// Load configuration, optionally replacing the process environment with `env`
pub fn load_config_with_env(
    config_path: Option<&str>,
    env: Option<HashMap<String, String>>,
) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            file_format(path),
        ));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("backend.source_vars")
            .source(env),
    );

    let location = config_path.unwrap_or("<environment>");
    let settings = builder
        .build()
        .with_context(|| format!("Failed to build config from {location}"))?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {location}"))?;

    Ok(server_config)
}

/// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}
