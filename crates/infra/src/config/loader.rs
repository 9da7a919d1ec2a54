//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `FLEETSYNC_DB_PATH`: SQLite database file path (required)
//! - `FLEETSYNC_REGISTRY_URL`: Twin registry base URL (required)
//! - `FLEETSYNC_REGISTRY_API_KEY`: API key sent with registry requests
//! - `FLEETSYNC_REGISTRY_PAGE_SIZE`: Twin enumeration page size
//! - `FLEETSYNC_REGISTRY_TIMEOUT`: Registry request timeout in seconds
//! - `FLEETSYNC_DEVICE_SYNC_CRON`: Cron expression for device reconciliation
//! - `FLEETSYNC_EDGE_SYNC_CRON`: Cron expression for edge reconciliation
//! - `FLEETSYNC_DISPATCH_CRON`: Cron expression for command dispatch
//! - `FLEETSYNC_TIMEZONE`: Named timezone for schedule evaluation

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use fleetsync_domain::{
    Config, DatabaseConfig, FleetError, JobsConfig, RegistryConfig, Result,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `FleetError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<Config> {
    // Pick up a .env file when present; ignore when absent
    dotenvy::dotenv().ok();

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `FLEETSYNC_DB_PATH` and `FLEETSYNC_REGISTRY_URL` must be present; every
/// other variable falls back to its default.
///
/// # Errors
/// Returns `FleetError::Config` if required variables are missing or have
/// invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("FLEETSYNC_DB_PATH")?;
    let registry_url = env_var("FLEETSYNC_REGISTRY_URL")?;
    let api_key = std::env::var("FLEETSYNC_REGISTRY_API_KEY").ok();

    let registry_defaults = RegistryConfig::default();
    let page_size = env_parsed("FLEETSYNC_REGISTRY_PAGE_SIZE", registry_defaults.page_size)?;
    let timeout_seconds =
        env_parsed("FLEETSYNC_REGISTRY_TIMEOUT", registry_defaults.timeout_seconds)?;

    let jobs_defaults = JobsConfig::default();
    let jobs = JobsConfig {
        device_sync_cron: env_or("FLEETSYNC_DEVICE_SYNC_CRON", jobs_defaults.device_sync_cron),
        edge_sync_cron: env_or("FLEETSYNC_EDGE_SYNC_CRON", jobs_defaults.edge_sync_cron),
        dispatch_cron: env_or("FLEETSYNC_DISPATCH_CRON", jobs_defaults.dispatch_cron),
        timezone: env_or("FLEETSYNC_TIMEZONE", jobs_defaults.timezone),
    };

    // Fail at load time rather than on the first dispatch run
    parse_timezone(&jobs.timezone)?;

    Ok(Config {
        database: DatabaseConfig { path: db_path },
        registry: RegistryConfig {
            base_url: registry_url,
            api_key,
            page_size,
            timeout_seconds,
        },
        jobs,
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `FleetError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FleetError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FleetError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FleetError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    parse_timezone(&config.jobs.timezone)?;
    Ok(config)
}

/// Resolve the configured timezone name into a [`Tz`].
///
/// # Errors
/// Returns `FleetError::Config` for names not in the tz database.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| FleetError::Config(format!("Unknown timezone: {name}")))
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FleetError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FleetError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(FleetError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, up to two parent directories,
/// and the executable's directory.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend([
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("fleetsync.json"),
            cwd.join("fleetsync.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }


    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("fleetsync.json"),
                exe_dir.join("fleetsync.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| FleetError::Config(format!("Missing required environment variable: {}", key)))
}

/// Environment variable with a default for absent values
fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// Parse a numeric environment variable, keeping the default when unset
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| FleetError::Config(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
