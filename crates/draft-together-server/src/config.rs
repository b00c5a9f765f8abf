// Configuration loading and parsing (config/server.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// File name of the server config, both in `defaults/` and `config/`.
pub const CONFIG_FILE: &str = "server.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db_path: String,
    pub catalog: CatalogConfig,
    pub persistence: PersistenceConfig,
    pub client: ClientConfig,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerConfig,
    #[serde(default)]
    database: DatabaseSection,
    catalog: CatalogConfig,
    persistence: PersistenceConfig,
    client: ClientSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSourceKind {
    DataDragon,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub source: CatalogSourceKind,
    pub data_dragon_url: String,
    pub play_rates_url: String,
    pub locale: String,
    /// Minimum play rate (0..1) for a role to count as eligible.
    pub play_rate_threshold: f32,
    pub refresh_interval_secs: u64,
    /// How often eligible positions are refreshed from the play rates.
    pub positions_refresh_interval_secs: u64,
    /// Local catalog snapshot, required when `source = "file"`.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl CatalogConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn positions_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.positions_refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub flush_interval_secs: u64,
}

impl PersistenceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSection {
    ws_base_address: String,
    http_base_address: String,
    #[serde(default)]
    image_domains: String,
}

/// Addresses handed to the front end.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub ws_base_address: String,
    pub http_base_address: String,
    /// Hosts images may be loaded from. Empty means unrestricted.
    pub image_domains: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` relative to the
/// given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ServerFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let db_path = match file.database.path {
        Some(path) => path,
        None => default_db_path()?,
    };

    let config = Config {
        server: file.server,
        db_path,
        catalog: file.catalog,
        persistence: file.persistence,
        client: ClientConfig {
            ws_base_address: file.client.ws_base_address,
            http_base_address: file.client.http_base_address,
            image_domains: parse_domain_list(&file.client.image_domains),
        },
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the server crate root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Split a comma-separated domain list, trimming whitespace and dropping
/// blank entries.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_db_path() -> Result<String, ConfigError> {
    let dirs = directories::ProjectDirs::from("gg", "DraftTogether", "draft-together").ok_or_else(
        || ConfigError::ValidationError {
            field: "database.path".into(),
            message: "not set and no home directory is available for the default location".into(),
        },
    )?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::ValidationError {
        field: "database.path".into(),
        message: format!("failed to create {}: {e}", data_dir.display()),
    })?;
    Ok(data_dir.join("draft-together.db").to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let catalog = &config.catalog;
    let threshold = catalog.play_rate_threshold;
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(ConfigError::ValidationError {
            field: "catalog.play_rate_threshold".into(),
            message: format!("must be strictly between 0.0 and 1.0, got {threshold}"),
        });
    }

    let intervals: &[(&str, u64)] = &[
        ("catalog.refresh_interval_secs", catalog.refresh_interval_secs),
        (
            "catalog.positions_refresh_interval_secs",
            catalog.positions_refresh_interval_secs,
        ),
        (
            "persistence.flush_interval_secs",
            config.persistence.flush_interval_secs,
        ),
    ];
    for (name, val) in intervals {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    match catalog.source {
        CatalogSourceKind::File if catalog.snapshot_path.is_none() => {
            return Err(ConfigError::ValidationError {
                field: "catalog.snapshot_path".into(),
                message: "required when catalog.source = \"file\"".into(),
            });
        }
        CatalogSourceKind::DataDragon => {
            let url = reqwest::Url::parse(&catalog.data_dragon_url).map_err(|e| {
                ConfigError::ValidationError {
                    field: "catalog.data_dragon_url".into(),
                    message: format!("not a valid URL: {e}"),
                }
            })?;
            let domains = &config.client.image_domains;
            if let Some(host) = url.host_str() {
                if !domains.is_empty() && !domains.iter().any(|d| d == host) {
                    return Err(ConfigError::ValidationError {
                        field: "client.image_domains".into(),
                        message: format!("must include the Data Dragon host {host}"),
                    });
                }
            }
        }
        CatalogSourceKind::File => {}
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
