use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "vudata", about = "vudata - shared counters, maps and queues for load-test virtual users")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "vudata.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Storage backend (overrides config file)
    #[arg(long, value_enum)]
    pub backend: Option<StorageKind>,

    /// SQLite database path (overrides config file)
    #[arg(long)]
    pub db_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid listen address {0}")]
    ListenAddr(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageKind,

    /// Database file for the SQLite backend; `:memory:` keeps it in process.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a writer waits for the store's write lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health and /metrics) require authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key has a name (for audit) and a role.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub role: Role,
}

/// What an API key may do. Readers may list and inspect collections; only
/// writers and admins may change them.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    Writer,
    Admin,
}

impl Role {
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Writer | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Admin => "admin",
        })
    }
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_path() -> String {
    "vudata.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageKind::default(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config file named on the command line, then applies CLI
    /// overrides. A missing file yields the defaults; a malformed one is an error.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).map_err(|source| ConfigError::Parse {
                path: cli.config.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: cli.config.clone(),
                    source,
                })
            }
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(backend) = cli.backend {
            config.storage.backend = backend;
        }
        if let Some(ref path) = cli.db_path {
            config.storage.path = path.clone();
        }

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.server.host, self.server.port);
        raw.parse().map_err(|_| ConfigError::ListenAddr(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: &str) -> CliArgs {
        CliArgs {
            config: config.to_string(),
            port: None,
            log_level: None,
            backend: None,
            db_path: None,
        }
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [logging]
            level = "debug"
            json = true

            [storage]
            backend = "memory"
            busy_timeout_ms = 250

            [auth]
            enabled = true
            api_keys = [
                { name = "loadgen", key = "secret", role = "writer" },
                { name = "dashboard", key = "peek" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert!(config.logging.json);
        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert_eq!(config.storage.path, "vudata.db");
        assert_eq!(config.storage.busy_timeout_ms, 250);
        assert_eq!(config.auth.api_keys.len(), 2);
        assert_eq!(config.auth.api_keys[0].role, Role::Writer);
        assert_eq!(config.auth.api_keys[1].role, Role::Reader);
    }

    #[test]
    fn test_missing_file_uses_defaults_with_overrides() {
        let mut args = cli("/nonexistent/vudata.toml");
        args.port = Some(4000);
        args.backend = Some(StorageKind::Memory);
        args.db_path = Some(":memory:".to_string());

        let config = Config::load(&args).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert_eq!(config.storage.path, ":memory:");
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vudata.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let result = Config::load(&cli(path.to_str().unwrap()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
