//! Configuration management for Memoapi
//!
//! Loads settings from TOML file at ~/.memoapi/config.toml

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Blob and record storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload credentials
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server host (default: 127.0.0.1 - localhost only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Base URL used for download links, e.g. "https://memos.example.org".
    /// Derived from the request Host header when unset.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Requests per minute allowed per client IP (0 disables limiting)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "127.0.0.1".to_string() // Localhost only - secure by default
}

fn default_rate_limit() -> u32 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            host: default_host(),
            public_url: None,
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

/// When the date token embedded in stored file names is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTokenPolicy {
    /// Current date at the time of each upload or rename
    #[default]
    PerRequest,
    /// Date the service was started; every name carries the boot date
    Startup,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory (defaults to ~/.memoapi)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Upload directory name, relative to `data_dir`
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// SQLite database file name, relative to `data_dir`
    #[serde(default = "default_database")]
    pub database: String,

    /// Maximum accepted PDF size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default)]
    pub date_token: DateTokenPolicy,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".memoapi"))
        .unwrap_or_else(|| PathBuf::from(".memoapi"))
}

fn default_upload_dir() -> String {
    "memo_uploads".to_string()
}

fn default_database() -> String {
    "memos.db".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: default_data_dir(),
            upload_dir: default_upload_dir(),
            database: default_database(),
            max_upload_bytes: default_max_upload_bytes(),
            date_token: DateTokenPolicy::default(),
        }
    }
}

/// Credentials for upload, update and delete
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,

    /// Argon2 PHC string, generate with `memoapi --hash-password <password>`
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(CoreError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    /// Get the data directory, expanding ~ if present
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    /// Full path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.database)
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> SocketAddr {
        use std::net::ToSocketAddrs;

        format!("{}:{}", self.server.host, self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.server.port)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MEMOAPI_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MEMOAPI_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            } else {
                tracing::warn!("Ignoring invalid MEMOAPI_SERVER_PORT: {}", port);
            }
        }
        if let Ok(data_dir) = std::env::var("MEMOAPI_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(username) = std::env::var("MEMOAPI_UPLOAD_USERNAME") {
            self.auth.username = non_empty(username);
        }
        if let Ok(hash) = std::env::var("MEMOAPI_UPLOAD_PASSWORD_HASH") {
            self.auth.password_hash = non_empty(hash);
        }
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = r#"# Memoapi Configuration

[server]
# Port to listen on (default: 8000)
port = 8000

# Host to bind to
# "127.0.0.1" = localhost only
# "0.0.0.0" = all interfaces
host = "127.0.0.1"

# Base URL for download links (defaults to the request Host header)
# public_url = "https://memos.example.org"

# Requests per minute per client IP, 0 disables limiting
rate_limit_per_minute = 10

[storage]
data_dir = "~/.memoapi"
upload_dir = "memo_uploads"
database = "memos.db"
max_upload_bytes = 10485760

# "per_request" stamps file names with the upload date,
# "startup" stamps every file name with the date the service started
date_token = "per_request"

[auth]
# Required for upload, update and delete
# username = "uploader"
# password_hash = "$argon2id$..."   # memoapi --hash-password <password>
"#;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.rate_limit_per_minute, 10);
        assert_eq!(config.storage.upload_dir, "memo_uploads");
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.storage.date_token, DateTokenPolicy::PerRequest);
        assert!(config.auth.username.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9000
host = "0.0.0.0"
public_url = "https://memos.example.org"

[storage]
data_dir = "/srv/memos"
date_token = "startup"

[auth]
username = "clerk"
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.server.public_url.as_deref(),
            Some("https://memos.example.org")
        );
        assert_eq!(config.data_dir(), PathBuf::from("/srv/memos"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/memos/memos.db"));
        assert_eq!(config.storage.date_token, DateTokenPolicy::Startup);
        assert_eq!(config.auth.username.as_deref(), Some("clerk"));
    }

    #[test]
    fn test_create_default_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::create_default(&path).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.database, "memos.db");
        assert!(config.auth.password_hash.is_none());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
