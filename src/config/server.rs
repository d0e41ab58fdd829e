use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const MAX_TOKEN_TTL_SECONDS: i64 = 10 * 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Lifetime of tokens issued by login. `None` or zero issues non-expiring tokens.
    pub token_ttl_seconds: Option<i64>,
}

impl ServerConfig {
    /// Loads a TOML config file. Keys that are absent keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ttl) = self.token_ttl_seconds {
            if ttl < 0 {
                return Err(Error::Config(
                    "token_ttl_seconds cannot be negative".to_string(),
                ));
            }
            if ttl > MAX_TOKEN_TTL_SECONDS {
                return Err(Error::Config(format!(
                    "token_ttl_seconds cannot exceed {MAX_TOKEN_TTL_SECONDS} (10 years)"
                )));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("calshare.db")
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(".admin_token")
    }

    /// Out-of-range values, which `validate` rejects, yield `None`.
    #[must_use]
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        self.token_ttl_seconds
            .filter(|s| (1..=MAX_TOKEN_TTL_SECONDS).contains(s))
            .and_then(chrono::Duration::try_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            token_ttl_seconds: Some(DEFAULT_TOKEN_TTL_SECONDS),
        }
    }
}
