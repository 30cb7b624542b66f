//! Configuration types and loading
//!
//! Config path precedence: CLI `--config` > `CONFIG_PATH` env > default file.
//! `GATEWAY_CREDENTIALS_PATH` overrides `session.credentials_path`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
}

/// Listener and upstream settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Credential lifecycle settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub refresh_url: String,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// JSON credential file. Credentials live in memory only when unset.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Where users are sent to sign in again after the session ends
    #[serde(default)]
    pub login_url: Option<String>,
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_refresh_timeout() -> u64 {
    30
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SessionConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        common::Error::check_http_url("upstream_url", &config.gateway.upstream_url)?;
        common::Error::check_http_url("refresh_url", &config.session.refresh_url)?;

        if config.gateway.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.session.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.gateway.listen_addr == config.gateway.admin_addr {
            return Err(common::Error::Config(format!(
                "admin_addr must differ from listen_addr ({})",
                config.gateway.listen_addr
            )));
        }

        if let Ok(path) = std::env::var("GATEWAY_CREDENTIALS_PATH") {
            if !path.trim().is_empty() {
                config.session.credentials_path = Some(PathBuf::from(path));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-gateway.toml")
    }
}
