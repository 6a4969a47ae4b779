//! Server configuration.
//!
//! Values come from an optional TOML file; command-line flags override
//! them. Every field has a default, so a partial (or empty) file is valid:
//!
//! ```toml
//! port = 8888
//! directory = "/srv/uploads"
//! bind_address = "0.0.0.0"
//! read_buffer_size = 8192
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use filedrop_protocol::{DEFAULT_PORT, READ_BUFFER_SIZE};
use filedrop_upload_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base directory for uploads; created if absent.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Payload chunk size in bytes.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_read_buffer_size() -> usize {
    READ_BUFFER_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            directory: default_directory(),
            bind_address: default_bind_address(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Config {
    /// Loads `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Applies command-line values on top of the file values.
    pub fn with_overrides(mut self, port: Option<u16>, directory: Option<PathBuf>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(directory) = directory {
            self.directory = directory;
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.read_buffer_size == 0 {
            anyhow::bail!("read_buffer_size must be greater than 0");
        }
        Ok(())
    }

    /// Builds the dispatcher configuration for an already resolved
    /// base directory.
    pub fn to_server_config(&self, base_dir: PathBuf) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind_address,
            port: self.port,
            base_dir,
            read_buffer_size: self.read_buffer_size,
        }
    }
}
