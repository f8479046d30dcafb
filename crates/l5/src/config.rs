//! Tunable sizes and defaults for the host binding table.
//!
//! Loaded from TOML. Every field is optional; missing fields keep their
//! defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{ioctl, net, poll};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "L5_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `listen` backlog when the host passes none.
    pub backlog: i32,
    /// `poll` / `pollin` timeout when the host passes none (ms).
    pub poll_timeout_ms: i32,
    /// Largest datagram `send1` accepts and `recv1` returns.
    pub dgram_bufsize: usize,
    /// Scratch area for byte-string ioctl arguments.
    pub ioctl_buflen: usize,
    /// Buffer for `getcwd` and `readlink` results.
    pub path_bufsize: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backlog: net::BACKLOG,
            poll_timeout_ms: poll::DEFAULT_TIMEOUT_MS,
            dgram_bufsize: net::BUFSIZE1,
            ioctl_buflen: ioctl::IOCTL_BUFLEN,
            path_bufsize: 4096,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or return defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text, path)?;
                info!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolve the config file and load it.
    ///
    /// Order: `explicit`, then `$L5_CONFIG`, then
    /// `<config_dir>/l5/config.toml`. Defaults if none is found.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match Self::config_path(explicit) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("l5").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.dgram_bufsize == 0 {
            return Err(ConfigError::Invalid("dgram_bufsize must be positive".into()));
        }
        if self.ioctl_buflen == 0 {
            return Err(ConfigError::Invalid("ioctl_buflen must be positive".into()));
        }
        if self.path_bufsize == 0 {
            return Err(ConfigError::Invalid("path_bufsize must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backlog, 32);
        assert_eq!(config.poll_timeout_ms, 10_000);
        assert_eq!(config.dgram_bufsize, 1280);
        assert_eq!(config.ioctl_buflen, 1024);
        assert_eq!(config.path_bufsize, 4096);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_override() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "backlog = 128\npoll_timeout_ms = 250\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.backlog, 128);
        assert_eq!(config.poll_timeout_ms, 250);
        assert_eq!(config.dgram_bufsize, 1280);
    }

    #[test]
    fn test_load_malformed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "backlog = \"lots\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = Config::from_toml("dgram_bufsize = 0", Path::new("inline")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_discover_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("l5.toml");
        fs::write(&path, "ioctl_buflen = 64\n").unwrap();
        let config = Config::discover(Some(&path)).unwrap();
        assert_eq!(config.ioctl_buflen, 64);
    }
}
