use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bound on connecting and on each upstream read; 0 waits forever.
    #[serde(default = "default_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Listeners whose last KEEPALIVE is older than this are dropped.
    #[serde(default = "default_timeout_secs")]
    pub client_timeout_secs: u64,
    #[serde(default = "default_read_buffer_len")]
    pub read_buffer_len: usize,
    #[serde(default = "default_max_header_len")]
    pub max_header_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Selected relay is dropped after this long without AUDIO/METADATA.
    #[serde(default = "default_timeout_secs")]
    pub relay_timeout_secs: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_max_relays")]
    pub max_relays: usize,
    /// Longer metadata is cut, not rejected.
    #[serde(default = "default_metadata_max_len")]
    pub metadata_max_len: usize,
    #[serde(default = "default_liveness_check_ms")]
    pub liveness_check_ms: u64,
}

impl ProxyConfig {
    pub fn upstream_timeout(&self) -> Option<Duration> {
        match self.upstream_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl ClientConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn liveness_check(&self) -> Duration {
        Duration::from_millis(self.liveness_check_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: default_timeout_secs(),
            client_timeout_secs: default_timeout_secs(),
            read_buffer_len: default_read_buffer_len(),
            max_header_len: default_max_header_len(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_timeout_secs: default_timeout_secs(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            max_relays: default_max_relays(),
            metadata_max_len: default_metadata_max_len(),
            liveness_check_ms: default_liveness_check_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_read_buffer_len() -> usize {
    0x1000
}

fn default_max_header_len() -> usize {
    64 * 1024
}

fn default_keepalive_interval_ms() -> u64 {
    3500
}

fn default_max_relays() -> usize {
    20
}

fn default_metadata_max_len() -> usize {
    80
}

fn default_liveness_check_ms() -> u64 {
    500
}

impl Config {
    /// Load from `path`, or from the default location when `None`.  A missing
    /// file is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.proxy.client_timeout(), Duration::from_secs(5));
        assert_eq!(config.proxy.upstream_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.client.max_relays, 20);
        assert_eq!(config.client.metadata_max_len, 80);
        assert_eq!(config.client.keepalive_interval(), Duration::from_millis(3500));
        assert!(Config::config_path().ends_with("radio-relay/config.toml"));
    }

    #[test]
    fn test_zero_upstream_timeout_disables_it() {
        let proxy = ProxyConfig {
            upstream_timeout_secs: 0,
            ..ProxyConfig::default()
        };
        assert_eq!(proxy.upstream_timeout(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nmax_relays = 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.client.max_relays, 4);
        assert_eq!(config.client.relay_timeout_secs, 5);
        assert_eq!(config.proxy.read_buffer_len, 0x1000);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.proxy.max_header_len, 64 * 1024);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nmax_relays = \"many\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
