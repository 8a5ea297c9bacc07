/*! Configuration of the onion announce service.

Configuration can be loaded from a YAML file (or string) with kebab-case keys:

```yaml
max-entries: 160
announce-timeout: 300
ping-id-timeout: 300
shared-keys-cache-size: 256
```

Every key is optional and falls back to the protocol value.
*/

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use config::{Config, File as CfgFile, FileFormat as CfgFileFormat, ConfigBuilder};
use config::builder::DefaultState;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Maximum number of entries in onion announce list. When number of entries
/// exceeds this value farthest nodes are dropped using DHT distance function.
pub const ONION_ANNOUNCE_MAX_ENTRIES: usize = 160;

/// Duration of time for which announce entry can be stored in onion announce
/// list without re-announcing.
pub const ONION_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval of time when onion ping id is valid after it was generated.
/// To be precise ping id will be valid for from `PING_ID_TIMEOUT` to
/// 2 * `PING_ID_TIMEOUT`.
pub const PING_ID_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of cached `SalsaBox`es.
pub const SHARED_KEYS_CACHE_SIZE: usize = 256;

/// Error that can happen when loading `AnnounceConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config sources can't be read or merged.
    #[error("Can't build config: {0}")]
    Build(config::ConfigError),
    /// Merged config doesn't match `AnnounceConfig`.
    #[error("Can't deserialize config: {0}")]
    Deserialize(config::ConfigError),
    /// Timeout is set to zero seconds.
    #[error("'{key}' must be greater than zero")]
    ZeroTimeout {
        /// Config key of the timeout
        key: &'static str,
    },
    /// Announce list can't hold any entry.
    #[error("'max-entries' must be greater than zero")]
    ZeroMaxEntries,
}

fn de_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error> where D: Deserializer<'de> {
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// Settings of `OnionAnnounce`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AnnounceConfig {
    /// Capacity of the announce entries list.
    #[serde(rename = "max-entries")]
    pub max_entries: usize,
    /// Time after which not refreshed announce entry is dropped.
    #[serde(rename = "announce-timeout")]
    #[serde(deserialize_with = "de_secs")]
    pub announce_timeout: Duration,
    /// Length of a ping id time window.
    #[serde(rename = "ping-id-timeout")]
    #[serde(deserialize_with = "de_secs")]
    pub ping_id_timeout: Duration,
    /// Number of `SalsaBox`es kept in LRU cache.
    #[serde(rename = "shared-keys-cache-size")]
    pub shared_keys_cache_size: NonZeroUsize,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        AnnounceConfig {
            max_entries: ONION_ANNOUNCE_MAX_ENTRIES,
            announce_timeout: ONION_ANNOUNCE_TIMEOUT,
            ping_id_timeout: PING_ID_TIMEOUT,
            shared_keys_cache_size: NonZeroUsize::new(SHARED_KEYS_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl AnnounceConfig {
    /// Load config from YAML file. Missing keys get their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<AnnounceConfig, ConfigError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        AnnounceConfig::load(AnnounceConfig::builder()?.add_source(CfgFile::new(&path, CfgFileFormat::Yaml)))
    }

    /// Load config from YAML string. Missing keys get their default values.
    pub fn from_yaml(yaml: &str) -> Result<AnnounceConfig, ConfigError> {
        AnnounceConfig::load(AnnounceConfig::builder()?.add_source(CfgFile::from_str(yaml, CfgFileFormat::Yaml)))
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("max-entries", ONION_ANNOUNCE_MAX_ENTRIES.to_string())
            .and_then(|b| b.set_default("announce-timeout", ONION_ANNOUNCE_TIMEOUT.as_secs().to_string()))
            .and_then(|b| b.set_default("ping-id-timeout", PING_ID_TIMEOUT.as_secs().to_string()))
            .and_then(|b| b.set_default("shared-keys-cache-size", SHARED_KEYS_CACHE_SIZE.to_string()))
            .map_err(ConfigError::Build)
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<AnnounceConfig, ConfigError> {
        let config: AnnounceConfig = builder
            .build()
            .map_err(ConfigError::Build)?
            .try_deserialize()
            .map_err(ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::ZeroMaxEntries);
        }
        if self.announce_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { key: "announce-timeout" });
        }
        if self.ping_id_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { key: "ping-id-timeout" });
        }
        Ok(())
    }
}
