//! Logship configuration.
//!
//! Loaded from `~/.logship/config.toml` unless a path is given.
//! A missing default file means defaults; a missing named file is an error.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

const DEFAULT_BASE_DIR: &str = "/var/vcap";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Logship configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Agent base directory; log directories are resolved beneath it.
    base_dir: Option<PathBuf>,

    /// Scratch space for tarballs. Defaults to the system temp directory.
    tmp_dir: Option<PathBuf>,

    blobstore: Option<BlobstoreConfig>,

    #[serde(default)]
    monit: MonitConfig,
}

/// Where fetched logs are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum BlobstoreConfig {
    /// Blobs kept in a local directory.
    Local { path: PathBuf },

    /// Blobs moved by an external client binary.
    External { command: String, config: PathBuf },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MonitConfig {
    /// JSON status snapshot to answer group queries from.
    status_file: Option<PathBuf>,
}

impl Config {
    /// Load config from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The default config path: `~/.logship/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".logship").join("config.toml"))
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// The configured blobstore, or a local one under `<base-dir>/data/blobs`.
    pub fn blobstore(&self) -> BlobstoreConfig {
        self.blobstore.clone().unwrap_or_else(|| BlobstoreConfig::Local {
            path: self.base_dir().join("data").join("blobs"),
        })
    }

    pub fn monit_status_file(&self) -> PathBuf {
        self.monit
            .status_file
            .clone()
            .unwrap_or_else(|| self.base_dir().join("monit").join("status.json"))
    }
}
