use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use std::{
    fs,
    path::{Path, PathBuf},
};

pub mod compression;
pub mod storage;
pub mod topography;

pub use compression::{CompressionAlgorithm, CompressionConfig};
pub use storage::{StorageConfig, StorageMode};
pub use topography::TopographyConfig;

const CONFIG_ROOT_FOLDER: &str = "config/";

/// Everything that can be tuned about how region files are stored.
///
/// Missing keys fall back to their defaults, so a config written by an older
/// version keeps loading.
#[derive(Deserialize, Serialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RegionConfiguration {
    pub compression: CompressionConfig,
    pub storage: StorageConfig,
    pub topography: TopographyConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read configuration file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Couldn't parse config at {path:?}. Reason: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub trait LoadConfiguration {
    /// Loads `<exec_dir>/config/<file>`, writing out the defaults if it doesn't exist yet.
    fn load(exec_dir: &Path) -> Result<Self, ConfigError>
    where
        Self: Sized + Default + Serialize + DeserializeOwned,
    {
        let config_dir = exec_dir.join(CONFIG_ROOT_FOLDER);
        if !config_dir.exists() {
            log::debug!("creating new config root folder");
            fs::create_dir(&config_dir).map_err(|source| ConfigError::Read {
                path: config_dir.clone(),
                source,
            })?;
        }
        let path = config_dir.join(Self::get_path());

        let config = if path.exists() {
            let file_content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

            toml::from_str(&file_content).map_err(|err| ConfigError::Parse {
                path: path.clone(),
                reason: err.message().to_string(),
            })?
        } else {
            let content = Self::default();

            match toml::to_string(&content) {
                Ok(serialized) => {
                    if let Err(err) = fs::write(&path, serialized) {
                        warn!("Couldn't write default config to {:?}. Reason: {}", &path, err);
                    }
                }
                Err(err) => warn!("Couldn't serialize default config: {}", err),
            }

            content
        };

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn get_path() -> &'static Path;

    fn validate(&self) -> Result<(), String>;
}

impl LoadConfiguration for RegionConfiguration {
    fn get_path() -> &'static Path {
        Path::new("region.toml")
    }

    fn validate(&self) -> Result<(), String> {
        self.compression.validate()?;
        self.storage.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use temp_dir::TempDir;

    use super::*;

    #[test]
    fn writes_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let config = RegionConfiguration::load(dir.path()).unwrap();
        assert_eq!(config, RegionConfiguration::default());
        assert!(dir.path().join("config/region.toml").exists());

        // The file we just wrote must load back to the same thing
        let reloaded = RegionConfiguration::load(dir.path()).unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/region.toml"),
            "[compression]\nalgorithm = \"Zstd\"\nlevel = 19\n",
        )
        .unwrap();

        let config = RegionConfiguration::load(dir.path()).unwrap();
        assert_eq!(config.compression.algorithm, CompressionAlgorithm::Zstd);
        assert_eq!(config.compression.level, 19);
        assert_eq!(config.storage, StorageConfig::default());
        assert!(config.topography.best_effort);
    }

    #[test]
    fn rejects_out_of_range_level() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/region.toml"),
            "[compression]\nalgorithm = \"ZLib\"\nlevel = 12\n",
        )
        .unwrap();

        assert!(matches!(
            RegionConfiguration::load(dir.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn brotli_levels() {
        let mut config = RegionConfiguration::default();
        config.compression.algorithm = CompressionAlgorithm::Brotli;
        config.compression.level = 11;
        assert!(config.validate().is_ok());
        config.compression.level = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_garbage() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/region.toml"), "storage = 3").unwrap();

        assert!(matches!(
            RegionConfiguration::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
