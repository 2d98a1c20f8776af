//! Application configuration.
//!
//! Everything is read from an optional TOML file (`ecosystem_map.toml` by
//! default). Every field has a default, so a missing file or a partial
//! file is fine. A few values can be overridden from the environment.
//!
//! ```toml
//! [mergin]
//! url = "https://app.merginmaps.com"
//! project = "MLA Workspace/MLA637"
//!
//! [snapshot]
//! dir = "./MLA637"
//! file = "ecosystem_service.gpkg"
//!
//! [users]
//! column = "Your name"
//!
//! [cache]
//! ttl_secs = 60
//!
//! [map]
//! width = 1000
//! height = 600
//! zoom = 10
//!
//! [server]
//! bind_addr = "127.0.0.1"
//! port = 8080
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ecosystem_map_filter::UserColumns;
use ecosystem_map_mergin::{DEFAULT_MERGIN_URL, ProjectPath};
use ecosystem_map_render::MapOptions;
use serde::{Deserialize, Serialize};

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "ecosystem_map.toml";

/// Environment variable that points at a different config file.
pub const CONFIG_PATH_ENV: &str = "ECOSYSTEM_MAP_CONFIG";

/// Errors that can occur while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`AppConfig`].
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mergin: MerginConfig,
    pub snapshot: SnapshotConfig,
    pub users: UserColumns,
    pub cache: CacheConfig,
    pub map: MapConfig,
    pub server: ServerConfig,
}

/// Remote project settings. Credentials are never part of the file; they
/// come from `MERGIN_LOGIN` / `MERGIN_PASSWORD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerginConfig {
    pub url: String,
    pub project: ProjectPath,
}

impl Default for MerginConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MERGIN_URL.to_string(),
            project: ProjectPath {
                namespace: "MLA Workspace".to_string(),
                name: "MLA637".to_string(),
            },
        }
    }
}

/// Where the downloaded project lives and which layer to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Local project directory, replaced on every download.
    pub dir: PathBuf,
    /// GeoPackage file inside [`Self::dir`].
    pub file: String,
    /// Feature table to read; the first one when unset.
    pub layer: Option<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./MLA637"),
            file: "ecosystem_service.gpkg".to_string(),
            layer: None,
        }
    }
}

/// Memoization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Map widget size and map-building options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map width in pixels.
    pub width: u32,
    /// Map height in pixels.
    pub height: u32,
    #[serde(flatten)]
    pub options: MapOptions,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            options: MapOptions::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`toml::de::Error`] if the text is not valid for
    /// [`AppConfig`].
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the config at `path` if it exists, otherwise returns the
    /// defaults. Environment overrides are applied either way.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.is_file() {
            log::info!("Loading config from {}", path.display());
            Self::load(path)?
        } else {
            log::info!("No config at {}; using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads from `$ECOSYSTEM_MAP_CONFIG` or [`DEFAULT_CONFIG_PATH`].
    ///
    /// # Errors
    ///
    /// See [`Self::load_or_default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        Self::load_or_default(&path)
    }

    /// Applies `MERGIN_URL`, `BIND_ADDR` and `PORT` from `lookup`.
    /// Unparseable ports are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MERGIN_URL").filter(|v| !v.is_empty()) {
            self.mergin.url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR").filter(|v| !v.is_empty()) {
            self.server.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => log::warn!("Ignoring PORT={port}: {e}"),
            }
        }
    }

    /// Full path of the GeoPackage inside the snapshot directory.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot.dir.join(&self.snapshot.file)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn defaults_match_the_survey_project() {
        let config = AppConfig::default();
        assert_eq!(config.mergin.project.to_string(), "MLA Workspace/MLA637");
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("./MLA637/ecosystem_service.gpkg")
        );
        assert_eq!(config.users.column, "Your name");
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!((config.map.width, config.map.height), (1000, 600));
        assert_eq!(config.map.options.zoom, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [mergin]
            project = "Other/Project"

            [users]
            column = "surveyor"

            [map]
            height = 400
            fallback_zoom = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.mergin.project.namespace, "Other");
        assert_eq!(config.mergin.url, DEFAULT_MERGIN_URL);
        assert_eq!(config.users.column, "surveyor");
        assert_eq!(config.users.fallback_columns.len(), 7);
        assert_eq!(config.map.height, 400);
        assert_eq!(config.map.width, 1000);
        assert_eq!(config.map.options.fallback_zoom, 5);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn rejects_bad_project_path() {
        assert!(AppConfig::from_toml("[mergin]\nproject = \"noslash\"").is_err());
    }

    #[test]
    fn environment_overrides_apply() {
        let env: BTreeMap<&str, &str> = [
            ("MERGIN_URL", "http://localhost:5000"),
            ("BIND_ADDR", "0.0.0.0"),
            ("PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.mergin.url, "http://localhost:5000");
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn bad_port_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|name| (name == "PORT").then(|| "eighty".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config =
            AppConfig::load_or_default(Path::new("/nonexistent/ecosystem_map.toml")).unwrap();
        assert_eq!(config.snapshot.file, "ecosystem_service.gpkg");
    }
}
