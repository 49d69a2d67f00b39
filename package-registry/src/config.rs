//! # Configuration Management
//!
//! The registry reads an optional YAML file. Every field has a default, so an
//! empty or missing file yields a working configuration:
//!
//! ```yaml
//! address: 0.0.0.0:8080
//! package_paths:
//!   - ./packages
//! cache_time: 10
//! default_release: beta
//! version_path_policy: lenient
//! watch: false
//! categories:            # optional, replaces the built-in set
//!   custom: Custom
//! ```
//!
//! Command line flags override values from the file, see `main.rs`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::category::CategorySet;
use crate::package::{LoadOptions, Release, VersionPathPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket address to listen on.
    pub address: String,
    /// Storage roots scanned for packages.
    pub package_paths: Vec<PathBuf>,
    /// `Cache-Control: max-age` in seconds for every cacheable response.
    pub cache_time: u64,
    /// Release stage for manifests that do not declare one.
    pub default_release: Release,
    pub version_path_policy: VersionPathPolicy,
    /// Rebuild the index when files below a storage root change.
    pub watch: bool,
    /// Replaces the built-in category set when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<CategorySet>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            package_paths: vec![PathBuf::from("./packages")],
            cache_time: 10,
            default_release: Release::default(),
            version_path_policy: VersionPathPolicy::default(),
            watch: false,
            categories: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.address
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.address))
    }

    pub fn category_set(&self) -> CategorySet {
        self.categories.clone().unwrap_or_default()
    }

    /// Settings applied to every package loaded into the index.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            categories: self.category_set(),
            default_release: self.default_release,
            version_path_policy: self.version_path_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address, "0.0.0.0:8080");
        assert_eq!(config.package_paths, vec![PathBuf::from("./packages")]);
        assert_eq!(config.cache_time, 10);
        assert_eq!(config.default_release, Release::Beta);
        assert_eq!(config.version_path_policy, VersionPathPolicy::Lenient);
        assert!(!config.watch);
        assert!(config.category_set().contains("logs"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            "cache_time: 60\npackage_paths: [/srv/a, /srv/b]\nversion_path_policy: strict\n\
             categories:\n  custom: Custom things\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.cache_time, 60);
        assert_eq!(config.package_paths.len(), 2);
        assert_eq!(config.version_path_policy, VersionPathPolicy::Strict);
        assert_eq!(config.address, "0.0.0.0:8080");

        let options = config.load_options();
        assert_eq!(options.categories.title("custom"), Some("Custom things"));
        assert!(!options.categories.contains("logs"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_or_default(temp.path().join("missing.yml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "default_release: stable\n").unwrap();
        assert!(Config::load(&path).is_err());

        fs::write(&path, "cache_time: [1\n").unwrap();
        assert!(Config::load_or_default(&path).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let mut config = Config::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        config.address = "not an address".to_string();
        assert!(config.socket_addr().is_err());
    }
}
