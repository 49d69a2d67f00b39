//! # Package Records
//!
//! A [`Package`] is one validated package version discovered on disk. Records are
//! built by [`load_package`] from the package's `manifest.yml`, its dataset
//! manifests and a walk of its directory, and are immutable afterwards.
//!
//! ## On-disk layout
//!
//! ```text
//! <package dir>/
//!   manifest.yml
//!   docs/README.md
//!   img/...
//!   dataset/<dataset dir>/manifest.yml
//!   dataset/<dataset dir>/elasticsearch/ingest-pipeline/<name>.json|.yml
//! ```
//!
//! The JSON form of a record is what `/package/{name}/{version}/` returns. The
//! local base path is never serialized; [`Package::summary`] produces the
//! smaller form used in search results.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::CategorySet;
use crate::version::{Constraint, VersionError};

mod dataset;
mod link;
mod manifest;

pub use dataset::Dataset;
pub use link::link_streams;
pub use manifest::{load_package, VersionPath};

/// Package type used when a manifest does not declare one.
pub const DEFAULT_TYPE: &str = "integration";

/// License assumed when a manifest does not declare one.
pub const DEFAULT_LICENSE: &str = "basic";

/// Name of the manifest file at the root of packages and datasets.
pub const MANIFEST_FILE: &str = "manifest.yml";

/// Errors raised while loading or validating a single package.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest '{path}': {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("invalid package manifest: {0}")]
    Invalid(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("invalid category: {0}")]
    UnknownCategory(String),

    #[error("invalid release: {0}")]
    InvalidRelease(String),

    #[error("inconsistent versions (path: {path}, manifest: {manifest})")]
    InconsistentVersion { path: Version, manifest: Version },

    #[error("package directory '{0}' is not rooted in a version directory")]
    UnversionedPath(PathBuf),

    #[error("invalid dataset '{path}': {reason}")]
    Dataset { path: PathBuf, reason: String },
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Maturity label of a package or dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Release {
    Experimental,
    #[default]
    Beta,
    Ga,
}

impl Release {
    pub fn as_str(&self) -> &'static str {
        match self {
            Release::Experimental => "experimental",
            Release::Beta => "beta",
            Release::Ga => "ga",
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Release {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "experimental" => Ok(Release::Experimental),
            "beta" => Ok(Release::Beta),
            "ga" => Ok(Release::Ga),
            other => Err(PackageError::InvalidRelease(other.to_string())),
        }
    }
}

/// How a manifest version is checked against the directory it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPathPolicy {
    /// A version-named directory must match the manifest; directories whose
    /// name is not a version are accepted as unversioned.
    #[default]
    Lenient,
    /// Every package directory must be named after its version.
    Strict,
}

/// Settings shared by every package loaded into one index.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub categories: CategorySet,
    pub default_release: Release,
    pub version_path_policy: VersionPathPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub path: String,
    #[serde(rename = "type")]
    pub download_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

/// Compatibility condition against the companion product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditions {
    #[serde(rename = "kibana.version")]
    pub kibana_version: Constraint,
}

/// A dataset's binding to one input type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A data collection mechanism exposed by a config template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<Stream>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTemplate {
    pub name: String,
    pub title: String,
    pub description: String,
    pub inputs: Vec<Input>,
    pub multiple: bool,
}

/// One validated package version.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub name: String,
    pub title: String,
    pub version: Version,
    pub description: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub download: String,
    pub downloads: Vec<Download>,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Image>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    pub license: String,
    pub categories: Vec<String>,
    pub release: Release,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<Image>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_templates: Vec<ConfigTemplate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<Dataset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,

    /// Local package directory, only used for archiving.
    #[serde(skip)]
    pub base_path: PathBuf,
}

/// Search-result view of a package: identity and descriptive fields only.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub title: String,
    pub version: Version,
    pub description: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub download: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<Download>,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Image>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
}

impl Package {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// A package without a condition is compatible with every version, and
    /// every package is compatible when no version is requested.
    pub fn is_compatible_with(&self, kibana_version: Option<&Version>) -> bool {
        match (&self.conditions, kibana_version) {
            (Some(conditions), Some(version)) => conditions.kibana_version.matches(version),
            _ => true,
        }
    }

    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            name: self.name.clone(),
            title: self.title.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            package_type: self.package_type.clone(),
            download: self.download.clone(),
            downloads: self.downloads.clone(),
            path: self.path.clone(),
            icons: self.icons.clone(),
            internal: self.internal,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// `/package/{name}/{version}`
pub fn url_path(name: &str, version: &Version) -> String {
    format!("/package/{name}/{version}")
}

/// `/epr/{name}/{name}-{version}.tar.gz`
pub fn download_path(name: &str, version: &Version) -> String {
    format!("/epr/{name}/{name}-{version}.tar.gz")
}

#[cfg(test)]
impl Package {
    /// Minimal in-memory record for tests that do not touch the filesystem.
    pub(crate) fn fixture(name: &str, version: &str, categories: &[&str]) -> Self {
        let version = crate::version::parse_version(version).unwrap();
        Package {
            name: name.to_string(),
            title: name.to_string(),
            description: format!("The {name} package"),
            package_type: DEFAULT_TYPE.to_string(),
            download: download_path(name, &version),
            downloads: vec![Download {
                path: download_path(name, &version),
                download_type: "tar".to_string(),
            }],
            path: url_path(name, &version),
            icons: Vec::new(),
            internal: false,
            format_version: "1.0.0".to_string(),
            readme: None,
            license: DEFAULT_LICENSE.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            release: Release::default(),
            conditions: None,
            screenshots: Vec::new(),
            assets: Vec::new(),
            config_templates: Vec::new(),
            datasets: Vec::new(),
            owner: None,
            base_path: PathBuf::from(format!("/packages/{name}/{version}")),
            version,
        }
    }

    pub(crate) fn with_constraint(mut self, constraint: &str) -> Self {
        self.conditions = Some(Conditions {
            kibana_version: Constraint::parse(constraint).unwrap(),
        });
        self
    }
}
