//! Package manifest parsing and validation.

use std::fs;
use std::path::Path;

use semver::Version;
use serde::Deserialize;
use tracing::debug;

use super::dataset::load_datasets;
use super::link::link_streams;
use super::{
    download_path, url_path, Conditions, ConfigTemplate, Download, Image, Input, LoadOptions,
    Owner, Package, PackageError, Release, VersionPathPolicy, DEFAULT_LICENSE, DEFAULT_TYPE,
    MANIFEST_FILE,
};
use crate::version::{parse_loose, parse_version, Constraint};
use crate::walk::walk_sorted;

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    format_version: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    package_type: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    conditions: Option<RawConditions>,
    #[serde(default)]
    requirement: Option<RawRequirement>,
    #[serde(default)]
    icons: Vec<Image>,
    #[serde(default)]
    screenshots: Vec<Image>,
    #[serde(default)]
    config_templates: Vec<RawConfigTemplate>,
    #[serde(default)]
    owner: Option<Owner>,
}

/// Accepts both `kibana.version: ...` and `kibana: {version: ...}`.
#[derive(Debug, Deserialize)]
struct RawConditions {
    #[serde(default, rename = "kibana.version")]
    kibana_version: Option<String>,
    #[serde(default)]
    kibana: Option<RawKibanaCondition>,
}

#[derive(Debug, Deserialize)]
struct RawKibanaCondition {
    #[serde(default)]
    version: Option<String>,
}

/// Legacy `requirement.kibana.versions` form.
#[derive(Debug, Deserialize)]
struct RawRequirement {
    #[serde(default)]
    kibana: Option<RawProductRequirement>,
}

#[derive(Debug, Deserialize)]
struct RawProductRequirement {
    #[serde(default)]
    versions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfigTemplate {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    inputs: Vec<Input>,
    #[serde(default)]
    multiple: Option<bool>,
}

/// Outcome of comparing the manifest version with the package directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPath {
    /// The directory name encodes the manifest version.
    Matches,
    /// The directory name is not a version; accepted under the lenient policy.
    Unversioned,
}

/// Load and validate the package rooted at `base_path`.
pub fn load_package(base_path: &Path, options: &LoadOptions) -> Result<Package, PackageError> {
    let manifest_path = base_path.join(MANIFEST_FILE);
    let content =
        fs::read_to_string(&manifest_path).map_err(|e| PackageError::io(&manifest_path, e))?;
    let raw: RawManifest =
        serde_yaml_ng::from_str(&content).map_err(|source| PackageError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    let mut package = validate_manifest(raw, base_path, options)?;

    let version_path =
        check_version_path(base_path, &package.name, &package.version, options.version_path_policy)?;
    debug!(
        name = %package.name,
        version = %package.version,
        version_path = ?version_path,
        "Validated package manifest"
    );

    package.readme = Some(check_readme(base_path, &package.name, &package.version)?);
    package.assets = collect_assets(base_path, &package.name, &package.version)?;
    package.datasets = load_datasets(base_path, &package.name, options)?;
    package.config_templates = link_streams(&package.config_templates, &package.datasets);

    Ok(package)
}

fn validate_manifest(
    raw: RawManifest,
    base_path: &Path,
    options: &LoadOptions,
) -> Result<Package, PackageError> {
    if raw.format_version.is_empty() {
        return Err(PackageError::Invalid("no format_version set".to_string()));
    }
    parse_version(&raw.format_version)?;

    if raw.name.is_empty() {
        return Err(PackageError::Invalid("no name set".to_string()));
    }
    let version = parse_version(&raw.version)?;

    let title = match raw.title {
        Some(title) if !title.is_empty() => title,
        _ => {
            return Err(PackageError::Invalid(format!(
                "no title set for package: {}",
                raw.name
            )))
        }
    };
    if raw.description.is_empty() {
        return Err(PackageError::Invalid(format!(
            "no description set for package: {}",
            raw.name
        )));
    }

    if let Some(unknown) = raw
        .categories
        .iter()
        .find(|c| !options.categories.contains(c))
    {
        return Err(PackageError::UnknownCategory(unknown.clone()));
    }

    let release = match raw.release.as_deref() {
        None | Some("") => options.default_release,
        Some(release) => release.parse::<Release>()?,
    };

    let conditions = resolve_conditions(raw.conditions, raw.requirement)?;

    let name = raw.name;
    let prefix_src = |image: Image| Image {
        src: asset_url(&name, &version, image.src.trim_start_matches('/')),
        ..image
    };
    let icons = raw.icons.into_iter().map(prefix_src).collect();
    let screenshots = raw.screenshots.into_iter().map(prefix_src).collect();

    let config_templates = raw
        .config_templates
        .into_iter()
        .map(|t| ConfigTemplate {
            name: t.name,
            title: t.title,
            description: t.description,
            inputs: t.inputs,
            multiple: t.multiple.unwrap_or(true),
        })
        .collect();

    let download = download_path(&name, &version);

    Ok(Package {
        title,
        description: raw.description,
        package_type: raw
            .package_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TYPE.to_string()),
        downloads: vec![Download {
            path: download.clone(),
            download_type: "tar".to_string(),
        }],
        download,
        path: url_path(&name, &version),
        icons,
        internal: raw.internal,
        format_version: raw.format_version,
        readme: None,
        license: raw
            .license
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LICENSE.to_string()),
        categories: raw.categories,
        release,
        conditions,
        screenshots,
        assets: Vec::new(),
        config_templates,
        datasets: Vec::new(),
        owner: raw.owner,
        base_path: base_path.to_path_buf(),
        name,
        version,
    })
}

/// `conditions.kibana.version` wins over the legacy `requirement.kibana.versions`.
fn resolve_conditions(
    conditions: Option<RawConditions>,
    requirement: Option<RawRequirement>,
) -> Result<Option<Conditions>, PackageError> {
    let from_conditions = conditions.and_then(|c| {
        c.kibana_version
            .or_else(|| c.kibana.and_then(|k| k.version))
    });
    let from_requirement = requirement
        .and_then(|r| r.kibana)
        .and_then(|k| k.versions);

    let expression = from_conditions
        .filter(|s| !s.is_empty())
        .or_else(|| from_requirement.filter(|s| !s.is_empty()));

    expression
        .map(|expr| {
            Ok(Conditions {
                kibana_version: Constraint::parse(&expr)?,
            })
        })
        .transpose()
}

/// The version encoded in the package directory name, if any.
///
/// Nested layouts name the directory after the version (`example/1.0.0`); flat
/// layouts use `{name}-{version}` (`example-1.0.0`).
fn path_version(base_path: &Path, name: &str) -> Option<Version> {
    let dir_name = base_path.file_name()?.to_str()?;
    if let Ok(version) = parse_loose(dir_name) {
        return Some(version);
    }
    dir_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| parse_loose(rest).ok())
}

/// Check the manifest version against the package directory name.
pub(crate) fn check_version_path(
    base_path: &Path,
    name: &str,
    manifest_version: &Version,
    policy: VersionPathPolicy,
) -> Result<VersionPath, PackageError> {
    match path_version(base_path, name) {
        Some(path_version) if path_version == *manifest_version => Ok(VersionPath::Matches),
        Some(path_version) => Err(PackageError::InconsistentVersion {
            path: path_version,
            manifest: manifest_version.clone(),
        }),
        None => match policy {
            VersionPathPolicy::Lenient => Ok(VersionPath::Unversioned),
            VersionPathPolicy::Strict => {
                Err(PackageError::UnversionedPath(base_path.to_path_buf()))
            }
        },
    }
}

fn check_readme(base_path: &Path, name: &str, version: &Version) -> Result<String, PackageError> {
    let readme_path = base_path.join("docs").join("README.md");
    let metadata = fs::metadata(&readme_path).map_err(|e| {
        PackageError::Invalid(format!(
            "no readme file found, README.md is required: {}: {e}",
            readme_path.display()
        ))
    })?;
    if metadata.is_dir() {
        return Err(PackageError::Invalid("README.md is a directory".to_string()));
    }
    Ok(asset_url(name, version, "docs/README.md"))
}

/// Every regular file of the package, as served below `/package/{name}/{version}/`.
fn collect_assets(
    base_path: &Path,
    name: &str,
    version: &Version,
) -> Result<Vec<String>, PackageError> {
    let mut assets = Vec::new();
    for entry in walk_sorted(base_path) {
        let entry = entry.map_err(|e| PackageError::io(base_path, e))?;
        if entry.is_dir || entry.file_name() == ".DS_Store" {
            continue;
        }
        assets.push(asset_url(name, version, &entry.relative_path));
    }
    Ok(assets)
}

fn asset_url(name: &str, version: &Version, relative: &str) -> String {
    format!("{}/{}", url_path(name, version), relative)
}
