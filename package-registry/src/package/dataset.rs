//! Dataset manifests below `dataset/<name>/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LoadOptions, PackageError, Release, Stream, MANIFEST_FILE};

const DATASET_DIR: &str = "dataset";
const INGEST_PIPELINE_DIR: &str = "elasticsearch/ingest-pipeline";
const DEFAULT_PIPELINE: &str = "default";
const PIPELINE_EXTENSIONS: &[&str] = &["json", "yml"];

/// A named sub-unit of a package producing one class of events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub id: String,
    pub title: String,
    pub release: Release,
    #[serde(rename = "type")]
    pub dataset_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_pipeline: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<Stream>,
    pub package: String,
    /// Dataset directory name.
    pub path: String,

    #[serde(skip)]
    pub base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    release: Option<String>,
    #[serde(default, rename = "type")]
    dataset_type: String,
    #[serde(default)]
    ingest_pipeline: Option<String>,
    #[serde(default)]
    streams: Vec<Stream>,
}

/// Load every dataset of the package at `package_path`, sorted by directory name.
pub(crate) fn load_datasets(
    package_path: &Path,
    package_name: &str,
    options: &LoadOptions,
) -> Result<Vec<Dataset>, PackageError> {
    let datasets_path = package_path.join(DATASET_DIR);
    let entries = match fs::read_dir(&datasets_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PackageError::io(&datasets_path, e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PackageError::io(&datasets_path, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| PackageError::io(entry.path(), e))?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        } else {
            debug!(path = %entry.path().display(), "Ignoring non-directory in dataset folder");
        }
    }
    dirs.sort();

    dirs.iter()
        .map(|dir| load_dataset(dir, package_name, options))
        .collect()
}

fn load_dataset(
    dataset_path: &Path,
    package_name: &str,
    options: &LoadOptions,
) -> Result<Dataset, PackageError> {
    let invalid = |reason: String| PackageError::Dataset {
        path: dataset_path.to_path_buf(),
        reason,
    };

    let dir_name = dataset_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("dataset directory name is not valid UTF-8".to_string()))?
        .to_string();

    let manifest_path = dataset_path.join(MANIFEST_FILE);
    let content =
        fs::read_to_string(&manifest_path).map_err(|e| PackageError::io(&manifest_path, e))?;
    let raw: RawDataset =
        serde_yaml_ng::from_str(&content).map_err(|source| PackageError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    if raw.title.is_empty() {
        return Err(invalid("no title set".to_string()));
    }
    if raw.dataset_type.is_empty() {
        return Err(invalid("no type set".to_string()));
    }
    if let Some(position) = raw.streams.iter().position(|s| s.input.is_empty()) {
        return Err(invalid(format!("stream {position} has no input")));
    }

    let id = match raw.id {
        Some(id) if !id.is_empty() => id,
        _ => format!("{package_name}.{dir_name}"),
    };
    if id.contains('-') {
        return Err(invalid(format!(
            "dataset name is not allowed to contain `-`: {id}"
        )));
    }

    let release = match raw.release.as_deref() {
        None | Some("") => options.default_release,
        Some(release) => release.parse::<Release>()?,
    };

    let ingest_pipeline = resolve_ingest_pipeline(dataset_path, raw.ingest_pipeline, &id)
        .map_err(invalid)?;

    Ok(Dataset {
        id,
        title: raw.title,
        release,
        dataset_type: raw.dataset_type,
        ingest_pipeline,
        streams: raw.streams,
        package: package_name.to_string(),
        path: dir_name,
        base_path: dataset_path.to_path_buf(),
    })
}

/// Resolve the dataset's ingest pipeline against the files on disk.
///
/// A declared pipeline must exist. Without a declaration a `default` pipeline is
/// picked up; any other pipeline file present is an error.
fn resolve_ingest_pipeline(
    dataset_path: &Path,
    declared: Option<String>,
    id: &str,
) -> Result<Option<String>, String> {
    let pipeline_dir = dataset_path.join(INGEST_PIPELINE_DIR);
    let pipelines = list_pipeline_files(&pipeline_dir)?;
    let exists = |name: &str| {
        PIPELINE_EXTENSIONS
            .iter()
            .any(|ext| pipeline_dir.join(format!("{name}.{ext}")).is_file())
    };

    match declared.filter(|p| !p.is_empty()) {
        Some(name) if exists(&name) => Ok(Some(name)),
        Some(name) => Err(format!(
            "defined ingest_pipeline does not exist: {}",
            pipeline_dir.join(name).display()
        )),
        None if exists(DEFAULT_PIPELINE) => Ok(Some(DEFAULT_PIPELINE.to_string())),
        None if !pipelines.is_empty() => Err(format!(
            "package contains pipelines which are not used: {pipelines:?}, {id}"
        )),
        None => Ok(None),
    }
}

fn list_pipeline_files(pipeline_dir: &Path) -> Result<Vec<String>, String> {
    let entries = match fs::read_dir(pipeline_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("reading {} failed: {e}", pipeline_dir.display())),
    };

    let mut names = entries
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(|e| format!("reading {} failed: {e}", pipeline_dir.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}
