//! # Package Index
//!
//! The index holds every package version discovered below one or more storage
//! roots, keyed by name with versions kept in ascending order. Two layouts are
//! recognised inside each root and may be mixed freely:
//!
//! ```text
//! <root>/example/1.0.0/manifest.yml     nested by name, then version
//! <root>/example-2.0.0/manifest.yml     flat, one directory per package version
//! ```
//!
//! A [`PackageIndex`] is immutable once built. [`IndexHandle`] shares the current
//! index between request handlers and swaps in a freshly built one on reload.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use semver::Version;
use tracing::{debug, info, warn};

use crate::package::{load_package, LoadOptions, Package, PackageError, MANIFEST_FILE};

/// Errors that abort an index build. Every variant names the offending path.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("failed to read package directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("loading package '{path}' failed: {source}")]
    Package {
        path: PathBuf,
        #[source]
        source: PackageError,
    },

    #[error("duplicate package {name} {version}: found in '{first}' and '{second}'")]
    Duplicate {
        name: String,
        version: Version,
        first: PathBuf,
        second: PathBuf,
    },
}

impl IndexError {
    /// Path of the package or directory that caused the failure.
    pub fn path(&self) -> &Path {
        match self {
            IndexError::Io { path, .. } | IndexError::Package { path, .. } => path,
            IndexError::Duplicate { second, .. } => second,
        }
    }
}

/// Immutable set of package records keyed by name.
#[derive(Debug, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, Vec<Arc<Package>>>,
}

impl PackageIndex {
    /// Scan `roots` and load every package found.
    ///
    /// Any unreadable directory or invalid package fails the whole build.
    pub fn build(roots: &[PathBuf], options: &LoadOptions) -> Result<Self, IndexError> {
        let started = Instant::now();
        let mut packages = Vec::new();

        for root in roots {
            for package_dir in discover(root)? {
                let package =
                    load_package(&package_dir, options).map_err(|source| IndexError::Package {
                        path: package_dir.clone(),
                        source,
                    })?;
                debug!(
                    name = %package.name,
                    version = %package.version,
                    path = %package_dir.display(),
                    "Loaded package"
                );
                packages.push(package);
            }
        }

        let index = Self::from_packages(packages)?;
        info!(
            roots = roots.len(),
            packages = index.name_count(),
            versions = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built package index"
        );
        Ok(index)
    }

    /// Assemble an index from already loaded records.
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Result<Self, IndexError> {
        let mut by_name: BTreeMap<String, Vec<Arc<Package>>> = BTreeMap::new();

        for package in packages {
            let versions = by_name.entry(package.name.clone()).or_default();
            if let Some(existing) = versions.iter().find(|p| p.version == package.version) {
                return Err(IndexError::Duplicate {
                    name: package.name.clone(),
                    version: package.version.clone(),
                    first: existing.base_path.clone(),
                    second: package.base_path.clone(),
                });
            }
            versions.push(Arc::new(package));
        }

        for versions in by_name.values_mut() {
            versions.sort_by(|a, b| a.version.cmp(&b.version));
        }

        Ok(Self { packages: by_name })
    }

    /// Exact `(name, version)` lookup.
    pub fn get(&self, name: &str, version: &Version) -> Option<&Arc<Package>> {
        self.versions(name).iter().find(|p| p.version == *version)
    }

    /// All versions of `name`, oldest first.
    pub fn versions(&self, name: &str) -> &[Arc<Package>] {
        self.packages.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names in ascending order, each with its ascending versions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<Package>])> {
        self.packages
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.as_slice()))
    }

    /// Number of package versions.
    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Number of distinct package names.
    pub fn name_count(&self) -> usize {
        self.packages.len()
    }
}

/// Package directories below `root`, in sorted order.
///
/// A child holding a manifest is a flat-layout package; any other child is a
/// package-name directory whose own children are version directories.
fn discover(root: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let mut found = Vec::new();
    for child in sorted_subdirs(root)? {
        if child.join(MANIFEST_FILE).is_file() {
            found.push(child);
        } else {
            found.extend(sorted_subdirs(&child)?);
        }
    }
    Ok(found)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let io_err = |source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type().map_err(io_err)?.is_dir() {
            debug!(path = %path.display(), "Skipping non-package entry");
            continue;
        }
        dirs.push(path);
    }
    dirs.sort();
    Ok(dirs)
}

/// Shared, atomically replaceable reference to the current index.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<PackageIndex>>,
    /// Held for a whole rebuild so scans are swapped in the order they ran.
    rebuild: Mutex<()>,
    roots: Vec<PathBuf>,
    options: LoadOptions,
}

impl IndexHandle {
    /// Build the initial index; failure here is fatal to startup.
    pub fn build(roots: Vec<PathBuf>, options: LoadOptions) -> Result<Self, IndexError> {
        let index = PackageIndex::build(&roots, &options)?;
        Ok(Self {
            current: RwLock::new(Arc::new(index)),
            rebuild: Mutex::new(()),
            roots,
            options,
        })
    }

    /// The index as of now. Holding the snapshot never blocks a reload.
    pub fn snapshot(&self) -> Arc<PackageIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Rebuild from the storage roots and swap the result in.
    ///
    /// On failure the previous index stays in place and the error is returned.
    /// Concurrent calls run one after another.
    pub fn reload(&self) -> Result<Arc<PackageIndex>, IndexError> {
        let _rebuild = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
        let index = match PackageIndex::build(&self.roots, &self.options) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %e.path().display(),
                    "Index rebuild failed, keeping previous index"
                );
                return Err(e);
            }
        };

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&index);
        Ok(index)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(dir: &Path, name: &str, version: &str) {
        fs::create_dir_all(dir.join("docs")).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "format_version: 1.0.0\nname: {name}\ntitle: {name}\nversion: {version}\n\
                 description: The {name} package\ncategories: [\"logs\"]\n"
            ),
        )
        .unwrap();
        fs::write(dir.join("docs/README.md"), "# readme").unwrap();
    }

    fn names_and_versions(index: &PackageIndex) -> Vec<String> {
        index
            .iter()
            .flat_map(|(_, versions)| versions.iter())
            .map(|p| format!("{}-{}", p.name, p.version))
            .collect()
    }

    #[test]
    fn test_build_mixes_layouts_and_merges_roots() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_package(&first.path().join("example/1.0.0"), "example", "1.0.0");
        write_package(&first.path().join("example/10.0.0"), "example", "10.0.0");
        write_package(&first.path().join("foo-0.1.0"), "foo", "0.1.0");
        write_package(&second.path().join("example/2.0.0"), "example", "2.0.0");
        fs::write(first.path().join("README.txt"), "not a package").unwrap();

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let index = PackageIndex::build(&roots, &LoadOptions::default()).unwrap();

        assert_eq!(
            names_and_versions(&index),
            vec!["example-1.0.0", "example-2.0.0", "example-10.0.0", "foo-0.1.0"]
        );
        assert_eq!(index.len(), 4);
        assert_eq!(index.name_count(), 2);
        assert!(index.get("example", &Version::new(2, 0, 0)).is_some());
        assert!(index.get("example", &Version::new(3, 0, 0)).is_none());
        assert!(index.versions("missing").is_empty());
    }

    #[test]
    fn test_duplicate_name_version_is_fatal() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_package(&first.path().join("example/1.0.0"), "example", "1.0.0");
        write_package(&second.path().join("example-1.0.0"), "example", "1.0.0");

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let err = PackageIndex::build(&roots, &LoadOptions::default()).unwrap_err();

        assert!(matches!(err, IndexError::Duplicate { .. }));
        assert_eq!(err.path(), second.path().join("example-1.0.0"));
    }

    #[test]
    fn test_invalid_package_aborts_build_with_path() {
        let root = TempDir::new().unwrap();
        write_package(&root.path().join("example/1.0.0"), "example", "1.0.0");
        let broken = root.path().join("broken/1.0.0");
        write_package(&broken, "broken", "1.0.0");
        fs::remove_file(broken.join("docs/README.md")).unwrap();

        let err =
            PackageIndex::build(&[root.path().to_path_buf()], &LoadOptions::default()).unwrap_err();

        assert!(matches!(err, IndexError::Package { .. }));
        assert_eq!(err.path(), broken);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("missing");
        let err = PackageIndex::build(&[missing.clone()], &LoadOptions::default()).unwrap_err();
        assert_eq!(err.path(), missing);
    }

    #[test]
    fn test_reload_swaps_index_and_keeps_old_on_failure() {
        let root = TempDir::new().unwrap();
        write_package(&root.path().join("example/1.0.0"), "example", "1.0.0");
        let handle =
            IndexHandle::build(vec![root.path().to_path_buf()], LoadOptions::default()).unwrap();
        let before = handle.snapshot();

        write_package(&root.path().join("example/2.0.0"), "example", "2.0.0");
        handle.reload().unwrap();
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(before.len(), 1);

        fs::write(root.path().join("example/2.0.0").join(MANIFEST_FILE), "name: [").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_reloads_end_on_latest_scan() {
        let root = TempDir::new().unwrap();
        write_package(&root.path().join("example/1.0.0"), "example", "1.0.0");
        let handle =
            IndexHandle::build(vec![root.path().to_path_buf()], LoadOptions::default()).unwrap();
        write_package(&root.path().join("example/2.0.0"), "example", "2.0.0");

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4).map(|_| scope.spawn(|| handle.reload())).collect();
            for worker in workers {
                assert_eq!(worker.join().unwrap().unwrap().len(), 2);
            }
        });
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[test]
    fn test_out_of_range_constraint_fails_build_with_path() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("example/1.0.0");
        write_package(&dir, "example", "1.0.0");
        let manifest = fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!("{manifest}conditions:\n  kibana.version: \"^18446744073709551615.0.0\"\n"),
        )
        .unwrap();

        let err =
            PackageIndex::build(&[root.path().to_path_buf()], &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, IndexError::Package { .. }));
        assert_eq!(err.path(), dir);
    }
}
