//! Deterministic recursive directory walk shared by asset discovery and archiving.
//!
//! Entries are yielded depth-first with siblings sorted by file name, so a
//! directory is always followed directly by its own contents:
//!
//! ```text
//! docs/
//! docs/README.md
//! manifest.yml
//! ```

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One filesystem entry below a walk root.
#[derive(Debug)]
pub struct WalkEntry {
    /// Full on-disk path.
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated, without a trailing slash.
    pub relative_path: String,
    pub is_dir: bool,
    pub metadata: Metadata,
}

impl WalkEntry {
    pub fn is_file(&self) -> bool {
        self.metadata.is_file()
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// Walk everything below `root` (the root itself excluded) in sorted order.
///
/// Symbolic links are reported as themselves and never followed.
pub fn walk_sorted(root: &Path) -> impl Iterator<Item = io::Result<WalkEntry>> + '_ {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .map(move |entry| {
            let entry = entry.map_err(io::Error::from)?;
            let metadata = entry.metadata().map_err(io::Error::from)?;
            let relative = entry.path().strip_prefix(root).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "walk entry '{}' is outside of '{}'",
                        entry.path().display(),
                        root.display()
                    ),
                )
            })?;

            Ok(WalkEntry {
                relative_path: relative_to_slash(relative),
                is_dir: entry.file_type().is_dir(),
                path: entry.into_path(),
                metadata,
            })
        })
}

fn relative_to_slash(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
