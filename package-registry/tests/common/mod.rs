//! Common test utilities and helpers
//!
//! Fixture package stores are written into a `TempDir` and served through the
//! real router with `axum_test::TestServer`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum_test::TestServer;
use package_registry::{router, AppState, Config};
use tempfile::TempDir;

pub const CACHE_TIME: u64 = 1;

/// A package store on disk plus the server answering for it.
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub server: TestServer,
}

impl TestSetup {
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Manifest for a minimal valid package. `extra` is appended verbatim.
pub fn manifest(name: &str, version: &str, extra: &str) -> String {
    format!(
        "format_version: 1.0.0\n\
         name: {name}\n\
         title: {name} integration\n\
         version: {version}\n\
         description: This is the {name} integration.\n\
         {extra}"
    )
}

/// Write a package with `manifest.yml` and `docs/README.md` into `dir`.
pub fn write_package(dir: &Path, manifest: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir.join("docs"))?;
    fs::write(dir.join("manifest.yml"), manifest)?;
    fs::write(dir.join("docs/README.md"), "# Example\n\nThis is the example package.\n")?;
    Ok(dir.to_path_buf())
}

/// `example` 1.0.0 (logs, no constraint) and 2.0.0 (metrics, `^7.x.x`).
pub fn write_example_store(root: &Path) -> Result<()> {
    write_package(
        &root.join("example/1.0.0"),
        &manifest("example", "1.0.0", "categories: [\"logs\"]\n"),
    )?;
    write_package(
        &root.join("example/2.0.0"),
        &manifest(
            "example",
            "2.0.0",
            "categories: [\"metrics\"]\nconditions:\n  kibana.version: \"^7.x.x\"\n",
        ),
    )?;
    Ok(())
}

/// Build the index over `temp_dir` and wrap the router in a test server.
pub fn serve(temp_dir: TempDir) -> Result<TestSetup> {
    let config = Config {
        package_paths: vec![temp_dir.path().to_path_buf()],
        cache_time: CACHE_TIME,
        ..Config::default()
    };
    let state = Arc::new(AppState::build(config)?);
    let server = TestServer::new(router(Arc::clone(&state)))?;

    Ok(TestSetup {
        temp_dir,
        state,
        server,
    })
}

/// Server over the two-version `example` store.
pub fn create_example_setup() -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    write_example_store(temp_dir.path())?;
    serve(temp_dir)
}
