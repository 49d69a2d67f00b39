//! Archive download tests for `/epr/{name}/{name}-{version}.tar.gz`.

use std::fs;
use std::io::Read;

use flate2::read::GzDecoder;
use serde_json::Value;
use tempfile::TempDir;

mod common;
use common::{create_example_setup, manifest, serve, write_package};

/// `(name, size)` of every member, in archive order.
fn members(data: &[u8]) -> Vec<(String, u64)> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let name = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
            (name, entry.header().size().unwrap())
        })
        .collect()
}

#[tokio::test]
async fn test_archive_lists_package_contents() {
    let setup = create_example_setup().unwrap();
    let package_dir = setup.root().join("example/1.0.0");

    let response = setup.server.get("/epr/example/example-1.0.0.tar.gz").await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/gzip");
    assert_eq!(response.header("cache-control"), "max-age=1, public");

    let readme_size = fs::metadata(package_dir.join("docs/README.md")).unwrap().len();
    let manifest_size = fs::metadata(package_dir.join("manifest.yml")).unwrap().len();
    assert_eq!(
        members(response.as_bytes()),
        vec![
            ("docs/".to_string(), 0),
            ("docs/README.md".to_string(), readme_size),
            ("manifest.yml".to_string(), manifest_size),
        ]
    );
}

#[tokio::test]
async fn test_archive_is_reproducible() {
    let setup = create_example_setup().unwrap();

    let first = setup.server.get("/epr/example/example-2.0.0.tar.gz").await;
    let second = setup.server.get("/epr/example/example-2.0.0.tar.gz").await;
    first.assert_status_ok();
    second.assert_status_ok();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[tokio::test]
async fn test_archive_content_matches_disk() {
    let setup = create_example_setup().unwrap();
    let response = setup.server.get("/epr/example/example-1.0.0.tar.gz").await;
    let bytes = response.as_bytes();

    let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
    let mut found = false;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path_bytes().as_ref() == b"manifest.yml" {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            let on_disk =
                fs::read_to_string(setup.root().join("example/1.0.0/manifest.yml")).unwrap();
            assert_eq!(content, on_disk);
            found = true;
        }
    }
    assert!(found);
}

#[tokio::test]
async fn test_flat_layout_archive() {
    let temp_dir = TempDir::new().unwrap();
    let dir = write_package(
        &temp_dir.path().join("foo-0.1.0"),
        &manifest("foo", "0.1.0", ""),
    )
    .unwrap();
    fs::create_dir_all(dir.join("dataset/log/elasticsearch/ingest-pipeline")).unwrap();
    fs::write(
        dir.join("dataset/log/manifest.yml"),
        "title: Log\ntype: logs\nstreams:\n  - input: logfile\n",
    )
    .unwrap();
    fs::write(
        dir.join("dataset/log/elasticsearch/ingest-pipeline/default.json"),
        "{}",
    )
    .unwrap();
    let setup = serve(temp_dir).unwrap();

    let response = setup.server.get("/epr/foo/foo-0.1.0.tar.gz").await;
    response.assert_status_ok();

    let names: Vec<String> = members(response.as_bytes())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        names,
        vec![
            "dataset/",
            "dataset/log/",
            "dataset/log/elasticsearch/",
            "dataset/log/elasticsearch/ingest-pipeline/",
            "dataset/log/elasticsearch/ingest-pipeline/default.json",
            "dataset/log/manifest.yml",
            "docs/",
            "docs/README.md",
            "manifest.yml",
        ]
    );
}

#[tokio::test]
async fn test_invalid_version_is_checked_before_existence() {
    let setup = create_example_setup().unwrap();

    let response = setup
        .server
        .get("/epr/example/example-a.b.c.tar.gz")
        .expect_failure()
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "invalid_version");

    let response = setup
        .server
        .get("/epr/missing/missing-a.b.c.tar.gz")
        .expect_failure()
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_unknown_artifacts_are_not_found() {
    let setup = create_example_setup().unwrap();

    for path in [
        "/epr/example/example-999.0.2.tar.gz",
        "/epr/example/missing-0.1.2.tar.gz",
        "/epr/missing/missing-1.0.0.tar.gz",
        "/epr/example/example-1.0.0.zip",
    ] {
        let response = setup.server.get(path).expect_failure().await;
        response.assert_status_not_found();
    }
}

#[tokio::test]
async fn test_deleted_package_directory_is_not_found() {
    let setup = create_example_setup().unwrap();
    fs::remove_dir_all(setup.root().join("example/1.0.0")).unwrap();

    let response = setup
        .server
        .get("/epr/example/example-1.0.0.tar.gz")
        .expect_failure()
        .await;
    response.assert_status_not_found();
}
