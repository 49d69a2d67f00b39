//! Request handlers for the registry API.
//!
//! Every successful response except `/health` carries
//! `Cache-Control: max-age=<cache_time>, public`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use semver::Version;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::aggregate::aggregate_categories;
use crate::archive::archive_body;
use crate::error::{AppError, AppResult};
use crate::package::{Package, PackageSummary};
use crate::query::{search, Filter};
use crate::state::AppState;
use crate::version::parse_version;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

fn cached(state: &AppState, body: impl IntoResponse) -> Response {
    ([(header::CACHE_CONTROL, state.cache_control.clone())], body).into_response()
}

fn parse_path_version(input: &str) -> AppResult<Version> {
    parse_version(input).map_err(|source| AppError::InvalidVersion {
        input: input.to_string(),
        source,
    })
}

/// Resolve `(name, version)` in the current index: 400 for a malformed
/// version, then 404 for an unknown pair.
fn resolve(state: &AppState, name: &str, version: &str) -> AppResult<Arc<Package>> {
    let parsed = parse_path_version(version)?;
    state
        .snapshot()
        .get(name, &parsed)
        .cloned()
        .ok_or_else(|| AppError::PackageNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })
}

/// Searches the index.
///
/// # Route
/// `GET /search`
///
/// # Query Parameters
/// * `package` - exact package name
/// * `category` - category key the package must declare
/// * `kibana.version` (or `kibana`) - only packages compatible with this version
/// * `experimental`, `internal` - include experimental or internal packages
/// * `all` - return every matching version instead of the newest per name
///
/// # Example Request
/// ```text
/// GET /search?kibana.version=7.2.1&category=logs
/// ```
pub async fn search_packages(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let filter = Filter::from_query(&params)?;
    let index = state.snapshot();
    let results: Vec<PackageSummary> = search(&index, &filter)
        .iter()
        .map(|p| p.summary())
        .collect();

    debug!(filter = ?filter, results = results.len(), "Search completed");
    Ok(cached(&state, Json(results)))
}

/// Category counts over the same filters as `/search`, sorted by title.
///
/// # Route
/// `GET /categories`
pub async fn list_categories(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let filter = Filter::from_query(&params)?;
    let counts = aggregate_categories(&state.snapshot(), &filter, &state.categories);
    Ok(cached(&state, Json(counts)))
}

/// Full record of one package version.
///
/// # Route
/// `GET /package/{name}/{version}/`
pub async fn package_info(
    AxumPath((name, version)): AxumPath<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let package = resolve(&state, &name, &version)?;
    Ok(cached(&state, Json(package.as_ref())))
}

/// Streams a package version as a `.tar.gz`.
///
/// # Route
/// `GET /epr/{name}/{name}-{version}.tar.gz`
///
/// # Behavior
/// 1. A file name not of the form `{name}-{version}.tar.gz` is not found
/// 2. A malformed version is rejected before any lookup
/// 3. The version must exist in the index and on disk
/// 4. The archive is built while it is sent; later failures truncate the body
pub async fn download_archive(
    AxumPath((name, file)): AxumPath<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let not_found = || AppError::PackageNotFound {
        name: name.clone(),
        version: file.clone(),
    };

    let version = file
        .strip_suffix(ARCHIVE_SUFFIX)
        .and_then(|stem| stem.strip_prefix(name.as_str()))
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(not_found)?;
    let package = resolve(&state, &name, version)?;

    let base_path = package.base_path().to_path_buf();
    match tokio::fs::metadata(&base_path).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(not_found()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                name = %package.name,
                version = %package.version,
                path = %base_path.display(),
                "Indexed package directory is missing"
            );
            return Err(not_found());
        }
        Err(e) => return Err(AppError::Io(e)),
    }

    debug!(name = %package.name, version = %package.version, "Streaming package archive");
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CACHE_CONTROL, state.cache_control.clone()),
        ],
        archive_body(base_path),
    )
        .into_response())
}

#[derive(Serialize)]
struct ServiceInfo {
    #[serde(rename = "service.name")]
    service_name: &'static str,
    version: &'static str,
}

/// # Route
/// `GET /`
pub async fn service_info(State(state): State<Arc<AppState>>) -> Response {
    cached(
        &state,
        Json(ServiceInfo {
            service_name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// # Route
/// `GET /health`
pub async fn health() -> Response {
    Json(json!({"status": "healthy"})).into_response()
}
