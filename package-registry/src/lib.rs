//! # Package Registry
//!
//! Indexes a tree of versioned integration packages on disk and serves it over
//! HTTP:
//!
//! - `GET /search` filters packages by name, category, compatibility and
//!   release stage, keeping the newest version per name by default
//! - `GET /categories` counts packages per category under the same filters
//! - `GET /package/{name}/{version}/` returns one full package record
//! - `GET /epr/{name}/{name}-{version}.tar.gz` streams the package as a tarball
//!
//! The index is built once at startup from one or more storage roots and is
//! never mutated; a rebuild replaces it wholesale (see [`index::IndexHandle`]).

pub mod aggregate;
pub mod archive;
pub mod category;
pub mod config;
pub mod error;
pub mod handlers;
pub mod index;
pub mod package;
pub mod query;
pub mod reload;
pub mod server;
pub mod state;
pub mod version;
pub mod walk;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use index::{IndexError, IndexHandle, PackageIndex};
pub use package::{load_package, LoadOptions, Package, Release};
pub use server::{router, run_server};
pub use state::AppState;
