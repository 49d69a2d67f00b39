//! # Application State
//!
//! [`AppState`] is built once at startup and shared with every handler behind an
//! `Arc`. The only part that changes at runtime is the index held by
//! [`IndexHandle`], which is replaced wholesale on reload.

use std::sync::Arc;

use crate::category::CategorySet;
use crate::config::Config;
use crate::index::{IndexError, IndexHandle, PackageIndex};

pub struct AppState {
    pub index: IndexHandle,
    pub categories: CategorySet,
    /// Precomputed `Cache-Control` value for cacheable responses.
    pub cache_control: String,
}

impl AppState {
    /// Scan the configured storage roots and build the initial state.
    pub fn build(config: Config) -> Result<Self, IndexError> {
        let index = IndexHandle::build(config.package_paths.clone(), config.load_options())?;
        Ok(Self {
            index,
            categories: config.category_set(),
            cache_control: cache_control_value(config.cache_time),
        })
    }

    pub fn snapshot(&self) -> Arc<PackageIndex> {
        self.index.snapshot()
    }
}

/// `max-age=<seconds>, public`
pub fn cache_control_value(seconds: u64) -> String {
    format!("max-age={seconds}, public")
}
