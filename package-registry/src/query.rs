//! Search over a [`PackageIndex`] snapshot.
//!
//! Query parameters are validated once into a [`Filter`]. The same filter drives
//! `/search` and `/categories`, so both endpoints reject bad input with the same
//! [`QueryError`].

use std::collections::HashMap;
use std::sync::Arc;

use semver::Version;

use crate::index::PackageIndex;
use crate::package::{Package, Release};
use crate::version::parse_version;

pub const PARAM_PACKAGE: &str = "package";
pub const PARAM_CATEGORY: &str = "category";
pub const PARAM_KIBANA_VERSION: &str = "kibana.version";
/// Older clients send the bare product name.
pub const PARAM_KIBANA_LEGACY: &str = "kibana";
pub const PARAM_EXPERIMENTAL: &str = "experimental";
pub const PARAM_INTERNAL: &str = "internal";
pub const PARAM_ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid '{name}' query param: '{value}'")]
    InvalidParameter { name: String, value: String },
}

impl QueryError {
    fn invalid(name: &str, value: &str) -> Self {
        QueryError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Validated search parameters. All predicates combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub package: Option<String>,
    pub category: Option<String>,
    pub kibana_version: Option<Version>,
    /// Include experimental packages.
    pub experimental: bool,
    /// Include internal packages.
    pub internal: bool,
    /// Keep every matching version instead of only the newest per name.
    pub all: bool,
}

impl Filter {
    /// Build a filter from raw query parameters. Empty values count as absent.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let get = |name: &str| params.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let kibana_version = get(PARAM_KIBANA_VERSION)
            .map(|v| (PARAM_KIBANA_VERSION, v))
            .or_else(|| get(PARAM_KIBANA_LEGACY).map(|v| (PARAM_KIBANA_LEGACY, v)))
            .map(|(name, value)| {
                parse_version(value).map_err(|_| QueryError::invalid(name, value))
            })
            .transpose()?;

        let flag = |name: &str| {
            get(name)
                .map(|value| parse_bool_param(name, value))
                .transpose()
                .map(|v| v.unwrap_or(false))
        };

        Ok(Self {
            package: get(PARAM_PACKAGE).map(str::to_string),
            category: get(PARAM_CATEGORY).map(str::to_string),
            kibana_version,
            experimental: flag(PARAM_EXPERIMENTAL)?,
            internal: flag(PARAM_INTERNAL)?,
            all: flag(PARAM_ALL)?,
        })
    }

    /// Every predicate except the newest-version collapse.
    pub fn accepts(&self, package: &Package) -> bool {
        if self.package.as_deref().is_some_and(|name| name != package.name) {
            return false;
        }
        if self
            .category
            .as_deref()
            .is_some_and(|category| !package.has_category(category))
        {
            return false;
        }
        if !self.experimental && package.release == Release::Experimental {
            return false;
        }
        if !self.internal && package.internal {
            return false;
        }
        package.is_compatible_with(self.kibana_version.as_ref())
    }
}

/// Boolean query parameter accepting the usual spellings:
/// `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool_param(name: &str, value: &str) -> Result<bool, QueryError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(QueryError::invalid(name, value)),
    }
}

/// Run `filter` against `index`.
///
/// Results are ordered by name, then ascending version. Unless `filter.all` is
/// set, each name contributes only its newest accepted version.
pub fn search(index: &PackageIndex, filter: &Filter) -> Vec<Arc<Package>> {
    let mut results = Vec::new();
    for (name, versions) in index.iter() {
        if filter.package.as_deref().is_some_and(|p| p != name) {
            continue;
        }

        let mut accepted = versions.iter().filter(|p| filter.accepts(p));
        if filter.all {
            results.extend(accepted.cloned());
        } else if let Some(newest) = accepted.next_back() {
            // Versions are stored ascending, so the last accepted one is the maximum.
            results.push(Arc::clone(newest));
        }
    }
    results
}
