//! Per-category package counts for `/categories`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::category::CategorySet;
use crate::index::PackageIndex;
use crate::query::{search, Filter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub id: String,
    pub title: String,
    pub count: usize,
}

/// Count distinct package names per category over the search results for
/// `filter`, ignoring its `category` predicate.
///
/// Only categories with at least one package are listed, sorted by title.
pub fn aggregate_categories(
    index: &PackageIndex,
    filter: &Filter,
    categories: &CategorySet,
) -> Vec<CategoryCount> {
    let filter = Filter {
        category: None,
        ..filter.clone()
    };

    let results = search(index, &filter);
    let mut names_by_category: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for package in &results {
        for category in &package.categories {
            names_by_category
                .entry(category.as_str())
                .or_default()
                .insert(package.name.as_str());
        }
    }

    let mut counts: Vec<CategoryCount> = names_by_category
        .into_iter()
        .map(|(id, names)| CategoryCount {
            id: id.to_string(),
            title: categories.title(id).unwrap_or(id).to_string(),
            count: names.len(),
        })
        .collect();
    counts.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
    counts
}
