//! Closed set of category keys a package may declare, each with a display title.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category keys known to the registry, mapped to their display titles.
///
/// The set is passed explicitly to validation and aggregation so tests and
/// deployments can substitute their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet {
    titles: BTreeMap<String, String>,
}

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("aws", "AWS"),
    ("azure", "Azure"),
    ("cloud", "Cloud"),
    ("config_management", "Config management"),
    ("containers", "Containers"),
    ("crm", "CRM"),
    ("custom", "Custom"),
    ("datastore", "Datastore"),
    ("elastic_stack", "Elastic Stack"),
    ("google_cloud", "Google Cloud"),
    ("kubernetes", "Kubernetes"),
    ("languages", "Languages"),
    ("message_queue", "Message Queue"),
    ("monitoring", "Monitoring"),
    ("network", "Network"),
    ("notification", "Notification"),
    ("os_system", "OS & System"),
    ("productivity", "Productivity"),
    ("security", "Security"),
    ("support", "Support"),
    ("ticketing", "Ticketing"),
    ("version_control", "Version Control"),
    ("web", "Web"),
    // Legacy keys still used by older packages
    ("logs", "Logs"),
    ("metrics", "Metrics"),
];

impl CategorySet {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            titles: entries
                .into_iter()
                .map(|(key, title)| (key.into(), title.into()))
                .collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.titles.contains_key(key)
    }

    pub fn title(&self, key: &str) -> Option<&str> {
        self.titles.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied())
    }
}
