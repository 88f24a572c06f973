//! Inbound path to real upstream host mapping

use std::collections::BTreeMap;

/// Static route table, read-only after startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<String, String>,
}

impl RouteTable {
    /// Create a route table from path → upstream base URL entries
    #[must_use]
    pub fn new(routes: BTreeMap<String, String>) -> Self {
        Self { routes }
    }

    /// Real upstream base URL for an inbound path (exact match, no query)
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.routes.get(path).map(String::as_str)
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no routes are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RouteTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(path, host)| (path.into(), host.into()))
                .collect(),
        )
    }
}
