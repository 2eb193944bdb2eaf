use std::collections::HashSet;
use std::sync::Mutex;
use url::Url;

/// Key a URL is deduplicated under: scheme dropped, host lower-cased,
/// query and fragment kept.
pub fn normalize_path(url: &Url) -> String {
    let mut key = url.host_str().unwrap_or_default().to_lowercase();
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = url.path();
    if path.is_empty() {
        key.push('/');
    } else {
        key.push_str(path);
    }
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        key.push('#');
        key.push_str(fragment);
    }
    key
}

/// Set of paths already claimed for fetching in one crawl job
#[derive(Debug, Default)]
pub struct VisitationLedger {
    visited: Mutex<HashSet<String>>,
}

impl VisitationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the URL visited. Only the first caller for a given path gets `true`.
    pub fn try_claim(&self, url: &Url) -> bool {
        let key = normalize_path(url);
        // Check and mark under the same guard
        let mut visited = self.visited.lock().unwrap_or_else(|e| e.into_inner());
        visited.insert(key)
    }

    pub fn len(&self) -> usize {
        self.visited.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
