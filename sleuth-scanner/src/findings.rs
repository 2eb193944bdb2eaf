// Shared fraud findings and the accumulator every crawl worker merges into

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Indicator names written by the crawler and by post-crawl supplements
pub mod keys {
    pub const FOUND_KEYWORDS: &str = "FoundKeywords";
    pub const HAS_HIDDEN_ELEMENTS: &str = "HasHiddenElements";
    pub const HIDDEN_ELEMENTS: &str = "HiddenElements";
    pub const HAS_CONTACT_INFO: &str = "HasContactInfo";
    pub const CONTACT_INFO: &str = "ContactInfo";
    pub const UNSECURE_CONNECTION: &str = "UnsecureConnection";
    pub const SECURE_CONNECTION: &str = "SecureConnection";
    pub const PAGES_ANALYZED: &str = "PagesAnalyzed";
    pub const DOMAIN_AGE: &str = "DomainAge";
    pub const NEW_DOMAIN: &str = "NewDomain";
    pub const TRUST_SEAL: &str = "TrustSeal";
    pub const SCREENSHOT_ID: &str = "ScreenshotId";

    pub const MISSING_HEADER_PREFIX: &str = "MissingHeader_";

    pub fn missing_header(name: &str) -> String {
        format!("{}{}", MISSING_HEADER_PREFIX, name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindingValue {
    Flag(bool),
    Items(BTreeSet<String>),
    Count(u64),
    Number(i64),
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FindingKind {
    Flag,
    Items,
    Count,
    Number,
    Text,
    Json,
}

impl FindingValue {
    fn kind(&self) -> FindingKind {
        match self {
            FindingValue::Flag(_) => FindingKind::Flag,
            FindingValue::Items(_) => FindingKind::Items,
            FindingValue::Count(_) => FindingKind::Count,
            FindingValue::Number(_) => FindingKind::Number,
            FindingValue::Text(_) => FindingKind::Text,
            FindingValue::Json(_) => FindingKind::Json,
        }
    }
}

/// How a single fragment entry combines with what is already stored
#[derive(Debug, Clone, PartialEq)]
pub enum FindingUpdate {
    /// Set union with any items already recorded
    Union(BTreeSet<String>),
    /// True once any page reports true
    Any(bool),
    /// True only while every page reports true
    All(bool),
    /// Added to the running count
    Add(u64),
    /// Overwrites whatever is stored
    Replace(FindingValue),
}

impl FindingUpdate {
    /// Kind the stored value must already have, if any
    fn required_kind(&self) -> Option<FindingKind> {
        match self {
            FindingUpdate::Union(_) => Some(FindingKind::Items),
            FindingUpdate::Any(_) | FindingUpdate::All(_) => Some(FindingKind::Flag),
            FindingUpdate::Add(_) => Some(FindingKind::Count),
            FindingUpdate::Replace(_) => None,
        }
    }

    fn resulting_kind(&self) -> FindingKind {
        match self {
            FindingUpdate::Replace(value) => value.kind(),
            other => other.required_kind().unwrap_or(FindingKind::Json),
        }
    }

    fn into_value(self) -> FindingValue {
        match self {
            FindingUpdate::Union(items) => FindingValue::Items(items),
            FindingUpdate::Any(flag) | FindingUpdate::All(flag) => FindingValue::Flag(flag),
            FindingUpdate::Add(count) => FindingValue::Count(count),
            FindingUpdate::Replace(value) => value,
        }
    }

    fn apply_to(self, current: &mut FindingValue) {
        match (current, self) {
            (FindingValue::Items(existing), FindingUpdate::Union(items)) => existing.extend(items),
            (FindingValue::Flag(existing), FindingUpdate::Any(flag)) => *existing |= flag,
            (FindingValue::Flag(existing), FindingUpdate::All(flag)) => *existing &= flag,
            (FindingValue::Count(existing), FindingUpdate::Add(count)) => {
                *existing = existing.saturating_add(count)
            }
            (current, FindingUpdate::Replace(value)) => *current = value,
            // Kinds are checked before anything is applied
            _ => {}
        }
    }
}

/// The findings produced from a single page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    entries: Vec<(String, FindingUpdate)>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, update: FindingUpdate) {
        self.entries.push((key.into(), update));
    }

    pub fn union<I, S>(mut self, key: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(key, FindingUpdate::Union(items.into_iter().map(Into::into).collect()));
        self
    }

    pub fn any(mut self, key: &str, flag: bool) -> Self {
        self.push(key, FindingUpdate::Any(flag));
        self
    }

    pub fn all(mut self, key: &str, flag: bool) -> Self {
        self.push(key, FindingUpdate::All(flag));
        self
    }

    pub fn add(mut self, key: &str, count: u64) -> Self {
        self.push(key, FindingUpdate::Add(count));
        self
    }

    pub fn extend(&mut self, other: Fragment) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[(String, FindingUpdate)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Indicator name to value, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FraudFindings(BTreeMap<String, FindingValue>);

impl FraudFindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FindingValue> {
        self.0.get(key)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(FindingValue::Flag(flag)) => Some(*flag),
            _ => None,
        }
    }

    pub fn items(&self, key: &str) -> Option<&BTreeSet<String>> {
        match self.0.get(key) {
            Some(FindingValue::Items(items)) => Some(items),
            _ => None,
        }
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        match self.0.get(key) {
            Some(FindingValue::Count(count)) => Some(*count),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FindingValue) {
        self.0.insert(key.into(), value);
    }

    /// Names of the headers flagged as missing from outbound requests
    pub fn missing_headers(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, value)| matches!(value, FindingValue::Flag(true)))
            .filter_map(|(key, _)| key.strip_prefix(keys::MISSING_HEADER_PREFIX))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FindingValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies a fragment as a unit. Returns false, leaving the map untouched,
    /// when any entry conflicts with the kind already stored under its key.
    fn apply(&mut self, fragment: Fragment) -> bool {
        let mut planned: HashMap<&str, FindingKind> = HashMap::new();
        for (key, update) in &fragment.entries {
            if key.is_empty() {
                warn!("Ignoring fragment with an empty indicator name");
                return false;
            }
            let stored = planned
                .get(key.as_str())
                .copied()
                .or_else(|| self.0.get(key).map(FindingValue::kind));
            if let (Some(stored), Some(required)) = (stored, update.required_kind())
                && stored != required
            {
                warn!(
                    "Ignoring fragment: {} holds {:?} but update expects {:?}",
                    key, stored, required
                );
                return false;
            }
            planned.insert(key.as_str(), update.resulting_kind());
        }

        for (key, update) in fragment.entries {
            match self.0.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(update.into_value());
                }
                Entry::Occupied(mut slot) => update.apply_to(slot.get_mut()),
            }
        }
        true
    }
}

/// The one lock every worker merges through. It is only ever held for the
/// length of a single merge, never across a fetch.
#[derive(Debug, Default)]
pub struct FindingsAccumulator {
    findings: Mutex<FraudFindings>,
}

impl FindingsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, fragment: Fragment) -> bool {
        if fragment.is_empty() {
            return true;
        }
        self.lock().apply(fragment)
    }

    pub fn insert(&self, key: impl Into<String>, value: FindingValue) {
        self.lock().insert(key, value);
    }

    pub fn snapshot(&self) -> FraudFindings {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, FraudFindings> {
        // A panicking worker cannot leave a half-applied fragment behind
        self.findings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
