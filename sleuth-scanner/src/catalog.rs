// Indicator catalog: the read-only word lists every analysis pass works from

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the content analyzer.
///
/// Every field is optional when deserializing; anything missing falls back to
/// the built-in defaults, so a catalog file only needs to list what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorCatalog {
    pub suspicious_keywords: Vec<String>,
    pub hidden_markers: Vec<String>,
    pub suspicious_headers: Vec<String>,
    pub contact_patterns: Vec<String>,
    /// Minimum age in days for a domain to be considered trustworthy
    pub min_domain_age_days: i64,
}

impl Default for IndicatorCatalog {
    fn default() -> Self {
        Self {
            suspicious_keywords: to_strings(&[
                "100% safe",
                "guaranteed profit",
                "limited offer",
                "won't believe",
                "click here",
                "instant money",
                "risk-free",
                "double your",
                "earn cash",
            ]),
            hidden_markers: to_strings(&[
                "display:none",
                "visibility:hidden",
                "opacity:0",
                "height:0",
                "width:0",
                "position:absolute",
                "clip:rect(0,0,0,0)",
                "hidden",
                "aria-hidden",
            ]),
            suspicious_headers: to_strings(&[
                "User-Agent",
                "Accept-Language",
                "Accept-Encoding",
                "Referer",
                "DNT",
                "X-Requested-With",
            ]),
            contact_patterns: to_strings(&[
                "contact", "about", "support", "help", "email", "phone", "address", "تماس با",
            ]),
            min_domain_age_days: 120,
        }
    }
}

impl IndicatorCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        let lists = [
            ("suspicious_keywords", &self.suspicious_keywords),
            ("hidden_markers", &self.hidden_markers),
            ("suspicious_headers", &self.suspicious_headers),
            ("contact_patterns", &self.contact_patterns),
        ];
        for (name, list) in lists {
            // An empty entry would match every page
            if list.iter().any(|entry| entry.trim().is_empty()) {
                return Err(ScanError::Catalog(format!("{} contains an empty entry", name)));
            }
        }
        if self.min_domain_age_days < 0 {
            return Err(ScanError::Catalog(
                "min_domain_age_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_catalog_keeps_defaults() {
        let catalog =
            IndicatorCatalog::from_json(r#"{"suspicious_keywords": ["free bitcoin"]}"#).unwrap();

        assert_eq!(catalog.suspicious_keywords, vec!["free bitcoin".to_string()]);
        assert_eq!(catalog.min_domain_age_days, 120);
        assert!(catalog.hidden_markers.contains(&"display:none".to_string()));
    }

    #[test]
    fn test_empty_entry_rejected() {
        let result = IndicatorCatalog::from_json(r#"{"contact_patterns": ["contact", " "]}"#);
        assert!(matches!(result, Err(ScanError::Catalog(_))));
    }

    #[test]
    fn test_negative_age_rejected() {
        let result = IndicatorCatalog::from_json(r#"{"min_domain_age_days": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_catalog_serializes() {
        let json = IndicatorCatalog::default().to_json().unwrap();
        let back = IndicatorCatalog::from_json(&json).unwrap();
        assert_eq!(back, IndicatorCatalog::default());
    }
}
