// Data computed outside the crawler and folded into the findings afterwards

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use sleuth_scanner::IndicatorCatalog;
use sleuth_scanner::findings::{FindingValue, FraudFindings, keys};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Looks up how many days ago a domain was registered (WHOIS or similar)
pub trait DomainAgeSource: Send + Sync {
    fn domain_age_days<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<i64, String>>;
}

/// Looks up a trust-seal registration for a domain. `Ok(None)` means the
/// registry has no entry.
pub trait TrustSealSource: Send + Sync {
    fn trust_seal<'a>(
        &'a self,
        domain: &'a str,
    ) -> BoxFuture<'a, Result<Option<serde_json::Value>, String>>;
}

/// Captures a screenshot of the scanned page and returns an identifier for
/// the stored image. `Ok(None)` means nothing was captured.
pub trait ScreenshotSource: Send + Sync {
    fn screenshot<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<String>, String>>;
}

/// External services a scan may consult. All optional.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub domain_age: Option<Arc<dyn DomainAgeSource>>,
    pub trust_seal: Option<Arc<dyn TrustSealSource>>,
    pub screenshot: Option<Arc<dyn ScreenshotSource>>,
}

impl Collaborators {
    pub fn with_domain_age(mut self, source: Arc<dyn DomainAgeSource>) -> Self {
        self.domain_age = Some(source);
        self
    }

    pub fn with_trust_seal(mut self, source: Arc<dyn TrustSealSource>) -> Self {
        self.trust_seal = Some(source);
        self
    }

    pub fn with_screenshot(mut self, source: Arc<dyn ScreenshotSource>) -> Self {
        self.screenshot = Some(source);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Supplement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_age_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_seal: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_id: Option<String>,
}

impl Supplement {
    /// Writes the supplementary values into the findings, overwriting any
    /// earlier value under the same keys.
    pub fn apply(&self, findings: &mut FraudFindings, catalog: &IndicatorCatalog) {
        if let Some(age) = self.domain_age_days {
            findings.insert(keys::DOMAIN_AGE, FindingValue::Number(age));
            findings.insert(
                keys::NEW_DOMAIN,
                FindingValue::Flag(age < catalog.min_domain_age_days),
            );
        }
        if let Some(ref seal) = self.trust_seal {
            findings.insert(keys::TRUST_SEAL, FindingValue::Json(seal.clone()));
        }
        if let Some(ref id) = self.screenshot_id {
            findings.insert(keys::SCREENSHOT_ID, FindingValue::Text(id.clone()));
        }
    }
}

/// Queries every configured collaborator concurrently. A source that fails,
/// or has not answered within `budget`, is logged and leaves its field empty.
pub async fn gather_supplement(
    collaborators: &Collaborators,
    domain: &str,
    page_url: &str,
    budget: Duration,
) -> Supplement {
    let age = async {
        let source = collaborators.domain_age.as_ref()?;
        let lookup = source.domain_age_days(domain).map(|r| r.map(Some));
        bounded("Domain age", domain, budget, lookup).await
    };

    let seal = async {
        let source = collaborators.trust_seal.as_ref()?;
        bounded("Trust seal", domain, budget, source.trust_seal(domain)).await
    };

    let screenshot = async {
        let source = collaborators.screenshot.as_ref()?;
        bounded("Screenshot", page_url, budget, source.screenshot(page_url)).await
    };

    let (domain_age_days, trust_seal, screenshot_id) = futures::join!(age, seal, screenshot);
    Supplement {
        domain_age_days,
        trust_seal,
        screenshot_id,
    }
}

async fn bounded<T>(
    what: &str,
    subject: &str,
    budget: Duration,
    lookup: impl Future<Output = Result<Option<T>, String>>,
) -> Option<T> {
    match timeout(budget, lookup).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("{} lookup for {} failed: {}", what, subject, e);
            None
        }
        Err(_) => {
            warn!("{} lookup for {} gave no answer within {:?}", what, subject, budget);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct FixedAge(i64);

    impl DomainAgeSource for FixedAge {
        fn domain_age_days<'a>(&'a self, _domain: &'a str) -> BoxFuture<'a, Result<i64, String>> {
            let age = self.0;
            async move { Ok(age) }.boxed()
        }
    }

    struct BrokenSeal;

    impl TrustSealSource for BrokenSeal {
        fn trust_seal<'a>(
            &'a self,
            _domain: &'a str,
        ) -> BoxFuture<'a, Result<Option<serde_json::Value>, String>> {
            async { Err("registry unreachable".to_string()) }.boxed()
        }
    }

    struct StalledSeal;

    impl TrustSealSource for StalledSeal {
        fn trust_seal<'a>(
            &'a self,
            _domain: &'a str,
        ) -> BoxFuture<'a, Result<Option<serde_json::Value>, String>> {
            futures::future::pending().boxed()
        }
    }

    struct StoredShot;

    impl ScreenshotSource for StoredShot {
        fn screenshot<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Option<String>, String>> {
            let id = format!("shot-{}", url.len());
            async move { Ok(Some(id)) }.boxed()
        }
    }

    const BUDGET: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_failing_source_leaves_field_empty() {
        let collaborators = Collaborators::default()
            .with_domain_age(Arc::new(FixedAge(30)))
            .with_trust_seal(Arc::new(BrokenSeal));

        let supplement =
            gather_supplement(&collaborators, "example.com", "https://example.com/", BUDGET).await;
        assert_eq!(supplement.domain_age_days, Some(30));
        assert!(supplement.trust_seal.is_none());
    }

    #[tokio::test]
    async fn test_no_sources_configured() {
        let supplement = gather_supplement(
            &Collaborators::default(),
            "example.com",
            "https://example.com/",
            BUDGET,
        )
        .await;
        assert_eq!(supplement, Supplement::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_source_abandoned_after_budget() {
        let collaborators = Collaborators::default()
            .with_domain_age(Arc::new(FixedAge(400)))
            .with_trust_seal(Arc::new(StalledSeal));

        let started = tokio::time::Instant::now();
        let supplement = gather_supplement(
            &collaborators,
            "example.com",
            "https://example.com/",
            Duration::from_secs(2),
        )
        .await;

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
        assert_eq!(supplement.domain_age_days, Some(400));
        assert!(supplement.trust_seal.is_none());
    }

    #[tokio::test]
    async fn test_screenshot_source_fills_id() {
        let collaborators = Collaborators::default().with_screenshot(Arc::new(StoredShot));

        let supplement =
            gather_supplement(&collaborators, "example.com", "https://example.com/", BUDGET).await;
        assert_eq!(supplement.screenshot_id.as_deref(), Some("shot-20"));
    }

    #[test]
    fn test_apply_flags_young_domain() {
        let mut findings = FraudFindings::new();
        let supplement = Supplement {
            domain_age_days: Some(30),
            trust_seal: Some(serde_json::json!({"logolevel": 1})),
            screenshot_id: Some("abc123".to_string()),
        };
        supplement.apply(&mut findings, &IndicatorCatalog::default());

        assert_eq!(findings.get(keys::DOMAIN_AGE), Some(&FindingValue::Number(30)));
        assert_eq!(findings.flag(keys::NEW_DOMAIN), Some(true));
        assert!(findings.get(keys::TRUST_SEAL).is_some());
        assert_eq!(
            findings.get(keys::SCREENSHOT_ID),
            Some(&FindingValue::Text("abc123".to_string()))
        );
    }

    #[test]
    fn test_apply_old_domain_not_new() {
        let mut findings = FraudFindings::new();
        Supplement {
            domain_age_days: Some(2000),
            ..Default::default()
        }
        .apply(&mut findings, &IndicatorCatalog::default());

        assert_eq!(findings.flag(keys::NEW_DOMAIN), Some(false));
    }
}
