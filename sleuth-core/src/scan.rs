use crate::report::ScanReport;
use crate::supplement::{Collaborators, gather_supplement};
use indicatif::{ProgressBar, ProgressStyle};
use sleuth_scanner::crawler::registrable_domain;
use sleuth_scanner::{CrawlJob, Crawler, IndicatorCatalog, ProgressCallback, Result, ScanError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Options for configuring a scan
pub struct ScanOptions {
    pub target: String,
    pub workers: usize,
    pub deadline: Duration,
    pub request_timeout: Duration,
    pub safety_cap: usize,
    pub max_jitter: Duration,
    pub catalog: IndicatorCatalog,
    pub show_progress_bars: bool,
}

impl ScanOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workers: 4,
            deadline: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            safety_cap: 100,
            max_jitter: Duration::from_secs(1),
            catalog: IndicatorCatalog::default(),
            show_progress_bars: false,
        }
    }

    pub fn build_job(&self) -> Result<CrawlJob> {
        Ok(CrawlJob::new(&self.target)?
            .with_parallelism(self.workers)
            .with_deadline(self.deadline)
            .with_request_timeout(self.request_timeout)
            .with_safety_cap(self.safety_cap)
            .with_jitter(Duration::ZERO, self.max_jitter))
    }
}

/// Crawls the target and queries the collaborators side by side, then merges
/// the supplementary data into the crawl findings. Collaborators get no more
/// time than the crawl deadline.
pub async fn execute_scan(options: ScanOptions, collaborators: &Collaborators) -> Result<ScanReport> {
    let job = options.build_job()?;
    let ScanOptions {
        catalog,
        show_progress_bars,
        ..
    } = options;

    let host = job
        .root
        .host_str()
        .ok_or_else(|| ScanError::InvalidUrl(format!("{}: missing host", job.root)))?;
    let domain = registrable_domain(host);
    let target = job.root.to_string();
    let lookup_budget = job.deadline;
    let started_at = chrono::Utc::now();

    // Single spinner for overall progress (only if enabled)
    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| ScanError::Other(format!("progress template: {}", e)))?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Scanning {}...", domain));
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));
    let mut crawler = Crawler::new(job, catalog.clone());
    if let Some(ref pb) = progress_bar {
        let pb_clone = pb.clone();
        let count_clone = processed_count.clone();
        let callback: ProgressCallback = Arc::new(move |url: &Url| {
            let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
            pb_clone.set_message(format!("Scanning... {} pages, at {}", count, url.path()));
        });
        crawler = crawler.with_progress_callback(callback);
    }

    // Lookups are bounded by the crawl deadline
    let (outcome, supplement) = futures::join!(
        crawler.run(),
        gather_supplement(collaborators, &domain, &target, lookup_budget)
    );
    let mut outcome = outcome?;
    supplement.apply(&mut outcome.findings, &catalog);

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Scan complete! {} pages analyzed",
            outcome.summary.pages_fetched
        ));
    }

    Ok(ScanReport {
        scan_id: uuid::Uuid::new_v4().to_string(),
        target,
        started_at: started_at.to_rfc3339(),
        finished_at: chrono::Utc::now().to_rfc3339(),
        findings: outcome.findings,
        summary: outcome.summary,
        supplement,
    })
}
