use crate::admission::{AdmissionController, Reservation};
use crate::analyzer::{analyze_document, check_security};
use crate::catalog::IndicatorCatalog;
use crate::error::{Result, ScanError};
use crate::findings::{FindingsAccumulator, FraudFindings, keys};
use crate::identity;
use crate::ledger::VisitationLedger;
use crate::observation::PageObservation;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(&Url) + Send + Sync>;

const MAX_REDIRECTS: usize = 5;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector is valid"));

/// Settings for one crawl. Fixed once the crawl starts.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub root: Url,
    pub deadline: Duration,
    pub request_timeout: Duration,
    pub parallelism: usize,
    pub safety_cap: usize,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub drain_grace: Duration,
    pub max_body_bytes: usize,
}

impl CrawlJob {
    pub fn new(root: &str) -> Result<Self> {
        Ok(Self {
            root: normalize_root(root)?,
            deadline: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            parallelism: 4,
            safety_cap: 100,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::from_secs(1),
            drain_grace: Duration::from_secs(5),
            max_body_bytes: 5 * 1024 * 1024,
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_safety_cap(mut self, safety_cap: usize) -> Self {
        self.safety_cap = safety_cap;
        self
    }

    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = max;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Adds `https://` when no scheme is given and rejects anything that is not
/// an http(s) URL with a host.
pub fn normalize_root(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScanError::InvalidUrl("empty URL".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            trimmed,
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ScanError::InvalidUrl(format!("{}: missing host", trimmed))),
    }
}

/// Last two labels of a host name. IP addresses and single-label hosts are
/// returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    labels[labels.len() - 2..].join(".")
}

pub fn is_same_domain(url: &Url, base_domain: &str) -> bool {
    if let Some(host) = url.host_str() {
        let host = host.trim_end_matches('.').to_lowercase();
        return host == base_domain || host.ends_with(&format!(".{}", base_domain));
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrawlPhase {
    Seeding,
    Expanding,
    Draining,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub root: String,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub links_claimed: usize,
    pub fetches_shed: usize,
    pub peak_in_flight: usize,
    pub tasks_aborted: usize,
    pub deadline_hit: bool,
    pub phase: CrawlPhase,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub findings: FraudFindings,
    pub summary: CrawlSummary,
}

/// Everything the workers of one job share
struct JobState {
    client: Client,
    catalog: Arc<IndicatorCatalog>,
    ledger: VisitationLedger,
    admission: AdmissionController,
    findings: FindingsAccumulator,
    base_domain: String,
    request_timeout: Duration,
    max_body_bytes: usize,
    progress_callback: Option<ProgressCallback>,
    fetched: AtomicUsize,
    failed: AtomicUsize,
}

type Scheduled = Vec<(Url, Reservation)>;

pub struct Crawler {
    job: CrawlJob,
    catalog: Arc<IndicatorCatalog>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(job: CrawlJob, catalog: IndicatorCatalog) -> Self {
        Self {
            job,
            catalog: Arc::new(catalog),
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn job(&self) -> &CrawlJob {
        &self.job
    }

    fn build_client(&self, base_domain: &str) -> Result<Client> {
        let redirect_domain = base_domain.to_string();
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !is_same_domain(attempt.url(), &redirect_domain) {
                // Surfaces as a 3xx and ends up as a dead end
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        Ok(Client::builder()
            .timeout(self.job.request_timeout)
            .connect_timeout(self.job.request_timeout / 2)
            .pool_max_idle_per_host(self.job.parallelism)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .cookie_store(true)
            .redirect(redirect)
            .build()?)
    }

    pub async fn run(&self) -> Result<CrawlOutcome> {
        let started = Instant::now();
        let deadline = started + self.job.deadline;
        let root = self.job.root.clone();
        let host = root
            .host_str()
            .ok_or_else(|| ScanError::InvalidUrl(format!("{}: missing host", root)))?;
        let base_domain = registrable_domain(host);

        info!(
            "Starting crawl of {} (domain {}) with {} workers, deadline {:?}",
            root, base_domain, self.job.parallelism, self.job.deadline
        );

        let state = Arc::new(JobState {
            client: self.build_client(&base_domain)?,
            catalog: self.catalog.clone(),
            ledger: VisitationLedger::new(),
            admission: AdmissionController::new(
                self.job.parallelism,
                self.job.safety_cap,
                deadline,
            )
            .with_jitter(self.job.jitter_min, self.job.jitter_max),
            findings: FindingsAccumulator::new(),
            base_domain,
            request_timeout: self.job.request_timeout,
            max_body_bytes: self.job.max_body_bytes,
            progress_callback: self.progress_callback.clone(),
            fetched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let mut phase = CrawlPhase::Seeding;
        debug!("Phase {:?}", phase);
        let mut tasks: JoinSet<Scheduled> = JoinSet::new();
        state.ledger.try_claim(&root);
        match state.admission.try_reserve() {
            Some(reservation) => {
                tasks.spawn(visit(state.clone(), root.clone(), reservation));
            }
            None => warn!("Root fetch for {} was not admitted", root),
        }

        phase = CrawlPhase::Expanding;
        debug!("Phase {:?}", phase);
        let mut deadline_hit = false;
        let deadline_timer = sleep_until(deadline);
        tokio::pin!(deadline_timer);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    // Last worker finished and nothing new was scheduled
                    None => break,
                    Some(Ok(scheduled)) => {
                        for (url, reservation) in scheduled {
                            tasks.spawn(visit(state.clone(), url, reservation));
                        }
                    }
                    Some(Err(e)) => warn!("Crawl worker failed: {}", e),
                },
                _ = &mut deadline_timer => {
                    deadline_hit = true;
                    info!("Deadline reached, {} tasks still running", tasks.len());
                    break;
                }
            }
        }

        phase = CrawlPhase::Draining;
        debug!("Phase {:?}", phase);
        let mut tasks_aborted = 0;
        if deadline_hit {
            state.admission.close();
            let drain = async {
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        // Links found after the deadline are discarded with their reservations
                        Ok(scheduled) => drop(scheduled),
                        Err(e) => warn!("Crawl worker failed while draining: {}", e),
                    }
                }
            };
            if timeout(self.job.drain_grace, drain).await.is_err() {
                tasks_aborted = tasks.len();
                warn!(
                    "Grace period of {:?} elapsed, aborting {} stragglers",
                    self.job.drain_grace, tasks_aborted
                );
                tasks.shutdown().await;
            }
        }

        phase = CrawlPhase::Done;
        let findings = state.findings.snapshot();
        let summary = CrawlSummary {
            root: root.to_string(),
            pages_fetched: state.fetched.load(Ordering::SeqCst),
            pages_failed: state.failed.load(Ordering::SeqCst),
            links_claimed: state.ledger.len(),
            fetches_shed: state.admission.shed_count(),
            peak_in_flight: state.admission.peak_in_flight(),
            tasks_aborted,
            deadline_hit,
            phase,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Crawl complete. Fetched {} pages ({} failed) in {}ms",
            summary.pages_fetched, summary.pages_failed, summary.elapsed_ms
        );

        Ok(CrawlOutcome { findings, summary })
    }
}

/// One claimed URL: admit, fetch, analyze, merge, then claim whatever it links to
async fn visit(state: Arc<JobState>, url: Url, reservation: Reservation) -> Scheduled {
    let Some(admission) = state.admission.admit(reservation).await else {
        debug!("Not admitted: {}", url);
        return Vec::new();
    };

    if let Some(ref callback) = state.progress_callback {
        callback(&url);
    }

    let page = match fetch_page(&state, &url).await {
        Ok(page) => page,
        Err(e) => {
            warn!("Fetch failed for {}: {}", url, e);
            state.failed.fetch_add(1, Ordering::SeqCst);
            return Vec::new();
        }
    };
    state.fetched.fetch_add(1, Ordering::SeqCst);

    let links = process_page(&state, &page);
    drop(admission);

    schedule(&state, links)
}

async fn fetch_page(state: &JobState, url: &Url) -> Result<PageObservation> {
    debug!("Fetching {}", url);

    let request = state
        .client
        .get(url.clone())
        .headers(identity::request_headers())
        .build()?;
    let request_headers = request.headers().clone();
    let start = Instant::now();

    let fetch = async {
        let mut response = state.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = state.max_body_bytes.saturating_sub(body.len());
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!("Truncated body of {} at {} bytes", final_url, state.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok::<_, ScanError>(PageObservation {
            url: final_url,
            status_code: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
            headers,
            request_headers,
            elapsed: start.elapsed(),
        })
    };

    match timeout(state.request_timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Timeout(state.request_timeout)),
    }
}

/// Synchronous part of a visit; the parsed document never crosses an await
fn process_page(state: &JobState, page: &PageObservation) -> Vec<Url> {
    if !page.is_html() {
        debug!(
            "Skipping content analysis of {} ({:?})",
            page.url,
            page.content_type()
        );
        state
            .findings
            .merge(check_security(page, &state.catalog).add(keys::PAGES_ANALYZED, 1));
        return Vec::new();
    }

    let document = Html::parse_document(&page.body);
    state
        .findings
        .merge(analyze_document(page, &document, &state.catalog));
    extract_links(&document, &page.url, &state.base_domain)
}

fn schedule(state: &JobState, links: Vec<Url>) -> Scheduled {
    let mut scheduled = Vec::new();
    for link in links {
        if !state.ledger.try_claim(&link) {
            continue;
        }
        match state.admission.try_reserve() {
            Some(reservation) => scheduled.push((link, reservation)),
            None => debug!("Dropping {}: admission rejected", link),
        }
    }
    scheduled
}

pub fn extract_links(document: &Html, page_url: &Url, base_domain: &str) -> Vec<Url> {
    let mut links = Vec::new();
    for element in document.select(&LINK_SELECTOR) {
        if let Some(href) = element.value().attr("href")
            && let Some(absolute_url) = resolve_url(page_url, href)
        {
            if is_same_domain(&absolute_url, base_domain) {
                links.push(absolute_url);
            } else {
                debug!("Skipping off-domain link {}", absolute_url);
            }
        }
    }
    links
}

fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel: and in-page anchors
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}
