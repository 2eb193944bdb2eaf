pub mod admission;
pub mod analyzer;
pub mod catalog;
pub mod crawler;
pub mod error;
pub mod findings;
pub mod identity;
pub mod ledger;
pub mod observation;

pub use catalog::IndicatorCatalog;
pub use crawler::{CrawlJob, CrawlOutcome, CrawlPhase, CrawlSummary, Crawler, ProgressCallback};
pub use error::{Result, ScanError};
pub use findings::{FindingValue, FindingsAccumulator, Fragment, FraudFindings};
pub use observation::PageObservation;
