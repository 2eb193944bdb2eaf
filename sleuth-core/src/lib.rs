use colored::Colorize;

pub mod report;
pub mod scan;
pub mod supplement;

pub use report::{ReportFormat, ScanReport};
pub use scan::{ScanOptions, execute_scan};
pub use supplement::{
    Collaborators, DomainAgeSource, ScreenshotSource, Supplement, TrustSealSource,
};

/// Written to stderr; stdout carries only command output
pub fn print_banner() {
    eprintln!(
        "{} {}",
        "sleuth".bold().cyan(),
        format!("v{} - website fraud signal scanner", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
