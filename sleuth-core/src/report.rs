// Report rendering for finished scans

use crate::supplement::Supplement;
use colored::Colorize;
use serde::Serialize;
use sleuth_scanner::findings::{FindingValue, FraudFindings, keys};
use sleuth_scanner::CrawlSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// A finished scan: what was found plus how the crawl went
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub target: String,
    pub started_at: String,
    pub finished_at: String,
    pub findings: FraudFindings,
    pub summary: CrawlSummary,
    pub supplement: Supplement,
}

pub fn generate_text_report(report: &ScanReport) -> String {
    let findings = &report.findings;
    let mut out = String::new();

    out.push_str(RULE);
    out.push('\n');
    out.push_str("                        SLEUTH FRAUD ANALYSIS REPORT\n");
    out.push_str(RULE);
    out.push_str("\n\n");

    out.push_str(&format!("Scan ID:      {}\n", report.scan_id));
    out.push_str(&format!("Target:       {}\n", report.target));
    out.push_str(&format!("Started:      {}\n", report.started_at));
    out.push_str(&format!("Finished:     {}\n", report.finished_at));
    out.push_str(&format!(
        "Pages:        {} analyzed, {} failed\n",
        report.summary.pages_fetched, report.summary.pages_failed
    ));
    if report.summary.deadline_hit {
        out.push_str(&format!(
            "Coverage:     {}\n",
            "partial (deadline reached)".yellow()
        ));
    }
    out.push('\n');

    out.push_str(RULE);
    out.push('\n');
    out.push_str("FINDINGS\n");
    out.push_str(RULE);
    out.push_str("\n\n");

    let mut warnings = 0;

    warnings += push_items(&mut out, "Suspicious Keywords", findings.items(keys::FOUND_KEYWORDS));
    warnings += push_items(&mut out, "Hidden Elements", findings.items(keys::HIDDEN_ELEMENTS));

    if findings.flag(keys::HAS_CONTACT_INFO) != Some(true) {
        warnings += 1;
        out.push_str(&format!("{} No contact information found\n\n", "[!]".red()));
    } else if let Some(contacts) = findings.items(keys::CONTACT_INFO) {
        out.push_str(&format!("Contact information ({}):\n", contacts.len()));
        for contact in contacts {
            out.push_str(&format!("  - {}\n", contact));
        }
        out.push('\n');
    }

    if findings.flag(keys::UNSECURE_CONNECTION) == Some(true) {
        warnings += 1;
        out.push_str(&format!(
            "{} Non-HTTPS connection detected\n\n",
            "[!]".red()
        ));
    }

    if let Some(FindingValue::Number(age)) = findings.get(keys::DOMAIN_AGE) {
        if findings.flag(keys::NEW_DOMAIN) == Some(true) {
            warnings += 1;
            out.push_str(&format!(
                "{} Domain age: only {} days old\n\n",
                "[!]".red(),
                age
            ));
        } else {
            out.push_str(&format!("Domain age: {} days\n\n", age));
        }
    }

    if let Some(FindingValue::Json(seal)) = findings.get(keys::TRUST_SEAL) {
        out.push_str(&format!("Trust seal: {}\n\n", seal));
    }

    let missing = findings.missing_headers();
    if !missing.is_empty() {
        out.push_str(&format!("Request headers not sent ({}):\n", missing.len()));
        for header in missing {
            out.push_str(&format!("  - {}\n", header));
        }
        out.push('\n');
    }

    if warnings == 0 {
        out.push_str(&format!("{}\n\n", "No fraud indicators found.".green()));
    }

    out.push_str(RULE);
    out.push('\n');
    out.push_str("                          End of Report\n");
    out.push_str(RULE);
    out.push('\n');
    out
}

fn push_items(
    out: &mut String,
    title: &str,
    items: Option<&std::collections::BTreeSet<String>>,
) -> usize {
    match items {
        Some(items) if !items.is_empty() => {
            out.push_str(&format!("{} {} Found ({}):\n", "[!]".red(), title, items.len()));
            for item in items {
                out.push_str(&format!("  - {}\n", item));
            }
            out.push('\n');
            1
        }
        _ => 0,
    }
}

pub fn generate_json_report(report: &ScanReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Sleuth",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
            },
            "scan": {
                "id": report.scan_id,
                "target": report.target,
                "started_at": report.started_at,
                "finished_at": report.finished_at,
            },
            "summary": report.summary,
            "findings": report.findings,
            "supplement": report.supplement,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn render_report(report: &ScanReport, format: &ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
