// Tests for report generation functionality

use sleuth_core::report::{
    ReportFormat, ScanReport, generate_json_report, generate_text_report, render_report,
    save_report,
};
use sleuth_core::supplement::Supplement;
use sleuth_scanner::findings::{FindingValue, FraudFindings, keys};
use sleuth_scanner::{CrawlPhase, CrawlSummary};
use std::collections::BTreeSet;

fn create_test_report(findings: FraudFindings, deadline_hit: bool) -> ScanReport {
    colored::control::set_override(false);
    ScanReport {
        scan_id: "test-scan".to_string(),
        target: "https://shop.example/".to_string(),
        started_at: "2026-01-01T00:00:00+00:00".to_string(),
        finished_at: "2026-01-01T00:01:00+00:00".to_string(),
        findings,
        summary: CrawlSummary {
            root: "https://shop.example/".to_string(),
            pages_fetched: 12,
            pages_failed: 2,
            links_claimed: 15,
            fetches_shed: 0,
            peak_in_flight: 4,
            tasks_aborted: 0,
            deadline_hit,
            phase: CrawlPhase::Done,
            elapsed_ms: 60_000,
        },
        supplement: Supplement::default(),
    }
}

fn items(values: &[&str]) -> FindingValue {
    FindingValue::Items(values.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>())
}

fn suspicious_findings() -> FraudFindings {
    let mut findings = FraudFindings::new();
    findings.insert(keys::FOUND_KEYWORDS, items(&["100% safe", "earn cash"]));
    findings.insert(keys::HIDDEN_ELEMENTS, items(&["Hidden by style: display:none (<div>)"]));
    findings.insert(keys::HAS_CONTACT_INFO, FindingValue::Flag(false));
    findings.insert(keys::UNSECURE_CONNECTION, FindingValue::Flag(true));
    findings.insert(keys::missing_header("DNT"), FindingValue::Flag(true));
    findings.insert(keys::DOMAIN_AGE, FindingValue::Number(30));
    findings.insert(keys::NEW_DOMAIN, FindingValue::Flag(true));
    findings
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert!(matches!(ReportFormat::from_str("text"), Some(ReportFormat::Text)));
    assert!(matches!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json)));
    assert!(ReportFormat::from_str("csv").is_none());
}

// ============================================================================
// Text Report Tests
// ============================================================================

#[test]
fn test_text_report_lists_indicators() {
    let report = create_test_report(suspicious_findings(), false);
    let text = generate_text_report(&report);

    assert!(text.contains("SLEUTH FRAUD ANALYSIS REPORT"));
    assert!(text.contains("Suspicious Keywords Found (2)"));
    assert!(text.contains("  - 100% safe"));
    assert!(text.contains("Hidden Elements Found (1)"));
    assert!(text.contains("No contact information found"));
    assert!(text.contains("Non-HTTPS connection detected"));
    assert!(text.contains("only 30 days old"));
    assert!(text.contains("  - DNT"));
    assert!(!text.contains("partial (deadline reached)"));
}

#[test]
fn test_text_report_marks_partial_coverage() {
    let report = create_test_report(suspicious_findings(), true);
    let text = generate_text_report(&report);
    assert!(text.contains("partial (deadline reached)"));
}

#[test]
fn test_text_report_clean_site() {
    let mut findings = FraudFindings::new();
    findings.insert(keys::HAS_CONTACT_INFO, FindingValue::Flag(true));
    findings.insert(keys::CONTACT_INFO, items(&["/contact"]));
    findings.insert(keys::UNSECURE_CONNECTION, FindingValue::Flag(false));
    findings.insert(keys::DOMAIN_AGE, FindingValue::Number(3000));
    findings.insert(keys::NEW_DOMAIN, FindingValue::Flag(false));

    let text = generate_text_report(&create_test_report(findings, false));
    assert!(text.contains("Contact information (1)"));
    assert!(text.contains("Domain age: 3000 days"));
    assert!(text.contains("No fraud indicators found."));
}

// ============================================================================
// JSON Report Tests
// ============================================================================

#[test]
fn test_json_report_structure() {
    let report = create_test_report(suspicious_findings(), false);
    let json = generate_json_report(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let root = &value["report"];
    assert_eq!(root["metadata"]["generator"], "Sleuth");
    assert_eq!(root["scan"]["id"], "test-scan");
    assert_eq!(root["summary"]["pages_fetched"], 12);
    assert_eq!(root["summary"]["phase"], "Done");
    assert_eq!(root["findings"]["UnsecureConnection"], true);
    assert_eq!(root["findings"]["DomainAge"], 30);
    assert_eq!(
        root["findings"]["FoundKeywords"],
        serde_json::json!(["100% safe", "earn cash"])
    );
}

#[test]
fn test_render_report_dispatch() {
    let report = create_test_report(FraudFindings::new(), false);
    let text = render_report(&report, &ReportFormat::Text).unwrap();
    let json = render_report(&report, &ReportFormat::Json).unwrap();

    assert!(text.contains("End of Report"));
    assert!(json.trim_start().starts_with('{'));
}

#[test]
fn test_save_report() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.json");

    save_report("{\"ok\": true}", &path)?;
    assert_eq!(std::fs::read_to_string(&path)?, "{\"ok\": true}");
    Ok(())
}
