use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use sleuth_core::report::{ReportFormat, render_report, save_report};
use sleuth_core::{Collaborators, ScanOptions, ScanReport, execute_scan};
use sleuth_scanner::IndicatorCatalog;
use sleuth_scanner::crawler::normalize_root;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Helper functions for the scan handler

/// Collect scan targets from either a hosts file or the single DOMAIN argument
pub fn load_targets_from_source(
    domain: Option<&String>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_targets_from_file(hosts_file_path)
    } else if let Some(domain) = domain {
        parse_target_line(domain)
            .map(|target| vec![target])
            .ok_or_else(|| format!("'{}' is not a scannable domain or URL", domain))
    } else {
        Err("Either DOMAIN or --hosts-file must be provided".to_string())
    }
}

/// Load targets from a file, one per line. Blank lines and `#` comments are skipped.
pub fn load_targets_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let targets: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_target_line)
        .collect();

    if targets.is_empty() {
        return Err(format!("No valid targets found in {}", path.display()));
    }

    Ok(targets)
}

/// Parse a single line as a scan root, assuming https:// when no scheme is given
pub fn parse_target_line(line: &str) -> Option<String> {
    match normalize_root(line) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            eprintln!("{} Skipping invalid target: {}", "⚠".yellow(), e);
            None
        }
    }
}

/// Built-in catalog, or the one at `path` (a leading `~` is expanded)
pub fn load_catalog(path: Option<&str>) -> Result<IndicatorCatalog> {
    match path {
        None => Ok(IndicatorCatalog::default()),
        Some(path) => {
            let expanded = shellexpand::tilde(path);
            let catalog = IndicatorCatalog::from_file(Path::new(expanded.as_ref()))
                .with_context(|| format!("could not load catalog {}", path))?;
            info!("Loaded indicator catalog from {}", expanded);
            Ok(catalog)
        }
    }
}

/// Where to write the report for `target`. With several targets each report
/// gets the target's host appended to the file stem.
pub fn output_path_for(base: &Path, target: &str, multiple: bool) -> PathBuf {
    if !multiple {
        return base.to_path_buf();
    }

    let host = url::Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.replace(['.', ':'], "_")))
        .unwrap_or_else(|| "target".to_string());
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, host, ext.to_string_lossy()),
        None => format!("{}-{}", stem, host),
    };
    base.with_file_name(file_name)
}

/// Turn parsed `scan` arguments into options for one target
pub fn build_scan_options(
    args: &ArgMatches,
    target: &str,
    catalog: IndicatorCatalog,
    quiet: bool,
) -> ScanOptions {
    let mut options = ScanOptions::new(target);
    if let Some(workers) = args.get_one::<usize>("workers") {
        options.workers = *workers;
    }
    if let Some(deadline) = args.get_one::<u64>("deadline") {
        options.deadline = Duration::from_secs(*deadline);
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        options.request_timeout = Duration::from_secs(*timeout);
    }
    if let Some(safety_cap) = args.get_one::<usize>("safety-cap") {
        options.safety_cap = *safety_cap;
    }
    if let Some(jitter) = args.get_one::<u64>("max-jitter") {
        options.max_jitter = Duration::from_millis(*jitter);
    }
    options.catalog = catalog;
    options.show_progress_bars = !quiet;
    options
}

pub async fn handle_scan(args: &ArgMatches, quiet: bool) -> Result<()> {
    let targets = load_targets_from_source(
        args.get_one::<String>("DOMAIN"),
        args.get_one::<PathBuf>("hosts-file"),
    )
    .map_err(|e| anyhow!(e))?;
    let catalog = load_catalog(args.get_one::<String>("catalog").map(String::as_str))?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<PathBuf>("output");
    let multiple = targets.len() > 1;

    // External lookups are wired in by embedders; the CLI scans with the crawler alone
    let collaborators = Collaborators::default();

    let mut failures = 0;
    for target in &targets {
        let options = build_scan_options(args, target, catalog.clone(), quiet);
        let report = match execute_scan(options, &collaborators).await {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} Scan of {} failed: {}", "✗".red().bold(), target, e);
                failures += 1;
                continue;
            }
        };

        emit_report(&report, &format, output.map(|o| output_path_for(o, target, multiple)))?;
    }

    if failures == targets.len() {
        bail!("no target could be scanned");
    }
    Ok(())
}

fn emit_report(report: &ScanReport, format: &ReportFormat, output: Option<PathBuf>) -> Result<()> {
    let rendered = render_report(report, format).context("failed to render report")?;
    match output {
        Some(path) => {
            save_report(&rendered, &path)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            println!(
                "{} Report for {} saved to {}",
                "✓".green().bold(),
                report.target,
                path.display()
            );
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// The built-in catalog as pretty JSON, loadable again with `--catalog`
pub fn render_catalog() -> Result<String> {
    IndicatorCatalog::default()
        .to_json()
        .context("failed to serialize catalog")
}

pub fn handle_catalog() -> Result<()> {
    println!("{}", render_catalog()?);
    Ok(())
}
