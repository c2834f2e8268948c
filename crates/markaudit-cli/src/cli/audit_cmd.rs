//! `markaudit run`: render every URL, audit it, and write the reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use markaudit::report::{self, Report, RunSummary, REPORT_HTML};
use markaudit::{read_terms, read_urls, AuditRules, StrategyKind, TermsFile, UrlEntry};
use tokio::sync::watch;
use tracing::{error, info};

use crate::cli::output;
use crate::fetcher::{self, AuditRun, FetchSettings};
use crate::progress::{self, ProgressReceiver};
use crate::renderer::chromium::{BrowserOptions, ChromiumRenderer};
use crate::renderer::Renderer;
use crate::throttle;

/// Exit code for a run stopped by Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code for fatal setup errors and failed artifact writes.
pub const EXIT_FAILURE: i32 = 1;

/// Print a progress line after this many completed URLs.
const PROGRESS_EVERY: usize = 5;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// CSV file with a `url` header column
    #[arg(long)]
    pub urls_file: PathBuf,

    /// JSON file of trademark terms
    #[arg(long, visible_alias = "terms-file")]
    pub marks_file: PathBuf,

    /// Output directory for reports and screenshots
    #[arg(long)]
    pub out: PathBuf,

    /// Maximum simultaneous page fetches
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: u64,

    /// Global navigation starts per second (0 disables throttling)
    #[arg(long, default_value_t = 2.0, value_parser = parse_rps)]
    pub rps: f64,

    /// Save a full-page screenshot of every page with issues
    #[arg(long)]
    pub save_flagged_screenshots: bool,

    /// Per-fetch navigation timeout in milliseconds
    #[arg(long, default_value_t = 15_000)]
    pub nav_timeout_ms: u64,

    /// Maximum wait for the page to settle after load, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub settle_timeout_ms: u64,

    /// Extra attempts for URLs that fail to load
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Prominence strategy (selectors, document-order); overrides the terms file
    #[arg(long)]
    pub strategy: Option<StrategyKind>,

    /// Chromium binary to use instead of auto-discovery
    #[arg(long)]
    pub chromium: Option<PathBuf>,
}

impl RunArgs {
    fn settings(&self) -> FetchSettings {
        FetchSettings {
            concurrency: usize::try_from(self.concurrency).unwrap_or(usize::MAX),
            rps: self.rps,
            nav_timeout_ms: self.nav_timeout_ms,
            settle_timeout_ms: self.settle_timeout_ms,
            retries: self.retries,
            screenshots: self.save_flagged_screenshots,
            out_dir: self.out.clone(),
        }
    }
}

fn parse_rps(raw: &str) -> std::result::Result<f64, String> {
    let rps: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid rate '{raw}': {e}"))?;
    throttle::period(rps).map_err(|e| e.to_string())?;
    Ok(rps)
}

/// Load and validate both input files.
pub fn load_inputs(
    urls_file: &Path,
    marks_file: &Path,
    strategy: Option<StrategyKind>,
) -> Result<(Vec<UrlEntry>, TermsFile)> {
    let urls = read_urls(urls_file).context("failed to load URL list")?;
    let mut terms = read_terms(marks_file).context("failed to load terms file")?;
    if let Some(kind) = strategy {
        terms.prominence.strategy = kind;
    }
    Ok((urls, terms))
}

/// Run the audit. Returns the process exit code.
pub async fn run(args: RunArgs) -> Result<i32> {
    let (urls, terms) = load_inputs(&args.urls_file, &args.marks_file, args.strategy)?;
    let rules = Arc::new(AuditRules::from_terms_file(&terms).context("invalid terms file")?);
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("cannot create output directory {}", args.out.display()))?;

    let settings = args.settings();
    info!(
        "loaded {} URLs and {} terms ({} strategy)",
        urls.len(),
        terms.terms.len(),
        rules.strategy_name()
    );

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::launch(&BrowserOptions {
            executable: args.chromium.clone(),
            ..Default::default()
        })
        .await?,
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::status("  Interrupted; finishing current pages and writing partial results.");
            let _ = cancel_tx.send(true);
        }
    });

    let (progress_tx, progress_rx) = progress::channel();
    let printer = tokio::spawn(print_progress(progress_rx, urls.len()));

    let total = urls.len();
    let started_at = Utc::now();
    let result = fetcher::run(
        Arc::clone(&renderer),
        urls,
        rules.clone(),
        &settings,
        Some(progress_tx),
        cancel_rx,
    )
    .await;

    if let Err(e) = renderer.shutdown().await {
        error!("browser shutdown failed: {e:#}");
    }
    interrupt.abort();
    let _ = printer.await;

    let audit = result?;
    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        urls_total: total,
        urls_fetched: audit.urls_fetched,
        urls_failed: audit.failures.len(),
        findings: audit.findings.len(),
        issues: audit.issues(),
        terms_absent: audit.terms_absent,
        strategy: rules.strategy_name().to_string(),
        interrupted: audit.interrupted,
    };

    let status = report::write_report(
        &args.out,
        &Report {
            findings: &audit.findings,
            failures: &audit.failures,
            summary: &summary,
        },
    );
    for failed in status.failures() {
        if let Err(e) = &failed.result {
            eprintln!("  Error: could not write {}: {e}", failed.path.display());
        }
    }

    print_summary(&args.out, &summary, &audit);

    Ok(if !status.is_ok() {
        EXIT_FAILURE
    } else if summary.interrupted {
        EXIT_INTERRUPTED
    } else {
        0
    })
}

/// Print `[audit] n/total` every few completed URLs until the channel closes.
async fn print_progress(mut rx: ProgressReceiver, total: usize) {
    use tokio::sync::broadcast::error::RecvError;

    let mut done = 0;
    loop {
        match rx.recv().await {
            Ok(ev) if ev.event.is_url_done() => {
                done += 1;
                if done % PROGRESS_EVERY == 0 || done == total {
                    output::status(format!("[audit] {done}/{total} URLs processed"));
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => tracing::debug!("progress printer lagged by {n}"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_summary(out: &Path, summary: &RunSummary, audit: &AuditRun) {
    if output::is_json() {
        match serde_json::to_value(summary) {
            Ok(value) => output::print_json(&value),
            Err(e) => eprintln!("  Error: failed to serialize summary: {e}"),
        }
        return;
    }
    if output::is_quiet() {
        return;
    }

    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;
    println!();
    println!(
        "  Audited {}/{} URLs ({} failed) in {elapsed:.1}s",
        summary.urls_fetched, summary.urls_total, summary.urls_failed
    );
    if audit.urls_skipped > 0 {
        println!("  Skipped {} URLs after interrupt", audit.urls_skipped);
    }
    println!(
        "  Findings: {} ({} issues), terms absent: {}",
        summary.findings, summary.issues, summary.terms_absent
    );
    println!("  Report: {}", out.join(REPORT_HTML).display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn defaults_match_documented_values() {
        let h = Harness::parse_from([
            "markaudit",
            "--urls-file",
            "urls.csv",
            "--terms-file",
            "marks.json",
            "--out",
            "out",
        ]);
        let settings = h.args.settings();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.rps, 2.0);
        assert_eq!(settings.nav_timeout_ms, 15_000);
        assert_eq!(settings.settle_timeout_ms, 5_000);
        assert_eq!(settings.retries, 0);
        assert!(!settings.screenshots);
        assert_eq!(h.args.marks_file, PathBuf::from("marks.json"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let parsed = Harness::try_parse_from([
            "markaudit",
            "--urls-file",
            "u.csv",
            "--marks-file",
            "m.json",
            "--out",
            "o",
            "--concurrency",
            "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn rps_must_be_representable() {
        let parse = |rps: &str| {
            Harness::try_parse_from([
                "markaudit",
                "--urls-file",
                "u.csv",
                "--marks-file",
                "m.json",
                "--out",
                "o",
                "--rps",
                rps,
            ])
        };
        assert!(parse("1e-20").is_err());
        assert!(parse("NaN").is_err());
        assert!(parse("abc").is_err());
        assert_eq!(parse("0").unwrap().args.rps, 0.0);
        assert_eq!(parse("0.5").unwrap().args.rps, 0.5);
    }

    #[test]
    fn strategy_flag_overrides_terms_file() {
        let dir = TempDir::new().unwrap();
        let urls = dir.path().join("urls.csv");
        let marks = dir.path().join("marks.json");
        std::fs::write(&urls, "url\nhttps://example.com/\n").unwrap();
        std::fs::write(
            &marks,
            r#"{"marks": [{"term": "Vitamix", "symbol": "®"}], "prominence": {"strategy": "selectors"}}"#,
        )
        .unwrap();

        let (_, terms) = load_inputs(&urls, &marks, Some(StrategyKind::DocumentOrder)).unwrap();
        assert_eq!(terms.prominence.strategy, StrategyKind::DocumentOrder);
        let (_, terms) = load_inputs(&urls, &marks, None).unwrap();
        assert_eq!(terms.prominence.strategy, StrategyKind::Selectors);
    }

    #[test]
    fn missing_inputs_are_errors() {
        let dir = TempDir::new().unwrap();
        let err = load_inputs(
            &dir.path().join("nope.csv"),
            &dir.path().join("nope.json"),
            None,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed to load URL list"));
    }
}
