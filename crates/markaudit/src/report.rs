//! Report writer: CSV, JSONL, HTML, error log, summary and screenshots.
//!
//! Every artifact is written to a hidden temp file in the output directory
//! and renamed into place, so a reader never sees a half-written file. A
//! failure on one artifact is recorded in [`ReportStatus`] and the remaining
//! artifacts are still attempted.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AuditError, AuditResult, FetchFailure, Finding};

pub const FINDINGS_CSV: &str = "findings.csv";
pub const FINDINGS_JSONL: &str = "findings.jsonl";
pub const REPORT_HTML: &str = "report.html";
pub const ERRORS_JSONL: &str = "errors.jsonl";
pub const SUMMARY_JSON: &str = "summary.json";
pub const SCREENSHOT_DIR: &str = "screenshots";

/// Longest URL slug used in screenshot file names.
const MAX_SLUG_LEN: usize = 80;

const CSV_HEADER: [&str; 9] = [
    "url",
    "term",
    "matched",
    "issue",
    "expected",
    "found",
    "path",
    "snippet",
    "screenshot",
];

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub urls_total: usize,
    pub urls_fetched: usize,
    pub urls_failed: usize,
    pub findings: usize,
    pub issues: usize,
    /// (URL, term) pairs where the term did not appear.
    pub terms_absent: usize,
    pub strategy: String,
    pub interrupted: bool,
}

/// Everything the writer serializes, already in input order.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    pub findings: &'a [Finding],
    pub failures: &'a [FetchFailure],
    pub summary: &'a RunSummary,
}

/// Result of writing one artifact.
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub name: &'static str,
    pub path: PathBuf,
    pub result: AuditResult<()>,
}

/// Per-artifact results of [`write_report`].
#[derive(Debug, Default)]
pub struct ReportStatus {
    pub artifacts: Vec<ArtifactOutcome>,
}

impl ReportStatus {
    pub fn is_ok(&self) -> bool {
        self.artifacts.iter().all(|a| a.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.artifacts.iter().filter(|a| a.result.is_err())
    }
}

/// Write all report artifacts into `out_dir`.
pub fn write_report(out_dir: &Path, report: &Report<'_>) -> ReportStatus {
    let mut status = ReportStatus::default();
    let mut record = |name: &'static str, result: AuditResult<()>| {
        let path = out_dir.join(name);
        match &result {
            Ok(()) => tracing::debug!("wrote {}", path.display()),
            Err(e) => tracing::error!("failed to write {}: {e}", path.display()),
        }
        status.artifacts.push(ArtifactOutcome { name, path, result });
    };

    record(
        FINDINGS_CSV,
        write_atomic(&out_dir.join(FINDINGS_CSV), |w| {
            write_findings_csv(report.findings, w)
        }),
    );
    record(
        FINDINGS_JSONL,
        write_atomic(&out_dir.join(FINDINGS_JSONL), |w| {
            write_jsonl(report.findings, w)
        }),
    );
    record(
        REPORT_HTML,
        write_atomic(&out_dir.join(REPORT_HTML), |w| {
            w.write_all(render_html(report).as_bytes())?;
            Ok(())
        }),
    );
    record(
        ERRORS_JSONL,
        write_atomic(&out_dir.join(ERRORS_JSONL), |w| {
            write_jsonl(report.failures, w)
        }),
    );
    record(
        SUMMARY_JSON,
        write_atomic(&out_dir.join(SUMMARY_JSON), |w| {
            serde_json::to_writer_pretty(&mut *w, report.summary)?;
            w.write_all(b"\n")?;
            Ok(())
        }),
    );

    status
}

/// Write to `.<name>.tmp` next to `path`, then rename over it.
fn write_atomic<F>(path: &Path, fill: F) -> AuditResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> AuditResult<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{name}.tmp"));

    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        fill(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        std::fs::rename(&tmp, path)?;
        Ok::<(), AuditError>(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Tabular summary, one row per finding.
pub fn write_findings_csv<W: Write>(findings: &[Finding], writer: W) -> AuditResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for f in findings {
        let expected = f.required_symbol.to_string();
        let found = f.found.map(String::from).unwrap_or_default();
        csv.write_record([
            f.url.as_str(),
            f.term.as_str(),
            f.matched.as_str(),
            f.observed.label(),
            expected.as_str(),
            found.as_str(),
            f.path.as_str(),
            f.snippet.as_str(),
            f.screenshot.as_deref().unwrap_or(""),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// One JSON object per line.
pub fn write_jsonl<T: Serialize, W: Write>(records: &[T], mut writer: W) -> AuditResult<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Human-readable report grouped by URL, issues first within each URL.
pub fn render_html(report: &Report<'_>) -> String {
    let s = report.summary;
    let mut html = String::with_capacity(4096 + report.findings.len() * 512);
    html.push_str(HTML_HEAD);
    html.push_str(&format!(
        "<p class=\"summary\">{} URL(s): {} fetched, {} failed. \
         {} finding(s), {} issue(s). Strategy: {}.{}</p>\n",
        s.urls_total,
        s.urls_fetched,
        s.urls_failed,
        s.findings,
        s.issues,
        escape_html(&s.strategy),
        if s.interrupted {
            " <strong>Run was interrupted; results are partial.</strong>"
        } else {
            ""
        }
    ));

    let mut groups: Vec<(&str, Vec<&Finding>)> = Vec::new();
    for f in report.findings {
        match groups.last_mut() {
            Some((url, items)) if *url == f.url => items.push(f),
            _ => groups.push((f.url.as_str(), vec![f])),
        }
    }

    if groups.is_empty() {
        html.push_str("<p>No trademark terms were found on the fetched pages.</p>\n");
    }
    for (url, mut items) in groups {
        items.sort_by_key(|f| f.observed.severity_rank());
        let issues = items.iter().filter(|f| f.observed.is_issue()).count();
        html.push_str(&format!(
            "<h2 class=\"url\"><a href=\"{0}\" target=\"_blank\">{0}</a> \
             <span class=\"badge {1}\">{2} issue(s)</span></h2>\n",
            escape_html(url),
            if issues > 0 { "bad" } else { "good" },
            issues
        ));
        html.push_str(
            "<table class=\"tbl\"><thead><tr><th>Term</th><th>Issue</th><th>Expected</th>\
             <th>Found</th><th>Path</th><th>Snippet</th><th>Screenshot</th></tr></thead><tbody>\n",
        );
        for f in items {
            let shot = f
                .screenshot
                .as_deref()
                .map(|p| format!("<a href=\"{0}\">{0}</a>", escape_html(p)))
                .unwrap_or_default();
            html.push_str(&format!(
                "<tr class=\"issue-{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
                 <td><code>{}</code></td><td class=\"snip\">{}</td><td>{}</td></tr>\n",
                f.observed.as_str(),
                escape_html(&f.matched),
                f.observed.label(),
                f.required_symbol,
                escape_html(&f.found.map(String::from).unwrap_or_default()),
                escape_html(&truncate_chars(&f.path, 140)),
                escape_html(&f.snippet),
                shot
            ));
        }
        html.push_str("</tbody></table>\n");
    }

    if !report.failures.is_empty() {
        html.push_str("<h2>Fetch errors</h2>\n<table class=\"tbl\"><thead><tr><th>URL</th>\
                       <th>Stage</th><th>Attempts</th><th>Details</th></tr></thead><tbody>\n");
        for e in report.failures {
            html.push_str(&format!(
                "<tr class=\"issue-error\"><td class=\"url\">{}</td><td>{}</td><td>{}</td>\
                 <td class=\"snip\">{}</td></tr>\n",
                escape_html(&e.url),
                e.stage,
                e.attempts,
                escape_html(&e.message)
            ));
        }
        html.push_str("</tbody></table>\n");
    }

    html.push_str("</body></html>\n");
    html
}

const HTML_HEAD: &str = r#"<!doctype html>
<html><head><meta charset="utf-8">
<title>Trademark Audit Report</title>
<style>
body{font-family:system-ui,Segoe UI,Roboto,Helvetica,Arial,sans-serif;margin:24px}
.badge{display:inline-block;padding:.1rem .4rem;border-radius:.4rem;font-size:.8rem}
.badge.bad{background:#ffe5e5}.badge.good{background:#e6f6e6}
.tbl{width:100%;border-collapse:collapse;margin-top:8px}
.tbl th,.tbl td{border-bottom:1px solid #eee;padding:8px;text-align:left;vertical-align:top}
h2.url a,td.url{word-break:break-all}
.snip{white-space:pre-wrap}
.issue-missing{background:#ffe5e5}
.issue-wrong{background:#fff3cd}
.issue-error{background:#eef7ff}
</style></head><body>
<h1>Trademark Audit Report</h1>
<p>Text marks only; logos and design marks are not checked. Screenshots are saved only for flagged pages.</p>
"#;

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Relative path of the screenshot for the URL at `index`.
pub fn screenshot_path(index: usize, url: &str) -> String {
    let stripped = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let mut slug: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    format!("{SCREENSHOT_DIR}/{index:04}-{slug}.png")
}

/// Persist a PNG screenshot and return its path relative to `out_dir`.
pub fn save_screenshot(out_dir: &Path, index: usize, url: &str, png: &[u8]) -> AuditResult<String> {
    let relative = screenshot_path(index, url);
    write_atomic(&out_dir.join(&relative), |w| {
        w.write_all(png)?;
        Ok(())
    })?;
    Ok(relative)
}
