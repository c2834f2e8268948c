// Copyright 2026 markaudit contributors
// SPDX-License-Identifier: MIT

//! Rate-limited page fetching and per-page auditing.
//!
//! A fixed pool of workers, each holding one browser tab, drains a shared
//! URL queue. Every navigation start takes a token from one global
//! [`Throttle`], so the start rate holds across all workers. Rendered HTML
//! is audited on the blocking pool; one URL failing never affects another.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use markaudit::report;
use markaudit::{
    AuditError, AuditResult, AuditRules, FailureStage, FetchFailure, Finding, PageAudit, UrlEntry,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::progress::{ProgressEmitter, ProgressEventKind, ProgressSender};
use crate::renderer::{RenderContext, Renderer, MARK_HIDDEN_SCRIPT};
use crate::throttle::Throttle;

/// Base delay before the first retry; doubles on each further attempt.
const RETRY_BASE_MS: u64 = 500;

/// Knobs for one audit run.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Maximum simultaneous page fetches (browser tabs).
    pub concurrency: usize,
    /// Global navigation starts per second; `0` disables throttling.
    pub rps: f64,
    pub nav_timeout_ms: u64,
    /// Upper bound on waiting for the page to go quiet after load.
    pub settle_timeout_ms: u64,
    /// Extra attempts after a navigation or extraction failure.
    pub retries: u32,
    /// Capture a full-page screenshot of pages with issues.
    pub screenshots: bool,
    /// Output directory; screenshots are written beneath it.
    pub out_dir: PathBuf,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            rps: 2.0,
            nav_timeout_ms: 15_000,
            settle_timeout_ms: 5_000,
            retries: 0,
            screenshots: false,
            out_dir: PathBuf::from("audit-out"),
        }
    }
}

/// What happened to a single URL.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Audited(PageAudit),
    Failed(FetchFailure),
}

/// Aggregated result of a run, ordered by input position.
#[derive(Debug, Default)]
pub struct AuditRun {
    pub findings: Vec<Finding>,
    pub failures: Vec<FetchFailure>,
    /// Sum over fetched pages of terms that never appeared.
    pub terms_absent: usize,
    pub urls_fetched: usize,
    /// URLs never completed because the run was interrupted.
    pub urls_skipped: usize,
    pub interrupted: bool,
}

impl AuditRun {
    fn from_slots(slots: Vec<Option<PageOutcome>>, interrupted: bool) -> Self {
        let mut run = AuditRun {
            interrupted,
            ..Default::default()
        };
        for slot in slots {
            match slot {
                Some(PageOutcome::Audited(page)) => {
                    run.urls_fetched += 1;
                    run.terms_absent += page.absent_terms.len();
                    run.findings.extend(page.findings);
                }
                Some(PageOutcome::Failed(failure)) => run.failures.push(failure),
                None => run.urls_skipped += 1,
            }
        }
        run
    }

    pub fn issues(&self) -> usize {
        self.findings.iter().filter(|f| f.observed.is_issue()).count()
    }
}

struct Shared {
    queue: Mutex<VecDeque<UrlEntry>>,
    throttle: Throttle,
    rules: Arc<AuditRules>,
    settings: FetchSettings,
    progress: ProgressEmitter,
}

/// Fetch and audit every URL.
///
/// Returns an error only when no browser tab could be opened at all.
/// Setting `cancel` to `true` stops workers after their current page;
/// completed pages are kept and the run is marked interrupted.
pub async fn run(
    renderer: Arc<dyn Renderer>,
    urls: Vec<UrlEntry>,
    rules: Arc<AuditRules>,
    settings: &FetchSettings,
    progress: Option<ProgressSender>,
    cancel: watch::Receiver<bool>,
) -> Result<AuditRun> {
    let start = Instant::now();
    let total = urls.len();
    let workers = settings.concurrency.max(1).min(total);

    let shared = Arc::new(Shared {
        queue: Mutex::new(urls.into_iter().collect()),
        throttle: Throttle::per_second(settings.rps)?,
        rules,
        settings: settings.clone(),
        progress: ProgressEmitter::new(progress),
    });
    info!(
        "auditing {total} URLs with {workers} workers at {} req/s",
        shared.throttle.rate()
    );

    let mut pool = JoinSet::new();
    for id in 0..workers {
        pool.spawn(worker(
            id,
            Arc::clone(&shared),
            Arc::clone(&renderer),
            cancel.clone(),
        ));
    }

    let mut slots: Vec<Option<PageOutcome>> = (0..total).map(|_| None).collect();
    let mut opened = 0;
    let mut last_error = None;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(outcomes)) => {
                opened += 1;
                for (index, outcome) in outcomes {
                    match slots.get_mut(index) {
                        Some(slot) => *slot = Some(outcome),
                        None => warn!("dropping outcome for out-of-range index {index}"),
                    }
                }
            }
            Ok(Err(e)) => last_error = Some(e),
            Err(e) => error!("fetch worker panicked: {e}"),
        }
    }

    if workers > 0 && opened == 0 {
        let reason = last_error.map(|e| format!("{e:#}")).unwrap_or_default();
        bail!("could not open any browser tab: {reason}");
    }

    let interrupted = *cancel.borrow();
    let run = AuditRun::from_slots(slots, interrupted);

    shared.progress.emit(ProgressEventKind::RunComplete {
        fetched: run.urls_fetched,
        failed: run.failures.len(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    });
    Ok(run)
}

/// Resolves once `cancel` turns true; never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let fired = cancel.wait_for(|c| *c).await.is_ok();
    if !fired {
        std::future::pending::<()>().await;
    }
}

/// Drain the queue with one tab. Returns `(input index, outcome)` pairs.
async fn worker(
    id: usize,
    shared: Arc<Shared>,
    renderer: Arc<dyn Renderer>,
    mut cancel: watch::Receiver<bool>,
) -> Result<Vec<(usize, PageOutcome)>> {
    let mut ctx = match renderer.new_context().await {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("worker {id}: failed to open tab: {e:#}");
            return Err(e);
        }
    };

    let mut outcomes = Vec::new();
    loop {
        if *cancel.borrow() {
            break;
        }
        let Some(entry) = shared.queue.lock().await.pop_front() else {
            break;
        };

        let outcome = tokio::select! {
            outcome = process(&shared, ctx.as_mut(), &entry) => outcome,
            _ = cancelled(&mut cancel) => {
                debug!("worker {id}: interrupted during {}", entry.url);
                break;
            }
        };

        match &outcome {
            PageOutcome::Audited(page) => {
                let issues = page.findings.iter().filter(|f| f.observed.is_issue()).count();
                info!(
                    "{}: {} findings, {issues} issues",
                    entry.url,
                    page.findings.len()
                );
                shared.progress.emit(ProgressEventKind::PageAudited {
                    index: entry.index,
                    url: entry.url.clone(),
                    findings: page.findings.len(),
                    issues,
                });
            }
            PageOutcome::Failed(failure) => {
                warn!("{}: {} ({})", entry.url, failure.message, failure.stage);
                shared.progress.emit(ProgressEventKind::FetchFailed {
                    index: entry.index,
                    url: entry.url.clone(),
                    error: failure.message.clone(),
                });
            }
        }
        outcomes.push((entry.index, outcome));
    }

    if let Err(e) = ctx.close().await {
        debug!("worker {id}: closing tab failed: {e:#}");
    }
    Ok(outcomes)
}

/// Fetch one URL, retrying navigation and extraction failures.
async fn process(
    shared: &Shared,
    ctx: &mut dyn RenderContext,
    entry: &UrlEntry,
) -> PageOutcome {
    let settings = &shared.settings;
    let max_attempts = settings.retries.saturating_add(1);
    let mut attempt = 0;

    let error = loop {
        attempt += 1;
        shared.throttle.acquire().await;
        shared.progress.emit(ProgressEventKind::FetchStarted {
            index: entry.index,
            url: entry.url.clone(),
            attempt,
        });

        match render(ctx, &entry.url, settings).await {
            Ok(html) => return audit(shared, ctx, entry, html, attempt).await,
            Err(e) if attempt >= max_attempts => break e,
            Err(e) => {
                let delay = RETRY_BASE_MS.saturating_mul(1u64 << (attempt - 1).min(16));
                debug!("attempt {attempt} failed ({e}), retrying in {delay}ms");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    };

    PageOutcome::Failed(FetchFailure::from_error(&entry.url, error, attempt))
}

/// Navigate, let the page settle, tag invisible elements, export HTML.
async fn render(
    ctx: &mut dyn RenderContext,
    url: &str,
    settings: &FetchSettings,
) -> AuditResult<String> {
    let nav = ctx
        .navigate(url, settings.nav_timeout_ms)
        .await
        .map_err(|e| AuditError::fetch(url, FailureStage::Navigation, format!("{e:#}")))?;
    debug!("{url}: loaded in {}ms", nav.load_time_ms);
    if nav.final_url != url {
        debug!("{url}: redirected to {}", nav.final_url);
    }

    match ctx.wait_until_stable(settings.settle_timeout_ms).await {
        Ok(true) => {}
        Ok(false) => debug!("{url}: page still busy after {}ms", settings.settle_timeout_ms),
        Err(e) => debug!("{url}: settle probe failed: {e:#}"),
    }

    let extraction =
        |e: anyhow::Error| AuditError::fetch(url, FailureStage::Extraction, format!("{e:#}"));
    ctx.execute_js(MARK_HIDDEN_SCRIPT).await.map_err(extraction)?;
    ctx.get_html().await.map_err(extraction)
}

async fn audit(
    shared: &Shared,
    ctx: &mut dyn RenderContext,
    entry: &UrlEntry,
    html: String,
    attempts: u32,
) -> PageOutcome {
    let rules = Arc::clone(&shared.rules);
    let url = entry.url.clone();
    let page = match tokio::task::spawn_blocking(move || rules.audit_html(&url, &html)).await {
        Ok(page) => page,
        Err(e) => {
            let error = AuditError::fetch(&entry.url, FailureStage::Audit, e.to_string());
            return PageOutcome::Failed(FetchFailure::from_error(&entry.url, error, attempts));
        }
    };

    if !(shared.settings.screenshots && page.has_issues()) {
        return PageOutcome::Audited(page);
    }

    let saved = match ctx.screenshot().await {
        Ok(png) => report::save_screenshot(&shared.settings.out_dir, entry.index, &entry.url, &png)
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    match saved {
        Ok(path) => PageOutcome::Audited(page.with_screenshot(&path)),
        Err(e) => {
            warn!("{}: screenshot not saved: {e:#}", entry.url);
            shared.progress.emit(ProgressEventKind::Warning {
                message: format!("screenshot of {} not saved: {e:#}", entry.url),
            });
            PageOutcome::Audited(page)
        }
    }
}
