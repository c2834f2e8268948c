//! Worker-pool behavior against an in-memory renderer: concurrency bound,
//! start-rate spacing, failure isolation, retries, screenshots, cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use markaudit::{
    AuditRules, FailureStage, ObservedSymbol, ProminenceConfig, ProminenceStrategy,
    RequiredSymbol, TermDefinition, TextBlock, Tolerance, UrlEntry,
};
use markaudit_cli::fetcher::{self, FetchSettings};
use markaudit_cli::progress::{self, ProgressEventKind};
use markaudit_cli::renderer::{NavigationResult, RenderContext, Renderer};
use tempfile::TempDir;
use tokio::sync::watch;

// ── mock renderer ──

#[derive(Clone)]
enum MockPage {
    Html(&'static str),
    /// Fails the first `n` navigations, then serves the HTML.
    Flaky(usize, &'static str),
    Down,
}

#[derive(Default)]
struct Stats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
    navigations: Mutex<HashMap<String, usize>>,
}

struct MockRenderer {
    pages: HashMap<String, MockPage>,
    delay: Duration,
    stats: Arc<Stats>,
    refuse_tabs: bool,
    open: Arc<AtomicUsize>,
}

impl MockRenderer {
    fn new(pages: &[(&str, MockPage)], delay: Duration) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, page)| (url.to_string(), page.clone()))
                .collect(),
            delay,
            stats: Arc::new(Stats::default()),
            refuse_tabs: false,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        if self.refuse_tabs {
            bail!("target crashed");
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            pages: self.pages.clone(),
            delay: self.delay,
            stats: Arc::clone(&self.stats),
            open: Arc::clone(&self.open),
            html: None,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

struct MockContext {
    pages: HashMap<String, MockPage>,
    delay: Duration,
    stats: Arc<Stats>,
    open: Arc<AtomicUsize>,
    html: Option<&'static str>,
}

#[async_trait]
impl RenderContext for MockContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.stats.starts.lock().unwrap().push(Instant::now());
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let seen = {
            let mut navs = self.stats.navigations.lock().unwrap();
            let n = navs.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        tokio::time::sleep(self.delay).await;

        let html = match self.pages.get(url) {
            Some(MockPage::Html(html)) => Some(*html),
            Some(MockPage::Flaky(failures, html)) if seen > *failures => Some(*html),
            _ => None,
        };
        match html {
            Some(html) => {
                self.html = Some(html);
                Ok(NavigationResult {
                    final_url: url.to_string(),
                    load_time_ms: self.delay.as_millis() as u64,
                })
            }
            None => {
                self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
                bail!("net::ERR_CONNECTION_REFUSED")
            }
        }
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!(0))
    }

    async fn get_html(&self) -> Result<String> {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.html.unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\nmock".to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_until_stable(&self, _timeout_ms: u64) -> Result<bool> {
        Ok(true)
    }
}

// ── helpers ──

fn rules() -> Arc<AuditRules> {
    Arc::new(
        AuditRules::new(
            vec![TermDefinition::new("Vitamix", RequiredSymbol::Registered)],
            ProminenceConfig::default().build().unwrap(),
            Tolerance::default(),
        )
        .unwrap(),
    )
}

fn entries(urls: &[&str]) -> Vec<UrlEntry> {
    urls.iter()
        .enumerate()
        .map(|(index, url)| UrlEntry {
            index,
            url: url.to_string(),
        })
        .collect()
}

fn settings(concurrency: usize, rps: f64, out: &TempDir) -> FetchSettings {
    FetchSettings {
        concurrency,
        rps,
        nav_timeout_ms: 1_000,
        settle_timeout_ms: 100,
        retries: 0,
        screenshots: false,
        out_dir: out.path().to_path_buf(),
    }
}

const MISSING: &str = "<main><h1>Vitamix blenders</h1></main>";
const PRESENT: &str = "<main><h1>Vitamix® blenders</h1></main>";

// ── tests ──

#[tokio::test]
async fn concurrency_and_rate_limit_hold() {
    let urls: Vec<String> = (0..6).map(|i| format!("https://shop.test/p{i}")).collect();
    let pages: Vec<(&str, MockPage)> = urls
        .iter()
        .map(|u| (u.as_str(), MockPage::Html(PRESENT)))
        .collect();
    let renderer = Arc::new(MockRenderer::new(&pages, Duration::from_millis(150)));
    let stats = Arc::clone(&renderer.stats);
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let run = fetcher::run(
        renderer.clone(),
        entries(&url_refs),
        rules(),
        &settings(2, 10.0, &out),
        None,
        cancel_rx,
    )
    .await
    .unwrap();

    assert_eq!(run.urls_fetched, 6);
    assert!(stats.max_in_flight.load(Ordering::SeqCst) <= 2);

    let mut starts = stats.starts.lock().unwrap().clone();
    starts.sort();
    assert_eq!(starts.len(), 6);
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(80), "starts only {gap:?} apart");
    }
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn failed_url_is_isolated_and_results_keep_input_order() {
    let renderer = Arc::new(MockRenderer::new(
        &[
            ("https://shop.test/slow", MockPage::Html(MISSING)),
            ("https://shop.test/down", MockPage::Down),
            ("https://shop.test/fast", MockPage::Html(PRESENT)),
        ],
        Duration::from_millis(20),
    ));
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let (progress_tx, mut progress_rx) = progress::channel();

    let run = fetcher::run(
        renderer,
        entries(&[
            "https://shop.test/slow",
            "https://shop.test/down",
            "https://shop.test/fast",
        ]),
        rules(),
        &settings(3, 0.0, &out),
        Some(progress_tx),
        cancel_rx,
    )
    .await
    .unwrap();

    assert_eq!(run.urls_fetched, 2);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].url, "https://shop.test/down");
    assert_eq!(run.failures[0].stage, FailureStage::Navigation);
    assert_eq!(run.failures[0].attempts, 1);
    assert!(run.findings.iter().all(|f| f.url != "https://shop.test/down"));

    let order: Vec<(&str, ObservedSymbol)> = run
        .findings
        .iter()
        .map(|f| (f.url.as_str(), f.observed))
        .collect();
    assert_eq!(
        order,
        vec![
            ("https://shop.test/slow", ObservedSymbol::Missing),
            ("https://shop.test/fast", ObservedSymbol::Present),
        ]
    );

    let mut done = 0;
    let mut complete = false;
    while let Ok(ev) = progress_rx.try_recv() {
        if ev.event.is_url_done() {
            done += 1;
        }
        if matches!(ev.event, ProgressEventKind::RunComplete { fetched: 2, failed: 1, .. }) {
            complete = true;
        }
    }
    assert_eq!(done, 3);
    assert!(complete);
}

#[tokio::test]
async fn retries_recover_flaky_pages() {
    let renderer = Arc::new(MockRenderer::new(
        &[
            ("https://shop.test/flaky", MockPage::Flaky(1, MISSING)),
            ("https://shop.test/down", MockPage::Down),
        ],
        Duration::from_millis(5),
    ));
    let stats = Arc::clone(&renderer.stats);
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut settings = settings(2, 0.0, &out);
    settings.retries = 1;

    let run = fetcher::run(
        renderer,
        entries(&["https://shop.test/flaky", "https://shop.test/down"]),
        rules(),
        &settings,
        None,
        cancel_rx,
    )
    .await
    .unwrap();

    assert_eq!(run.urls_fetched, 1);
    assert_eq!(run.findings[0].observed, ObservedSymbol::Missing);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].attempts, 2);

    let navs = stats.navigations.lock().unwrap();
    assert_eq!(navs["https://shop.test/flaky"], 2);
    assert_eq!(navs["https://shop.test/down"], 2);
}

/// Strategy that blows up on every page, so the audit stage fails.
struct BrokenStrategy;

impl ProminenceStrategy for BrokenStrategy {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn candidates(&self, _document: &scraper::Html) -> Vec<TextBlock> {
        panic!("selector engine exploded")
    }
}

#[tokio::test]
async fn audit_failure_reports_every_attempt() {
    let renderer = Arc::new(MockRenderer::new(
        &[("https://shop.test/flaky", MockPage::Flaky(1, MISSING))],
        Duration::from_millis(5),
    ));
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut settings = settings(1, 0.0, &out);
    settings.retries = 2;
    let rules = Arc::new(
        AuditRules::new(
            vec![TermDefinition::new("Vitamix", RequiredSymbol::Registered)],
            Box::new(BrokenStrategy),
            Tolerance::default(),
        )
        .unwrap(),
    );

    let run = fetcher::run(
        renderer,
        entries(&["https://shop.test/flaky"]),
        rules,
        &settings,
        None,
        cancel_rx,
    )
    .await
    .unwrap();

    assert_eq!(run.urls_fetched, 0);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].stage, FailureStage::Audit);
    // Navigation failed once, then succeeded on the second attempt.
    assert_eq!(run.failures[0].attempts, 2);
}

#[tokio::test]
async fn flagged_pages_get_screenshots() {
    let renderer = Arc::new(MockRenderer::new(
        &[
            ("https://shop.test/bad", MockPage::Html(MISSING)),
            ("https://shop.test/good", MockPage::Html(PRESENT)),
        ],
        Duration::from_millis(5),
    ));
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut settings = settings(2, 0.0, &out);
    settings.screenshots = true;

    let run = fetcher::run(
        renderer,
        entries(&["https://shop.test/bad", "https://shop.test/good"]),
        rules(),
        &settings,
        None,
        cancel_rx,
    )
    .await
    .unwrap();

    let bad = &run.findings[0];
    let shot = bad.screenshot.as_deref().expect("issue finding has a screenshot");
    assert!(shot.starts_with("screenshots/0000-"));
    assert!(out.path().join(shot).exists());
    assert!(run.findings[1].screenshot.is_none());
}

#[tokio::test]
async fn no_tabs_is_fatal() {
    let mut renderer = MockRenderer::new(
        &[("https://shop.test/", MockPage::Html(PRESENT))],
        Duration::ZERO,
    );
    renderer.refuse_tabs = true;
    let out = TempDir::new().unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = fetcher::run(
        Arc::new(renderer),
        entries(&["https://shop.test/"]),
        rules(),
        &settings(2, 0.0, &out),
        None,
        cancel_rx,
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("target crashed"));
}

#[tokio::test]
async fn interrupt_keeps_finished_pages() {
    let urls = ["https://shop.test/1", "https://shop.test/2", "https://shop.test/3"];
    let pages: Vec<(&str, MockPage)> = urls.iter().map(|u| (*u, MockPage::Html(MISSING))).collect();
    let renderer = Arc::new(MockRenderer::new(&pages, Duration::from_millis(200)));
    let out = TempDir::new().unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = cancel_tx.send(true);
    });

    let started = Instant::now();
    let run = fetcher::run(
        renderer.clone(),
        entries(&urls),
        rules(),
        &settings(1, 0.0, &out),
        None,
        cancel_rx,
    )
    .await
    .unwrap();

    assert!(run.interrupted);
    assert_eq!(run.urls_fetched, 1);
    assert_eq!(run.urls_skipped, 2);
    assert_eq!(run.findings.len(), 1);
    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(renderer.active_contexts(), 0);
}
