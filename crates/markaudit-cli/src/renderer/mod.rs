//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The fetcher
//! only talks to these traits, so tests drive it with an in-memory renderer.

pub mod chromium;

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Interval between page-stability probes.
const SETTLE_POLL_MS: u64 = 250;

/// Tags invisible elements so the exported HTML carries layout knowledge.
///
/// `display: none` marks the whole subtree; `visibility: hidden` and
/// zero-size boxes mark only the element itself. Returns the count marked.
pub const MARK_HIDDEN_SCRIPT: &str = r#"(() => {
  let marked = 0;
  const all = document.body ? document.body.querySelectorAll('*') : [];
  for (const el of all) {
    const style = window.getComputedStyle(el);
    if (style.display === 'none') {
      el.setAttribute('data-markaudit-hidden', '');
      marked++;
      continue;
    }
    const rect = el.getBoundingClientRect();
    if (style.visibility === 'hidden' || rect.width === 0 || rect.height === 0) {
      el.setAttribute('data-markaudit-invisible', '');
      marked++;
    }
  }
  return marked;
})()"#;

/// Reports document readiness and how many resources have loaded so far.
pub const STABILITY_PROBE_SCRIPT: &str = r#"(() => ({
  ready: document.readyState,
  resources: performance.getEntriesByType('resource').length
}))()"#;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

#[derive(Debug, Deserialize)]
struct StabilityProbe {
    ready: String,
    resources: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine. Safe to call more than once.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Capture a full-page PNG screenshot.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Wait until the document is complete and no new resources arrived
    /// between two consecutive probes. Returns `false` on timeout.
    async fn wait_until_stable(&self, timeout_ms: u64) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut last: Option<u64> = None;
        loop {
            let probe: Option<StabilityProbe> = self
                .execute_js(STABILITY_PROBE_SCRIPT)
                .await
                .ok()
                .and_then(|v| serde_json::from_value(v).ok());
            if let Some(p) = probe {
                if p.ready == "complete" && last == Some(p.resources) {
                    return Ok(true);
                }
                last = (p.ready == "complete").then_some(p.resources);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(SETTLE_POLL_MS)).await;
        }
    }
}
