// Copyright 2026 markaudit contributors
// SPDX-License-Identifier: MIT

//! Runner for the markaudit trademark audit.
//!
//! Drives a headless Chromium over a URL list with a bounded worker pool and
//! a global rate limit, audits each rendered page with the `markaudit`
//! library, and writes the report artifacts.

pub mod cli;
pub mod fetcher;
pub mod progress;
pub mod renderer;
pub mod throttle;

pub use fetcher::{AuditRun, FetchSettings, PageOutcome};
pub use renderer::{NavigationResult, RenderContext, Renderer};
