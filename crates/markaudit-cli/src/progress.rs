// Copyright 2026 markaudit contributors
// SPDX-License-Identifier: MIT

//! Progress events and broadcast channel for real-time audit telemetry.
//!
//! The fetcher emits `ProgressEvent`s while a run is in flight, which flow
//! through a `tokio::sync::broadcast` channel to all subscribers (the CLI
//! progress printer, tests). When no subscriber exists, events are dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A progress event emitted during an audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A worker started fetching a URL.
    FetchStarted {
        index: usize,
        url: String,
        attempt: u32,
    },
    /// A page was rendered and audited.
    PageAudited {
        index: usize,
        url: String,
        findings: usize,
        issues: usize,
    },
    /// A URL failed after all attempts.
    FetchFailed {
        index: usize,
        url: String,
        error: String,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
    /// Every worker has finished.
    RunComplete {
        fetched: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

impl ProgressEventKind {
    /// Whether this event closes out one URL.
    pub fn is_url_done(&self) -> bool {
        matches!(self, Self::PageAudited { .. } | Self::FetchFailed { .. })
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emits sequenced events from any number of workers.
#[derive(Debug, Default)]
pub struct ProgressEmitter {
    tx: Option<ProgressSender>,
    seq: AtomicU64,
}

impl ProgressEmitter {
    pub fn new(tx: Option<ProgressSender>) -> Self {
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Send an event, ignoring the error raised when nobody is listening.
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent { seq, event });
        }
    }
}
