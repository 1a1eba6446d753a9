//! Crawl summary types
//!
//! A [`CrawlSummary`] is created when the crawl starts, filled in by the
//! controlling loop and handed back once the crawl ends.

use crate::state::{AssetRecord, AssetStatus};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Classification of a per-URL failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeouts, connection errors, 5xx and 429 that outlived their retries
    TransientNetwork,

    /// Non-retryable responses such as 404 or a broken redirect chain
    PermanentFetch,

    /// A page body that could not be read as HTML
    Parse,

    /// Writing under the mirror root failed
    Path,

    /// Abandoned because the run was interrupted
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::PermanentFetch => "permanent-fetch",
            Self::Parse => "parse",
            Self::Path => "path",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failure concerns a page or an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTarget {
    Page,
    Asset,
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => f.write_str("page"),
            Self::Asset => f.write_str("asset"),
        }
    }
}

/// One failed URL with its reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub url: String,
    pub target: FailureTarget,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Run-log entry for one dispatched page
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub url: String,

    /// HTTP status, absent when no response arrived
    pub status: Option<u16>,

    pub latency: Duration,

    pub bytes: u64,

    /// Where the page was written, relative to the mirror root
    pub local_path: Option<PathBuf>,
}

/// Final report of a mirror run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub seed: String,

    /// Mirror root on disk
    pub destination: PathBuf,

    pub started_at: DateTime<Utc>,

    /// Pages in the order they were dispatched (breadth-first)
    pub pages: Vec<PageVisit>,

    /// Pages taken from the frontier, successful or not
    pub pages_fetched: usize,

    /// Assets downloaded and written
    pub assets_fetched: usize,

    /// Every asset requested during the run, in request order
    pub assets: Vec<AssetRecord>,

    /// Every failed page or asset, once each
    pub failures: Vec<Failure>,

    pub elapsed: Duration,

    /// True if the run was stopped by an interrupt
    pub interrupted: bool,
}

impl CrawlSummary {
    /// Starts an empty summary
    pub fn new(seed: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            seed: seed.into(),
            destination: destination.into(),
            started_at: Utc::now(),
            pages: Vec::new(),
            pages_fetched: 0,
            assets_fetched: 0,
            assets: Vec::new(),
            failures: Vec::new(),
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    pub fn record_page(&mut self, visit: PageVisit) {
        self.pages.push(visit);
    }

    pub fn record_failure(
        &mut self,
        url: impl Into<String>,
        target: FailureTarget,
        kind: ErrorKind,
        reason: impl Into<String>,
    ) {
        self.failures.push(Failure {
            url: url.into(),
            target,
            kind,
            reason: reason.into(),
        });
    }

    /// Assets that were referenced but could not be saved
    pub fn missing_assets(&self) -> impl Iterator<Item = &AssetRecord> {
        self.assets
            .iter()
            .filter(|record| record.status == AssetStatus::Failed)
    }

    /// Pages that were written to disk
    pub fn pages_saved(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.local_path.is_some())
            .count()
    }

    /// Failures concerning the given target
    pub fn failures_for(&self, target: FailureTarget) -> impl Iterator<Item = &Failure> {
        self.failures
            .iter()
            .filter(move |failure| failure.target == target)
    }

    /// Total bytes written for pages and assets
    pub fn total_bytes(&self) -> u64 {
        let pages: u64 = self.pages.iter().map(|page| page.bytes).sum();
        let assets: u64 = self.assets.iter().map(|asset| asset.bytes).sum();
        pages + assets
    }
}
