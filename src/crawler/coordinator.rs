//! Crawler coordinator - main mirror orchestration logic
//!
//! This module contains the controlling loop that coordinates a run:
//! - Validating configuration and preparing the destination
//! - Draining the breadth-first frontier one page at a time
//! - Fetching, processing and writing each page
//! - Handling interrupts
//! - Assembling the final summary

use crate::config::{validate, Config};
use crate::crawler::assets::write_file;
use crate::crawler::{
    AssetPipeline, DecodedPage, FetchCause, FetchClient, FetchError, Frontier, HtmlProcessor,
    PageContext, Shutdown,
};
use crate::mirror::{PathMapper, SharedMapper};
use crate::output::{CrawlSummary, ErrorKind, FailureTarget, PageVisit};
use crate::url::{classify, default_destination, CanonicalUrl};
use crate::MirrorError;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::Instant;
use url::Url;

/// Main mirror coordinator structure
pub struct Coordinator {
    config: Config,
    seed: CanonicalUrl,
    destination: PathBuf,
    client: FetchClient,
    mapper: SharedMapper,
    shutdown: Shutdown,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Validates the configuration, creates the destination directory and
    /// builds the HTTP client. Any failure here is a startup error.
    ///
    /// # Arguments
    ///
    /// * `config` - The mirror configuration
    /// * `shutdown` - Signal that interrupts the run
    pub fn new(config: Config, shutdown: Shutdown) -> Result<Self, MirrorError> {
        validate(&config)?;
        let seed = CanonicalUrl::parse(&config.seed)?;

        let destination = PathBuf::from(
            config
                .output
                .destination
                .clone()
                .unwrap_or_else(|| default_destination(seed.as_url())),
        );
        std::fs::create_dir_all(&destination).map_err(|source| MirrorError::Destination {
            path: destination.clone(),
            source,
        })?;

        let client = FetchClient::from_config(&config, shutdown.clone())?;

        Ok(Self {
            config,
            seed,
            destination,
            client,
            mapper: PathMapper::shared(),
            shutdown,
        })
    }

    pub fn seed(&self) -> &CanonicalUrl {
        &self.seed
    }

    /// Root directory of the mirror
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Runs the controlling loop
    ///
    /// This is the core logic that:
    /// 1. Pops the next page from the frontier
    /// 2. Fetches it
    /// 3. Processes it, waiting for the page's assets
    /// 4. Writes the rewritten page
    /// 5. Pushes discovered pages back to the frontier
    ///
    /// Only a failure to fetch the seed ends the run with an error; every
    /// other failure is recorded in the summary.
    pub async fn run(self) -> Result<CrawlSummary, MirrorError> {
        let started = Instant::now();
        let grace = self.config.crawler.shutdown_grace();

        let mut state = RunState {
            frontier: Frontier::new(self.config.crawler.max_pages),
            origin: self.seed.as_url().clone(),
            summary: CrawlSummary::new(self.seed.as_str(), &self.destination),
        };
        state.frontier.push(self.seed.clone());

        let pipeline = AssetPipeline::spawn(
            self.config.crawler.workers,
            self.client.clone(),
            self.mapper.clone(),
            self.destination.clone(),
            self.shutdown.clone(),
        );
        let processor = HtmlProcessor::new(self.mapper.clone(), self.shutdown.clone(), grace);

        tracing::info!(
            "Mirroring {} into {} (max {} pages, {} workers)",
            self.seed,
            self.destination.display(),
            state.frontier.max_pages(),
            self.config.crawler.workers
        );

        loop {
            if self.shutdown.is_triggered() {
                tracing::info!("Interrupted, no further pages will be fetched");
                state.summary.interrupted = true;
                break;
            }

            let Some(page_url) = state.frontier.pop() else {
                break;
            };
            let is_seed = state.frontier.pages_fetched() == 1;

            match self
                .visit(&page_url, is_seed, &mut state, &processor, &pipeline)
                .await
            {
                Ok(discovered) => {
                    for url in discovered {
                        state.frontier.push(url);
                    }
                }
                Err(error) if is_seed && error.cause != FetchCause::Cancelled => {
                    tracing::error!("Seed {} is unreachable: {}", page_url, error.cause);
                    return Err(MirrorError::SeedUnreachable(error));
                }
                Err(error) => {
                    tracing::warn!("Page {} failed: {}", page_url, error.cause);
                    state.summary.record_failure(
                        page_url.as_str(),
                        FailureTarget::Page,
                        error.cause.kind(),
                        error.cause.to_string(),
                    );
                }
            }

            if state.frontier.pages_fetched() % 10 == 0 {
                tracing::info!(
                    "Progress: {} pages fetched, {} queued, {} assets requested",
                    state.frontier.pages_fetched(),
                    state.frontier.queued(),
                    pipeline.requested()
                );
            }
        }

        let report = pipeline.finish(grace).await;

        let mut summary = state.summary;
        summary.pages_fetched = state.frontier.pages_fetched();
        summary.assets_fetched = report.fetched();
        summary.assets = report.records;
        summary.failures.extend(report.failures);
        summary.interrupted |= self.shutdown.is_triggered();
        summary.elapsed = started.elapsed();

        tracing::info!(
            "Mirror finished: {} pages, {} assets, {} failures in {:?}",
            summary.pages_fetched,
            summary.assets_fetched,
            summary.failures.len(),
            summary.elapsed
        );

        Ok(summary)
    }

    /// Fetches, processes and writes one page
    ///
    /// Returns the same-origin pages it links to, or the fetch error.
    async fn visit(
        &self,
        url: &CanonicalUrl,
        is_seed: bool,
        state: &mut RunState,
        processor: &HtmlProcessor,
        pipeline: &AssetPipeline,
    ) -> Result<Vec<CanonicalUrl>, FetchError> {
        let response = match self.client.fetch(url.as_url()).await {
            Ok(response) => response,
            Err(error) => {
                state.summary.record_page(PageVisit {
                    url: url.to_string(),
                    status: error.cause.status(),
                    latency: std::time::Duration::ZERO,
                    bytes: 0,
                    local_path: None,
                });
                return Err(error);
            }
        };

        tracing::info!(
            "{} {} ({} bytes, {} ms, {} attempt(s))",
            response.status,
            url,
            response.body.len(),
            response.latency.as_millis(),
            response.attempts
        );

        let local_path = self.lock_mapper().map_page(url);
        self.follow_redirect(url, &response.final_url, is_seed, &local_path, state);

        let (output, discovered) = if response.is_html() {
            let page = DecodedPage::decode(&response.body, response.content_type.as_deref());
            let context = PageContext {
                url,
                base: &response.final_url,
                origin: &state.origin,
                local_path: &local_path,
            };
            let processed = processor.process(&page.text, &context, pipeline).await;

            for malformed in &processed.malformed {
                state.summary.record_failure(
                    url.as_str(),
                    FailureTarget::Page,
                    ErrorKind::Parse,
                    format!("{:?}: {}", malformed.raw, malformed.reason),
                );
            }
            (page.encode(&processed.html), processed.discovered)
        } else {
            tracing::debug!(
                "Saving non-HTML page {} as is ({})",
                url,
                response.content_type.as_deref().unwrap_or("unknown type")
            );
            (response.body.clone(), Vec::new())
        };

        let written = match write_file(&self.destination.join(&local_path), &output).await {
            Ok(()) => Some(local_path),
            Err(e) => {
                tracing::warn!("Cannot write page {}: {}", local_path.display(), e);
                state.summary.record_failure(
                    url.as_str(),
                    FailureTarget::Page,
                    ErrorKind::Path,
                    e.to_string(),
                );
                None
            }
        };

        state.summary.record_page(PageVisit {
            url: url.to_string(),
            status: Some(response.status),
            latency: response.latency,
            bytes: response.body.len() as u64,
            local_path: written,
        });

        Ok(discovered)
    }

    /// Accounts for a page that was answered from another URL
    ///
    /// A seed redirected to another origin (http to https, a `www.` host)
    /// moves the mirror to that origin. A redirect target inside the mirror
    /// is marked visited and shares the requested page's file, so links to
    /// it resolve locally without a second fetch.
    fn follow_redirect(
        &self,
        requested: &CanonicalUrl,
        final_url: &Url,
        is_seed: bool,
        local_path: &Path,
        state: &mut RunState,
    ) {
        let Ok(landed) = CanonicalUrl::parse(final_url.as_str()) else {
            return;
        };
        if landed == *requested {
            return;
        }

        if is_seed && landed.as_url().origin() != state.origin.origin() {
            tracing::info!(
                "Seed redirected to {}, mirroring {} instead",
                landed,
                landed.as_url().origin().ascii_serialization()
            );
            state.origin = landed.as_url().clone();
        }

        if classify(&landed, &state.origin).is_mirrored() {
            tracing::debug!("{} redirected to {}", requested, landed);
            self.lock_mapper().alias(&landed, local_path);
            state.frontier.mark_visited(landed);
        }
    }

    fn lock_mapper(&self) -> std::sync::MutexGuard<'_, PathMapper> {
        self.mapper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the controlling loop owns while a run is in progress
struct RunState {
    frontier: Frontier,
    /// URL whose origin is being mirrored; starts as the seed
    origin: Url,
    summary: CrawlSummary,
}

/// Runs a complete mirror operation
///
/// This is the main entry point for starting a mirror. It will:
/// 1. Validate the configuration
/// 2. Create the destination directory
/// 3. Build the HTTP client
/// 4. Crawl breadth-first from the seed, downloading assets
/// 5. Return the summary
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::{run_mirror, Config, Shutdown};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let summary = run_mirror(Config::for_seed("https://example.com/"), Shutdown::new()).await?;
/// println!("{} pages mirrored", summary.pages_fetched);
/// # Ok(())
/// # }
/// ```
pub async fn run_mirror(config: Config, shutdown: Shutdown) -> Result<CrawlSummary, MirrorError> {
    let coordinator = Coordinator::new(config, shutdown)?;
    coordinator.run().await
}
