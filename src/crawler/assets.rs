//! Concurrent asset download pipeline
//!
//! A fixed pool of worker tasks drains one job queue. Every canonical URL
//! gets exactly one job for the whole run; later requests for the same URL
//! share the first job's result channel instead of fetching again.

use crate::crawler::{FetchClient, Shutdown};
use crate::mirror::SharedMapper;
use crate::output::{ErrorKind, Failure, FailureTarget};
use crate::state::{AssetRecord, AssetStatus};
use crate::url::CanonicalUrl;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Final state of one asset, as seen by the pages that reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOutcome {
    /// Path relative to the mirror root; set even when the download failed
    pub local_path: PathBuf,
    pub status: AssetStatus,
}

/// A queued download and the channel its outcome is published on
struct AssetJob {
    url: CanonicalUrl,
    result: watch::Sender<Option<AssetOutcome>>,
}

/// Handle on the eventual outcome of an asset request
#[derive(Debug, Clone)]
pub struct AssetTicket {
    url: CanonicalUrl,
    receiver: watch::Receiver<Option<AssetOutcome>>,
}

impl AssetTicket {
    pub fn url(&self) -> &CanonicalUrl {
        &self.url
    }

    /// Returns the outcome if the job has already finished
    pub fn peek(&self) -> Option<AssetOutcome> {
        self.receiver.borrow().clone()
    }

    /// Waits for the job to finish
    ///
    /// Returns `None` if the job was dropped without finishing, which only
    /// happens when the pipeline is torn down during shutdown.
    pub async fn wait(mut self) -> Option<AssetOutcome> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
    }
}

struct Entry {
    record: AssetRecord,
    result: watch::Receiver<Option<AssetOutcome>>,
}

/// Run-wide asset table, keyed by canonical URL
#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    /// Keys in first-request order
    order: Vec<String>,
    failures: Vec<Failure>,
}

impl Registry {
    fn complete(&mut self, url: &CanonicalUrl, update: impl FnOnce(&mut AssetRecord)) {
        if let Some(entry) = self.entries.get_mut(url.key()) {
            update(&mut entry.record);
        }
    }

    fn fail(
        &mut self,
        url: &CanonicalUrl,
        local_path: PathBuf,
        attempts: u32,
        kind: ErrorKind,
        reason: String,
    ) {
        self.complete(url, |record| {
            record.fail(local_path, attempts, reason.clone())
        });
        self.failures.push(Failure {
            url: url.to_string(),
            target: FailureTarget::Asset,
            kind,
            reason,
        });
    }
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a worker needs to turn a job into a file
struct WorkerContext {
    client: FetchClient,
    mapper: SharedMapper,
    root: PathBuf,
    registry: SharedRegistry,
}

impl WorkerContext {
    async fn run(&self, url: &CanonicalUrl) -> AssetOutcome {
        let response = match self.client.fetch(url.as_url()).await {
            Ok(response) => response,
            Err(error) => {
                let local_path = lock(&self.mapper).map_asset(url, None);
                tracing::warn!("Asset {} failed: {}", url, error.cause);
                lock(&self.registry).fail(
                    url,
                    local_path.clone(),
                    error.attempts,
                    error.cause.kind(),
                    error.cause.to_string(),
                );
                return AssetOutcome {
                    local_path,
                    status: AssetStatus::Failed,
                };
            }
        };

        let local_path = lock(&self.mapper).map_asset(url, response.content_type.as_deref());
        let bytes = response.body.len() as u64;

        match write_file(&self.root.join(&local_path), &response.body).await {
            Ok(()) => {
                tracing::debug!(
                    "Saved asset {} -> {} ({} bytes, {} attempt(s))",
                    url,
                    local_path.display(),
                    bytes,
                    response.attempts
                );
                lock(&self.registry).complete(url, |record| {
                    record.succeed(local_path.clone(), response.attempts, bytes)
                });
                AssetOutcome {
                    local_path,
                    status: AssetStatus::Success,
                }
            }
            Err(e) => {
                tracing::warn!("Cannot write asset {}: {}", local_path.display(), e);
                lock(&self.registry).fail(
                    url,
                    local_path.clone(),
                    response.attempts,
                    ErrorKind::Path,
                    e.to_string(),
                );
                AssetOutcome {
                    local_path,
                    status: AssetStatus::Failed,
                }
            }
        }
    }
}

/// Writes `body` to `path`, creating parent directories as needed
pub(crate) async fn write_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await
}

/// Records and failures collected by the pipeline
#[derive(Debug, Default)]
pub struct AssetReport {
    /// One record per requested asset, in request order
    pub records: Vec<AssetRecord>,
    pub failures: Vec<Failure>,
}

impl AssetReport {
    pub fn fetched(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.status.is_success())
            .count()
    }
}

/// Bounded pool of asset download workers
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::config::Config;
/// use sumi_mirror::crawler::{AssetPipeline, FetchClient, Shutdown};
/// use sumi_mirror::mirror::PathMapper;
/// use sumi_mirror::url::CanonicalUrl;
/// use std::time::Duration;
///
/// # async fn demo() {
/// let shutdown = Shutdown::new();
/// let client = FetchClient::from_config(&Config::for_seed("https://example.com/"), shutdown.clone()).unwrap();
/// let pipeline = AssetPipeline::spawn(6, client, PathMapper::shared(), "example_com".into(), shutdown);
///
/// let logo = CanonicalUrl::parse("https://example.com/logo.png").unwrap();
/// let outcome = pipeline.request(&logo).wait().await;
/// let report = pipeline.finish(Duration::from_secs(5)).await;
/// # }
/// ```
pub struct AssetPipeline {
    jobs: Option<mpsc::UnboundedSender<AssetJob>>,
    registry: SharedRegistry,
    mapper: SharedMapper,
    workers: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
}

impl AssetPipeline {
    /// Starts `workers` download tasks writing under `root`
    pub fn spawn(
        workers: usize,
        client: FetchClient,
        mapper: SharedMapper,
        root: PathBuf,
        shutdown: Shutdown,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<AssetJob>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let registry = SharedRegistry::default();

        let context = Arc::new(WorkerContext {
            client,
            mapper: Arc::clone(&mapper),
            root,
            registry: Arc::clone(&registry),
        });

        let handles = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        let outcome = context.run(&job.url).await;
                        job.result.send_replace(Some(outcome));
                    }
                    tracing::trace!("Asset worker {} stopped", id);
                })
            })
            .collect();

        Self {
            jobs: Some(sender),
            registry,
            mapper,
            workers: handles,
            shutdown,
        }
    }

    /// Requests an asset, queueing a download only on the first request
    ///
    /// Safe to call any number of times for the same URL; every caller gets
    /// a ticket for the same job.
    pub fn request(&self, url: &CanonicalUrl) -> AssetTicket {
        let mut registry = lock(&self.registry);
        if let Some(entry) = registry.entries.get(url.key()) {
            return AssetTicket {
                url: url.clone(),
                receiver: entry.result.clone(),
            };
        }

        let (sender, receiver) = watch::channel(None);
        registry.entries.insert(
            url.key().to_string(),
            Entry {
                record: AssetRecord::pending(url.clone()),
                result: receiver.clone(),
            },
        );
        registry.order.push(url.key().to_string());
        drop(registry);

        tracing::trace!("Queued asset {}", url);
        if let Some(jobs) = &self.jobs {
            let job = AssetJob {
                url: url.clone(),
                result: sender,
            };
            if jobs.send(job).is_err() {
                tracing::debug!("Asset queue closed, dropping {}", url);
            }
        }

        AssetTicket {
            url: url.clone(),
            receiver,
        }
    }

    /// Number of distinct assets requested so far
    pub fn requested(&self) -> usize {
        lock(&self.registry).order.len()
    }

    /// Snapshot of every asset record in request order
    pub fn records(&self) -> Vec<AssetRecord> {
        let registry = lock(&self.registry);
        registry
            .order
            .iter()
            .filter_map(|key| registry.entries.get(key))
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Closes the queue, waits for the workers and returns the report
    ///
    /// Without an interrupt every queued job runs to completion. Once
    /// shutdown is triggered the workers get at most `grace` to drain;
    /// after that they are aborted and unfinished assets are recorded as
    /// cancelled.
    pub async fn finish(mut self, grace: Duration) -> AssetReport {
        self.jobs = None;
        let mut workers = std::mem::take(&mut self.workers);

        let abandoned = tokio::select! {
            _ = async {
                for handle in workers.iter_mut() {
                    let _ = handle.await;
                }
            } => false,
            _ = async {
                self.shutdown.triggered().await;
                tokio::time::sleep(grace).await;
            } => true,
        };

        if abandoned {
            tracing::warn!("Abandoning asset downloads still running after {:?}", grace);
            for handle in &workers {
                handle.abort();
            }
        }

        let mut registry = lock(&self.registry);
        let pending: Vec<CanonicalUrl> = registry
            .order
            .iter()
            .filter_map(|key| registry.entries.get(key))
            .filter(|entry| !entry.record.status.is_terminal())
            .map(|entry| entry.record.url.clone())
            .collect();

        for url in pending {
            let local_path = lock(&self.mapper).map_asset(&url, None);
            registry.fail(
                &url,
                local_path,
                0,
                ErrorKind::Cancelled,
                "download abandoned at shutdown".to_string(),
            );
        }

        let records = registry
            .order
            .iter()
            .filter_map(|key| registry.entries.get(key))
            .map(|entry| entry.record.clone())
            .collect();

        AssetReport {
            records,
            failures: std::mem::take(&mut registry.failures),
        }
    }
}
