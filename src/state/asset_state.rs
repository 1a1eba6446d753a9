/// Asset state definitions for tracking downloads during a crawl
///
/// One [`AssetRecord`] exists per canonical asset URL for the whole run.
use crate::url::CanonicalUrl;
use std::fmt;
use std::path::PathBuf;

/// Represents the fetch status of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    /// A fetch job has been queued or is running
    Pending,

    /// The asset was downloaded and written under the mirror root
    Success,

    /// The fetch or the write failed; the reference still points at the
    /// would-be local path
    Failed,
}

impl AssetStatus {
    /// Returns true once the asset will not change state again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if this represents a successful download
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical remote URL, its local path and how fetching it went
#[derive(Debug, Clone)]
pub struct AssetRecord {
    /// Canonical remote URL
    pub url: CanonicalUrl,

    /// Path relative to the mirror root; set once the job finishes
    pub local_path: Option<PathBuf>,

    pub status: AssetStatus,

    /// Network attempts made, including retries
    pub attempts: u32,

    /// Bytes written to disk
    pub bytes: u64,

    /// Why the asset is missing, for failed records
    pub failure: Option<String>,
}

impl AssetRecord {
    /// Creates a pending record for a newly requested asset
    pub fn pending(url: CanonicalUrl) -> Self {
        Self {
            url,
            local_path: None,
            status: AssetStatus::Pending,
            attempts: 0,
            bytes: 0,
            failure: None,
        }
    }

    /// Marks the record as downloaded
    pub fn succeed(&mut self, local_path: PathBuf, attempts: u32, bytes: u64) {
        self.local_path = Some(local_path);
        self.status = AssetStatus::Success;
        self.attempts = attempts;
        self.bytes = bytes;
        self.failure = None;
    }

    /// Marks the record as missing
    pub fn fail(&mut self, local_path: PathBuf, attempts: u32, reason: impl Into<String>) {
        self.local_path = Some(local_path);
        self.status = AssetStatus::Failed;
        self.attempts = attempts;
        self.failure = Some(reason.into());
    }
}
