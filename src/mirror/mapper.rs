use super::segment::{
    extension_for_content_type, has_extension, sanitize_segments, short_hash, shorten_segment,
    split_extension, truncate_bytes, with_stem_suffix,
};
use crate::url::CanonicalUrl;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Longest single path segment written to disk, in bytes
pub const SEGMENT_LIMIT: usize = 120;

/// Longest relative path written under the mirror root, in bytes
pub const PATH_LIMIT: usize = 240;

/// Directory used when even a hashed leaf does not fit under [`PATH_LIMIT`]
const OVERFLOW_DIR: &str = "_long";

/// Path mapper shared between the controlling loop and asset workers
pub type SharedMapper = Arc<Mutex<PathMapper>>;

/// What the local file is going to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind<'a> {
    /// An HTML page, always saved with an `.html` name
    Page,
    /// Any other resource; the content type fills in a missing extension
    Asset { content_type: Option<&'a str> },
}

/// Maps canonical URLs to file paths relative to the mirror root
///
/// Mapping is deterministic: the first call for a URL decides its path and
/// every later call returns the same one. Two different URLs never share a
/// path, unless one was registered as an [`alias`](PathMapper::alias) of the
/// other; otherwise the later one gets a suffix derived from its canonical key.
#[derive(Debug)]
pub struct PathMapper {
    segment_limit: usize,
    path_limit: usize,

    /// Canonical key -> assigned path
    assigned: HashMap<String, PathBuf>,

    /// Assigned path -> canonical key that owns it
    claimed: HashMap<PathBuf, String>,
}

impl Default for PathMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl PathMapper {
    pub fn new() -> Self {
        Self::with_limits(SEGMENT_LIMIT, PATH_LIMIT)
    }

    pub fn with_limits(segment_limit: usize, path_limit: usize) -> Self {
        Self {
            segment_limit,
            path_limit,
            assigned: HashMap::new(),
            claimed: HashMap::new(),
        }
    }

    /// Wraps a fresh mapper for sharing across tasks
    pub fn shared() -> SharedMapper {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Returns the local path for `url`, assigning one on first use
    pub fn map(&mut self, url: &CanonicalUrl, kind: LocalKind<'_>) -> PathBuf {
        if let Some(path) = self.assigned.get(url.key()) {
            return path.clone();
        }

        let candidate = self.candidate(url, kind);
        let path = self.disambiguate(candidate, url.key());

        self.claimed.insert(path.clone(), url.key().to_string());
        self.assigned.insert(url.key().to_string(), path.clone());
        path
    }

    pub fn map_page(&mut self, url: &CanonicalUrl) -> PathBuf {
        self.map(url, LocalKind::Page)
    }

    pub fn map_asset(&mut self, url: &CanonicalUrl, content_type: Option<&str>) -> PathBuf {
        self.map(url, LocalKind::Asset { content_type })
    }

    /// Makes `url` resolve to `path`, an already assigned file
    ///
    /// Used when a request was redirected, so links to the final URL point
    /// at the file saved for the requested one. Returns false and changes
    /// nothing if `url` already has a path.
    pub fn alias(&mut self, url: &CanonicalUrl, path: &Path) -> bool {
        if self.assigned.contains_key(url.key()) {
            return false;
        }
        self.assigned.insert(url.key().to_string(), path.to_path_buf());
        true
    }

    /// Returns the path already assigned to `url`, if any
    pub fn lookup(&self, url: &CanonicalUrl) -> Option<&Path> {
        self.assigned.get(url.key()).map(PathBuf::as_path)
    }

    /// Number of URLs with an assigned path
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    fn candidate(&self, url: &CanonicalUrl, kind: LocalKind<'_>) -> PathBuf {
        let mut segments = sanitize_segments(url.path());
        let directory_style = url.is_pretty() || segments.is_empty();

        let mut leaf = match kind {
            LocalKind::Page => {
                if directory_style {
                    "index.html".to_string()
                } else {
                    let last = segments.pop().unwrap_or_default();
                    page_file_name(last)
                }
            }
            LocalKind::Asset { content_type } => {
                let inferred = content_type.and_then(extension_for_content_type);
                if directory_style {
                    match inferred {
                        Some(ext) => format!("index.{}", ext),
                        None => "index".to_string(),
                    }
                } else {
                    let last = segments.pop().unwrap_or_default();
                    match inferred {
                        Some(ext) if !has_extension(&last) => format!("{}.{}", last, ext),
                        _ => last,
                    }
                }
            }
        };

        if let Some(query) = url.query() {
            leaf = with_stem_suffix(&leaf, &format!("-q{}", short_hash(query, 10)));
        }

        let mut segments: Vec<String> = segments
            .iter()
            .map(|segment| shorten_segment(segment, self.segment_limit))
            .collect();
        segments.push(shorten_segment(&leaf, self.segment_limit));

        if joined_len(&segments) > self.path_limit {
            let leaf = segments.pop().unwrap_or_default();
            let (stem, ext) = split_extension(&leaf);
            let hashed = format!(
                "{}-{}{}",
                truncate_bytes(stem, 24),
                short_hash(url.key(), 16),
                ext
            );
            segments.push(hashed);

            if joined_len(&segments) > self.path_limit {
                let hashed = segments.pop().unwrap_or_default();
                segments = vec![OVERFLOW_DIR.to_string(), hashed];
            }
        }

        segments.iter().collect()
    }

    fn disambiguate(&self, candidate: PathBuf, key: &str) -> PathBuf {
        let is_free = |path: &PathBuf| match self.claimed.get(path) {
            Some(owner) => owner == key,
            None => true,
        };

        if is_free(&candidate) {
            return candidate;
        }

        let name = file_name(&candidate);
        let suffix = short_hash(key, 8);
        let mut attempt = 0u32;
        loop {
            let tag = if attempt == 0 {
                format!("-{}", suffix)
            } else {
                format!("-{}-{}", suffix, attempt)
            };
            let path = candidate.with_file_name(with_stem_suffix(&name, &tag));
            if is_free(&path) {
                tracing::debug!(
                    "Local path {} already taken, using {} for {}",
                    candidate.display(),
                    path.display(),
                    key
                );
                return path;
            }
            attempt += 1;
        }
    }
}

/// File name for a page whose URL does not end in a slash
fn page_file_name(last: String) -> String {
    let (_, ext) = split_extension(&last);
    match ext.to_ascii_lowercase().as_str() {
        ".html" | ".htm" => last,
        _ => format!("{}.html", last),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Length of the segments joined with `/`
fn joined_len(segments: &[String]) -> usize {
    segments.iter().map(String::len).sum::<usize>() + segments.len().saturating_sub(1)
}
