use crate::UrlError;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

/// Schemes the mirror knows how to fetch
const FETCHABLE_SCHEMES: &[&str] = &["http", "https"];

/// A URL in canonical form
///
/// Equality and hashing use only the dedup key: scheme, host, non-default
/// port, path without a trailing slash, and sorted query. The fetchable URL
/// keeps the trailing slash it was first seen with so that pretty paths can
/// still be told apart from plain ones when choosing a local file name.
#[derive(Debug, Clone)]
pub struct CanonicalUrl {
    url: Url,
    key: String,
    pretty: bool,
}

impl CanonicalUrl {
    /// Parses an absolute http(s) URL, typically the crawl seed
    pub fn parse(absolute: &str) -> Result<Self, UrlError> {
        let url = Url::parse(absolute.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        if !FETCHABLE_SCHEMES.contains(&url.scheme()) {
            return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
        }
        canonicalize(url)
    }

    /// The URL to request over the network
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The dedup key shared by every spelling of this URL
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when the path ends in `/` (the root always does)
    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Path without its trailing slash; the root path is `/`
    pub fn path(&self) -> &str {
        let path = self.url.path();
        if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Lower-cased extension of the last path segment, if it has one
    pub fn extension(&self) -> Option<String> {
        if self.pretty {
            return None;
        }
        let last = self.path().rsplit('/').next()?;
        let (stem, ext) = last.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Outcome of normalizing a reference found in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// An http(s) URL that may be fetched or rewritten
    Canonical(CanonicalUrl),
    /// A non-fetchable scheme such as `mailto:` or `javascript:`
    Rejected(String),
}

/// Normalizes a raw reference against the URL of the page it came from
///
/// # Normalization Steps
///
/// 1. Trim whitespace and treat backslashes as path separators
/// 2. Classify explicit non-http(s) schemes (`mailto:`, `tel:`,
///    `javascript:`, `data:`, ...) as rejected without resolving them
/// 3. Resolve relative references against `base`; this lower-cases the
///    scheme and host, drops default ports and removes `.`/`..` segments
/// 4. Remove the fragment
/// 5. Collapse repeated slashes in the path
/// 6. Sort query components by key (stable) and drop an empty query
/// 7. Build the dedup key with the trailing slash removed (except for `/`)
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::{normalize, Normalized};
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// let a = normalize("guide/#intro", &base).unwrap();
/// let b = normalize("HTTPS://EXAMPLE.COM:443/docs/guide", &base).unwrap();
/// assert_eq!(a, b);
///
/// let mail = normalize("mailto:team@example.com", &base).unwrap();
/// assert!(matches!(mail, Normalized::Rejected(_)));
/// ```
pub fn normalize(raw: &str, base: &Url) -> Result<Normalized, UrlError> {
    let cleaned = raw.trim().replace('\\', "/");

    if let Some(scheme) = explicit_scheme(&cleaned) {
        if !FETCHABLE_SCHEMES.contains(&scheme.as_str()) {
            return Ok(Normalized::Rejected(scheme));
        }
    }

    let url = base
        .join(&cleaned)
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw.trim(), e)))?;

    if !FETCHABLE_SCHEMES.contains(&url.scheme()) {
        return Ok(Normalized::Rejected(url.scheme().to_string()));
    }

    canonicalize(url).map(Normalized::Canonical)
}

/// Returns the lower-cased scheme if the reference starts with one
fn explicit_scheme(reference: &str) -> Option<String> {
    let (scheme, _) = reference.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme.to_ascii_lowercase())
    } else {
        None
    }
}

/// Applies the canonical form to an already-resolved http(s) URL
fn canonicalize(mut url: Url) -> Result<CanonicalUrl, UrlError> {
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(UrlError::MissingHost(url.to_string())),
    };

    url.set_fragment(None);

    let path = collapse_slashes(url.path());
    url.set_path(&path);
    let pretty = path.ends_with('/');

    let query = url.query().map(sort_query);
    url.set_query(query.as_deref().filter(|q| !q.is_empty()));

    let key_path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path.as_str()
    };

    let mut key = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(key_path);
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    Ok(CanonicalUrl { url, key, pretty })
}

/// Collapses runs of `/` into one; an empty path becomes `/`
fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len() + 1);
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if !collapsed.starts_with('/') {
        collapsed.insert(0, '/');
    }
    collapsed
}

/// Sorts `&`-separated query components by key, keeping their encoding intact
///
/// The sort is stable, so repeated keys keep their relative order.
fn sort_query(query: &str) -> String {
    let mut parts: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    parts.sort_by(|a, b| query_key(a).cmp(query_key(b)));
    parts.join("&")
}

fn query_key(part: &str) -> &str {
    part.split_once('=').map_or(part, |(key, _)| key)
}
