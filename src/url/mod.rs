//! URL handling module for Sumi-Mirror
//!
//! This module provides URL canonicalization, scheme rejection, and the
//! same-origin classification that decides which references are mirrored.

mod normalize;
mod origin;

// Re-export main functions
pub use normalize::{normalize, CanonicalUrl, Normalized};
pub use origin::{default_destination, extract_host};

use url::Url;

/// How a canonical URL relates to the site being mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Same scheme, host and port as the seed - mirrored locally
    SameOrigin,
    /// Anything else - kept as an absolute link, never fetched
    External,
}

impl Classification {
    /// Returns true if the URL should be fetched and rewritten
    pub fn is_mirrored(&self) -> bool {
        matches!(self, Self::SameOrigin)
    }
}

/// Classifies a URL against the seed URL's origin
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::{classify, CanonicalUrl, Classification};
///
/// let seed = CanonicalUrl::parse("https://example.com/").unwrap();
/// let page = CanonicalUrl::parse("https://EXAMPLE.com/about").unwrap();
/// let cdn = CanonicalUrl::parse("https://cdn.example.com/app.js").unwrap();
///
/// assert_eq!(classify(&page, seed.as_url()), Classification::SameOrigin);
/// assert_eq!(classify(&cdn, seed.as_url()), Classification::External);
/// ```
pub fn classify(url: &CanonicalUrl, seed: &Url) -> Classification {
    if url.as_url().origin() == seed.origin() {
        Classification::SameOrigin
    } else {
        Classification::External
    }
}
