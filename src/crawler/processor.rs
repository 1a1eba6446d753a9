//! HTML processor: reference extraction and link rewriting
//!
//! A page is handled in three steps:
//! 1. Parse the body and collect every URL-bearing attribute and CSS `url()`
//! 2. Resolve each reference; assets are handed to the [`AssetPipeline`],
//!    same-origin pages are mapped and reported as discovered
//! 3. Parse again, replace the resolved references with relative local
//!    paths and serialize
//!
//! The parsed document never lives across an `.await`, so processing can run
//! on any tokio task.

use crate::crawler::{AssetPipeline, AssetTicket, Shutdown};
use crate::mirror::{relative_href, SharedMapper};
use crate::url::{classify, normalize, CanonicalUrl, Normalized};
use scraper::node::Element;
use scraper::{Html, Node};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::Duration;
use url::Url;

/// How a URL-bearing attribute decides what it points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Always an HTML page (`iframe[src]`)
    Page,
    /// Always a downloadable resource (`img[src]`, CSS `url()`, ...)
    Asset,
    /// Decided by the URL's extension (`a[href]`, `area[href]`, plain `link[href]`)
    ByShape,
}

/// One entry of the attribute table
#[derive(Debug, Clone, Copy)]
pub struct UrlAttribute {
    pub tag: &'static str,
    pub attr: &'static str,
    pub kind: RefKind,
}

/// Tags and attributes that carry URLs
pub const URL_ATTRIBUTES: &[UrlAttribute] = &[
    UrlAttribute { tag: "a", attr: "href", kind: RefKind::ByShape },
    UrlAttribute { tag: "area", attr: "href", kind: RefKind::ByShape },
    UrlAttribute { tag: "link", attr: "href", kind: RefKind::ByShape },
    UrlAttribute { tag: "img", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "script", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "source", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "audio", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "video", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "video", attr: "poster", kind: RefKind::Asset },
    UrlAttribute { tag: "embed", attr: "src", kind: RefKind::Asset },
    UrlAttribute { tag: "iframe", attr: "src", kind: RefKind::Page },
];

/// `<link rel>` values whose target is always downloaded as an asset
const ASSET_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "shortcut",
    "apple-touch-icon",
    "mask-icon",
    "preload",
    "modulepreload",
    "manifest",
];

/// Extensions that still denote an HTML page
const PAGE_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "shtml", "php", "asp", "aspx", "jsp", "cgi",
];

/// Looks up the table entry for a tag and attribute
///
/// `<link>` elements with an asset `rel` are always assets.
fn attribute_kind(tag: &str, attr: &str, link_is_asset: bool) -> Option<RefKind> {
    let entry = URL_ATTRIBUTES
        .iter()
        .find(|entry| entry.tag == tag && entry.attr == attr)?;
    if tag == "link" && link_is_asset {
        Some(RefKind::Asset)
    } else {
        Some(entry.kind)
    }
}

fn link_is_asset(element: &Element) -> bool {
    if element.name() != "link" {
        return false;
    }
    element
        .attr("rel")
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| ASSET_LINK_RELS.contains(&token.to_ascii_lowercase().as_str()))
        })
        .unwrap_or(false)
}

/// True if a same-origin URL found in a `ByShape` attribute is a page
fn looks_like_page(url: &CanonicalUrl) -> bool {
    match url.extension() {
        None => true,
        Some(ext) => PAGE_EXTENSIONS.contains(&ext.as_str()),
    }
}

/// True for the text content of a `<style>` element
fn is_style_text(node: &Node, parent: Option<&Node>) -> bool {
    node.is_text()
        && parent
            .and_then(Node::as_element)
            .map(|element| element.name() == "style")
            .unwrap_or(false)
}

/// A `url(...)` token found in CSS
#[derive(Debug, Clone, PartialEq, Eq)]
struct CssRef {
    /// Byte range of the URL text inside the stylesheet
    start: usize,
    end: usize,
    quoted: bool,
}

/// Result of scanning CSS for `url(...)`
#[derive(Debug, Default)]
struct CssScan {
    refs: Vec<CssRef>,
    /// Set when a `url(` has no closing quote or parenthesis
    unterminated: bool,
}

fn scan_css(css: &str) -> CssScan {
    let lower = css.to_ascii_lowercase();
    let mut scan = CssScan::default();
    let mut pos = 0;

    while let Some(found) = lower[pos..].find("url(") {
        let open = pos + found + 4;
        let rest = &css[open..];
        let start = open + (rest.len() - rest.trim_start().len());

        match css[start..].chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = start + 1;
                let Some(len) = css[inner..].find(quote) else {
                    scan.unterminated = true;
                    break;
                };
                let end = inner + len;
                let Some(close) = css[end + 1..].find(')') else {
                    scan.unterminated = true;
                    break;
                };
                scan.refs.push(CssRef {
                    start: inner,
                    end,
                    quoted: true,
                });
                pos = end + 1 + close + 1;
            }
            _ => {
                let Some(len) = css[start..].find(')') else {
                    scan.unterminated = true;
                    break;
                };
                let value = css[start..start + len].trim_end();
                scan.refs.push(CssRef {
                    start,
                    end: start + value.len(),
                    quoted: false,
                });
                pos = start + len + 1;
            }
        }
    }

    scan
}

/// Replaces `url(...)` values for which `replace` returns a new value
fn rewrite_css(css: &str, replace: impl Fn(&str) -> Option<String>) -> String {
    let scan = scan_css(css);
    let mut out = String::with_capacity(css.len());
    let mut copied = 0;

    for css_ref in scan.refs {
        let Some(new) = replace(&css[css_ref.start..css_ref.end]) else {
            continue;
        };
        out.push_str(&css[copied..css_ref.start]);
        let needs_quotes = !css_ref.quoted
            && new.contains(|c: char| matches!(c, '(' | ')' | '\'' | '"') || c.is_whitespace());
        if needs_quotes {
            out.push('"');
            out.push_str(&new);
            out.push('"');
        } else {
            out.push_str(&new);
        }
        copied = css_ref.end;
    }

    out.push_str(&css[copied..]);
    out
}

/// A reference as written in the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RawReference {
    kind: RefKind,
    value: String,
}

/// A reference that could not be resolved; the page keeps it as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRef {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Extraction {
    references: Vec<RawReference>,
    malformed: Vec<MalformedRef>,
}

impl Extraction {
    fn push_css(&mut self, css: &str) {
        let scan = scan_css(css);
        for css_ref in &scan.refs {
            self.references.push(RawReference {
                kind: RefKind::Asset,
                value: css[css_ref.start..css_ref.end].to_string(),
            });
        }
        if scan.unterminated {
            let snippet: String = css.trim().chars().take(60).collect();
            self.malformed.push(MalformedRef {
                raw: snippet,
                reason: "unterminated url() in CSS".to_string(),
            });
        }
    }
}

/// Collects every reference in document order
fn extract_references(body: &str) -> Extraction {
    let document = Html::parse_document(body);
    let mut extraction = Extraction::default();

    for node in document.tree.nodes() {
        match node.value() {
            Node::Element(element) => {
                let link_asset = link_is_asset(element);
                for (attr, value) in element.attrs() {
                    if attr == "style" {
                        extraction.push_css(value);
                    } else if let Some(kind) = attribute_kind(element.name(), attr, link_asset) {
                        extraction.references.push(RawReference {
                            kind,
                            value: value.to_string(),
                        });
                    }
                }
            }
            Node::Text(text) if is_style_text(node.value(), node.parent().map(|p| p.value())) => {
                extraction.push_css(text)
            }
            _ => {}
        }
    }

    extraction
}

/// Replacement text keyed by how and where a reference was written
type RewritePlan = HashMap<RawReference, String>;

fn plan_lookup<'a>(plan: &'a RewritePlan, kind: RefKind, value: &str) -> Option<&'a String> {
    plan.get(&RawReference {
        kind,
        value: value.to_string(),
    })
}

fn rewrite_element(element: &mut Element, plan: &RewritePlan) {
    let tag = element.name().to_string();
    let link_asset = link_is_asset(element);

    for (name, value) in element.attrs.iter_mut() {
        let attr: &str = &name.local;
        if attr == "style" {
            let css = rewrite_css(value, |v| plan_lookup(plan, RefKind::Asset, v).cloned());
            *value = css.as_str().into();
        } else if let Some(kind) = attribute_kind(&tag, attr, link_asset) {
            if let Some(new) = plan_lookup(plan, kind, value) {
                *value = new.as_str().into();
            }
        }
    }
}

/// Applies the plan to a fresh parse of `body`
fn rewrite_document(body: &str, plan: &RewritePlan) -> String {
    let mut document = Html::parse_document(body);
    let targets: Vec<_> = document
        .tree
        .nodes()
        .map(|node| {
            let in_style = is_style_text(node.value(), node.parent().map(|p| p.value()));
            (node.id(), in_style)
        })
        .collect();

    for (id, in_style) in targets {
        let Some(mut node) = document.tree.get_mut(id) else {
            continue;
        };
        match node.value() {
            Node::Element(element) => rewrite_element(element, plan),
            Node::Text(text) if in_style => {
                let css = rewrite_css(&text.text, |v| {
                    plan_lookup(plan, RefKind::Asset, v).cloned()
                });
                text.text = css.as_str().into();
            }
            _ => {}
        }
    }

    document.html()
}

/// Where the page being processed came from and where it goes
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Canonical URL the page was requested as
    pub url: &'a CanonicalUrl,
    /// URL references are resolved against (after redirects)
    pub base: &'a Url,
    /// Any URL of the site being mirrored; references with the same
    /// origin are mirrored, all others are external
    pub origin: &'a Url,
    /// Where the page will be written, relative to the mirror root
    pub local_path: &'a Path,
}

/// Output of processing one page
#[derive(Debug, Clone, Default)]
pub struct ProcessedPage {
    /// Rewritten document
    pub html: String,
    /// Same-origin pages linked from this one, in document order
    pub discovered: Vec<CanonicalUrl>,
    /// Same-origin assets referenced by this page, in document order
    pub assets: Vec<CanonicalUrl>,
    /// References left as written because they could not be resolved
    pub malformed: Vec<MalformedRef>,
}

/// What to do with one reference
enum Resolution {
    Untouched,
    Absolute(String),
    Page {
        url: CanonicalUrl,
        fragment: String,
    },
    Asset {
        url: CanonicalUrl,
        fragment: String,
    },
}

/// Rewrites pages so they work from the local mirror
#[derive(Debug, Clone)]
pub struct HtmlProcessor {
    mapper: SharedMapper,
    shutdown: Shutdown,
    grace: Duration,
}

impl HtmlProcessor {
    pub fn new(mapper: SharedMapper, shutdown: Shutdown, grace: Duration) -> Self {
        Self {
            mapper,
            shutdown,
            grace,
        }
    }

    /// Processes one page body
    ///
    /// Every same-origin asset is requested from `assets` and awaited before
    /// the page is rewritten, so the result does not depend on the order in
    /// which downloads finish. After an interrupt, downloads get at most the
    /// grace period; unfinished ones are linked at their would-be path.
    ///
    /// # Reference Rules
    ///
    /// | Reference | Action |
    /// |-----------|--------|
    /// | Empty or `#fragment` | Untouched |
    /// | `mailto:`, `tel:`, `javascript:`, `data:`, ... | Untouched |
    /// | Malformed | Untouched, reported in `malformed` |
    /// | External, absolute | Untouched |
    /// | External, relative or protocol-relative | Written as absolute URL |
    /// | Same-origin page | Relative path to its mapped file, queued |
    /// | Same-origin asset | Relative path to its downloaded file |
    pub async fn process(
        &self,
        body: &str,
        page: &PageContext<'_>,
        assets: &AssetPipeline,
    ) -> ProcessedPage {
        let extraction = extract_references(body);
        let mut processed = ProcessedPage {
            malformed: extraction.malformed,
            ..ProcessedPage::default()
        };

        let mut plan = RewritePlan::new();
        let mut seen = HashSet::new();
        let mut discovered = HashSet::new();
        let mut requested = HashSet::new();
        let mut pending: Vec<(RawReference, AssetTicket, String)> = Vec::new();

        for reference in extraction.references {
            if !seen.insert(reference.clone()) {
                continue;
            }

            let resolution = match self.resolve(&reference, page) {
                Ok(resolution) => resolution,
                Err(reason) => {
                    tracing::warn!(
                        "Leaving malformed reference {:?} on {}: {}",
                        reference.value,
                        page.url,
                        reason
                    );
                    processed.malformed.push(MalformedRef {
                        raw: reference.value.clone(),
                        reason,
                    });
                    continue;
                }
            };

            match resolution {
                Resolution::Untouched => {}
                Resolution::Absolute(absolute) => {
                    plan.insert(reference, absolute);
                }
                Resolution::Page { url, fragment } => {
                    let target = self
                        .mapper
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .map_page(&url);
                    let href = relative_href(page.local_path, &target);
                    plan.insert(reference, format!("{}{}", href, fragment));
                    if url != *page.url && discovered.insert(url.clone()) {
                        processed.discovered.push(url);
                    }
                }
                Resolution::Asset { url, fragment } => {
                    let ticket = assets.request(&url);
                    if requested.insert(url.clone()) {
                        processed.assets.push(url);
                    }
                    pending.push((reference, ticket, fragment));
                }
            }
        }

        self.await_assets(page, pending, &mut plan).await;

        processed.html = rewrite_document(body, &plan);
        processed
    }

    async fn await_assets(
        &self,
        page: &PageContext<'_>,
        pending: Vec<(RawReference, AssetTicket, String)>,
        plan: &mut RewritePlan,
    ) {
        let deadline = async {
            self.shutdown.triggered().await;
            tokio::time::sleep(self.grace).await;
        };
        tokio::pin!(deadline);
        let mut expired = false;

        for (reference, ticket, fragment) in pending {
            let outcome = if expired {
                ticket.peek()
            } else {
                tokio::select! {
                    outcome = ticket.clone().wait() => outcome,
                    _ = &mut deadline => {
                        expired = true;
                        ticket.peek()
                    }
                }
            };

            let local_path: PathBuf = match outcome {
                Some(outcome) => outcome.local_path,
                None => self
                    .mapper
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .map_asset(ticket.url(), None),
            };

            let href = relative_href(page.local_path, &local_path);
            plan.insert(reference, format!("{}{}", href, fragment));
        }
    }

    fn resolve(&self, reference: &RawReference, page: &PageContext<'_>) -> Result<Resolution, String> {
        let raw = reference.value.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return Ok(Resolution::Untouched);
        }

        let url = match normalize(raw, page.base).map_err(|e| e.to_string())? {
            Normalized::Rejected(scheme) => {
                tracing::debug!("Skipping {} reference {:?}", scheme, raw);
                return Ok(Resolution::Untouched);
            }
            Normalized::Canonical(url) => url,
        };

        let joined = page
            .base
            .join(&raw.replace('\\', "/"))
            .map_err(|e| e.to_string())?;
        let fragment = joined
            .fragment()
            .map(|f| format!("#{}", f))
            .unwrap_or_default();

        if !classify(&url, page.origin).is_mirrored() {
            if Url::parse(raw).is_ok() {
                return Ok(Resolution::Untouched);
            }
            return Ok(Resolution::Absolute(joined.to_string()));
        }

        let is_page = match reference.kind {
            RefKind::Page => true,
            RefKind::Asset => false,
            RefKind::ByShape => looks_like_page(&url),
        };

        Ok(if is_page {
            Resolution::Page { url, fragment }
        } else {
            Resolution::Asset { url, fragment }
        })
    }
}
