//! Crawler module for fetching and mirroring pages
//!
//! This module contains the core mirroring logic, including:
//! - HTTP fetching with retry and back-off
//! - The breadth-first frontier with its page cap
//! - The asset download worker pool
//! - Charset-aware decoding of fetched pages
//! - HTML reference extraction and link rewriting
//! - Overall crawl coordination and cancellation

mod assets;
mod charset;
mod coordinator;
mod fetcher;
mod frontier;
mod processor;
mod shutdown;

pub use assets::{AssetOutcome, AssetPipeline, AssetReport, AssetTicket};
pub use charset::DecodedPage;
pub use coordinator::{run_mirror, Coordinator};
pub use fetcher::{
    build_http_client, FetchCause, FetchClient, FetchError, FetchResponse, RetryPolicy,
};
pub use frontier::Frontier;
pub use processor::{
    HtmlProcessor, MalformedRef, PageContext, ProcessedPage, RefKind, UrlAttribute,
    URL_ATTRIBUTES,
};
pub use shutdown::Shutdown;
