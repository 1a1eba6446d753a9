//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - The summary assembled during a run
//! - Printing the summary to the console
//! - Writing a markdown report

mod markdown;
mod printer;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary, OutputError, OutputResult};
pub use printer::{format_summary, print_summary};
pub use summary::{CrawlSummary, ErrorKind, Failure, FailureTarget, PageVisit};
