//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a mirror run,
//! including totals, the page run log, missing assets and failures.

use crate::output::{CrawlSummary, FailureTarget};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Pages listed in the run log section before it is truncated
const MAX_LOGGED_PAGES: usize = 200;

/// Writes the markdown summary to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let write = || -> std::io::Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(output_path)?;
        file.write_all(markdown.as_bytes())
    };

    write().map_err(|source| OutputError::Write {
        path: output_path.display().to_string(),
        source,
    })
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Mirror Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", summary.seed));
    md.push_str(&format!(
        "- **Destination**: {}\n",
        summary.destination.display()
    ));
    md.push_str(&format!(
        "- **Started**: {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Elapsed**: {:.2} seconds\n",
        summary.elapsed.as_secs_f64()
    ));
    let status = if summary.interrupted {
        "interrupted"
    } else {
        "completed"
    };
    md.push_str(&format!("- **Status**: {}\n\n", status));

    // Totals
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Fetched**: {}\n", summary.pages_fetched));
    md.push_str(&format!("- **Pages Saved**: {}\n", summary.pages_saved()));
    md.push_str(&format!("- **Assets Fetched**: {}\n", summary.assets_fetched));
    md.push_str(&format!(
        "- **Missing Assets**: {}\n",
        summary.missing_assets().count()
    ));
    md.push_str(&format!("- **Bytes Downloaded**: {}\n", summary.total_bytes()));
    md.push_str(&format!("- **Failures**: {}\n\n", summary.failures.len()));

    // Run log
    if !summary.pages.is_empty() {
        md.push_str("## Pages\n\n");
        md.push_str("| Status | URL | Latency (ms) | Bytes | Local Path |\n");
        md.push_str("|--------|-----|--------------|-------|------------|\n");

        for page in summary.pages.iter().take(MAX_LOGGED_PAGES) {
            let status = page
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let local = page
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                status,
                page.url,
                page.latency.as_millis(),
                page.bytes,
                local
            ));
        }
        if summary.pages.len() > MAX_LOGGED_PAGES {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.pages.len() - MAX_LOGGED_PAGES
            ));
        }
        md.push('\n');
    }

    // Missing assets
    let missing: Vec<_> = summary.missing_assets().collect();
    if !missing.is_empty() {
        md.push_str("## Missing Assets\n\n");
        md.push_str("| URL | Expected Path | Reason |\n");
        md.push_str("|-----|---------------|--------|\n");

        for asset in missing {
            let expected = asset
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                asset.url,
                expected,
                asset.failure.as_deref().unwrap_or("unknown")
            ));
        }
        md.push('\n');
    }

    // Page failures
    let page_failures: Vec<_> = summary.failures_for(FailureTarget::Page).collect();
    if !page_failures.is_empty() {
        md.push_str("## Page Failures\n\n");
        md.push_str("| URL | Kind | Reason |\n");
        md.push_str("|-----|------|--------|\n");

        for failure in page_failures {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.url,
                failure.kind,
                failure.reason.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
