//! Console rendering of the crawl summary

use crate::output::{CrawlSummary, FailureTarget};

/// Failures listed on the console before the rest are summarized
const MAX_PRINTED_FAILURES: usize = 20;

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    print!("{}", format_summary(summary));
}

/// Formats the summary the way [`print_summary`] prints it
pub fn format_summary(summary: &CrawlSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Mirror Summary ===\n\n");
    out.push_str(&format!("Seed: {}\n", summary.seed));
    out.push_str(&format!("Destination: {}\n", summary.destination.display()));
    if summary.interrupted {
        out.push_str("Status: interrupted (partial mirror)\n");
    }
    out.push('\n');

    out.push_str("Overview:\n");
    out.push_str(&format!(
        "  Pages fetched: {} ({} saved)\n",
        summary.pages_fetched,
        summary.pages_saved()
    ));
    out.push_str(&format!(
        "  Assets fetched: {} of {}\n",
        summary.assets_fetched,
        summary.assets.len()
    ));
    out.push_str(&format!("  Bytes downloaded: {}\n", summary.total_bytes()));
    out.push_str(&format!(
        "  Elapsed: {:.2}s\n",
        summary.elapsed.as_secs_f64()
    ));
    out.push('\n');

    let missing: Vec<_> = summary.missing_assets().collect();
    if !missing.is_empty() {
        out.push_str(&format!("Missing Assets ({}):\n", missing.len()));
        for asset in missing.iter().take(MAX_PRINTED_FAILURES) {
            out.push_str(&format!(
                "  - {}: {}\n",
                asset.url,
                asset.failure.as_deref().unwrap_or("unknown")
            ));
        }
        if missing.len() > MAX_PRINTED_FAILURES {
            out.push_str(&format!(
                "  ... and {} more\n",
                missing.len() - MAX_PRINTED_FAILURES
            ));
        }
        out.push('\n');
    }

    let page_failures: Vec<_> = summary.failures_for(FailureTarget::Page).collect();
    if !page_failures.is_empty() {
        out.push_str(&format!("Page Failures ({}):\n", page_failures.len()));
        for failure in page_failures.iter().take(MAX_PRINTED_FAILURES) {
            out.push_str(&format!(
                "  - {} [{}]: {}\n",
                failure.url, failure.kind, failure.reason
            ));
        }
        if page_failures.len() > MAX_PRINTED_FAILURES {
            out.push_str(&format!(
                "  ... and {} more\n",
                page_failures.len() - MAX_PRINTED_FAILURES
            ));
        }
        out.push('\n');
    }

    let success_rate = if summary.pages_fetched > 0 {
        (summary.pages_saved() as f64 / summary.pages_fetched as f64) * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "Success Rate: {:.1}% ({} / {} pages saved)\n",
        success_rate,
        summary.pages_saved(),
        summary.pages_fetched
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ErrorKind, PageVisit};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_format_summary() {
        let mut summary = CrawlSummary::new("https://example.com/", "example_com");
        summary.pages_fetched = 1;
        summary.record_page(PageVisit {
            url: "https://example.com/".to_string(),
            status: Some(200),
            latency: Duration::from_millis(3),
            bytes: 10,
            local_path: Some(PathBuf::from("index.html")),
        });

        let text = format_summary(&summary);
        assert!(text.contains("Pages fetched: 1 (1 saved)"));
        assert!(text.contains("Success Rate: 100.0% (1 / 1 pages saved)"));
        assert!(!text.contains("interrupted"));
    }

    #[test]
    fn test_format_summary_failures() {
        let mut summary = CrawlSummary::new("https://example.com/", "example_com");
        summary.interrupted = true;
        summary.record_failure(
            "https://example.com/x",
            FailureTarget::Page,
            ErrorKind::TransientNetwork,
            "request timed out",
        );

        let text = format_summary(&summary);
        assert!(text.contains("Status: interrupted"));
        assert!(text.contains("- https://example.com/x [transient-network]: request timed out"));
        assert!(text.contains("Success Rate: 0.0%"));
    }
}
