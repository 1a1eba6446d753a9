//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `AssetStatus`: Tracks whether an asset download is pending, done or missing
//! - `AssetRecord`: The run-wide entry for one canonical asset URL

mod asset_state;

// Re-export main types
pub use asset_state::{AssetRecord, AssetStatus};
