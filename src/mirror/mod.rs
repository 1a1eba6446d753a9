//! Local layout of the mirror
//!
//! # Components
//!
//! - `PathMapper`: Decides where each canonical URL lives under the mirror root
//! - `relative_href`: Turns two local paths into a relocatable link
//! - `segment`: File name sanitisation, shortening and extension helpers

mod mapper;
mod relative;
mod segment;

pub use mapper::{LocalKind, PathMapper, SharedMapper, PATH_LIMIT, SEGMENT_LIMIT};
pub use relative::relative_href;
