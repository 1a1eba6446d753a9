//! Breadth-first frontier of pages awaiting fetch
//!
//! This module handles:
//! - FIFO ordering so pages are visited in discovery order
//! - The visited set that keeps every canonical URL to one fetch
//! - Reserving page slots at push time so the page cap is never overshot

use crate::url::CanonicalUrl;
use std::collections::{HashSet, VecDeque};

/// Frontier owned by the controlling loop
///
/// A URL enters `visited` when it is accepted by [`Frontier::push`], which is
/// before it is dequeued, and it is never accepted again. Accepting a URL
/// reserves one of the `max_pages` slots, so
/// `dispatched + queued <= max_pages` holds at all times.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<CanonicalUrl>,
    visited: HashSet<CanonicalUrl>,

    /// Pages handed out by `pop`
    dispatched: usize,

    max_pages: usize,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            dispatched: 0,
            max_pages,
        }
    }

    /// Queues a URL unless it was seen before or the cap is reserved
    ///
    /// Returns true if the URL was queued.
    pub fn push(&mut self, url: CanonicalUrl) -> bool {
        if self.visited.contains(&url) {
            return false;
        }
        if self.dispatched + self.queue.len() >= self.max_pages {
            tracing::trace!("Page cap reached, not queueing {}", url);
            return false;
        }

        self.visited.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Records a URL that was fetched under another name, such as the target
    /// of a redirect, so it is never queued itself
    ///
    /// Returns false if it was already visited.
    pub fn mark_visited(&mut self, url: CanonicalUrl) -> bool {
        self.visited.insert(url)
    }

    /// Takes the oldest queued URL, counting it as fetched
    pub fn pop(&mut self) -> Option<CanonicalUrl> {
        if self.dispatched >= self.max_pages {
            return None;
        }
        let url = self.queue.pop_front()?;
        self.dispatched += 1;
        Some(url)
    }

    /// True when nothing is queued or the cap has been dispatched
    pub fn is_done(&self) -> bool {
        self.queue.is_empty() || self.dispatched >= self.max_pages
    }

    /// Number of pages handed out so far
    pub fn pages_fetched(&self) -> usize {
        self.dispatched
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_visited(&self, url: &CanonicalUrl) -> bool {
        self.visited.contains(url)
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> CanonicalUrl {
        CanonicalUrl::parse(&format!("https://example.com{}", path)).unwrap()
    }

    #[test]
    fn test_new_frontier() {
        let frontier = Frontier::new(10);
        assert!(frontier.is_done());
        assert_eq!(frontier.pages_fetched(), 0);
        assert_eq!(frontier.queued(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::new(10);
        frontier.push(url("/a"));
        frontier.push(url("/b"));
        frontier.push(url("/c"));

        assert_eq!(frontier.pop(), Some(url("/a")));
        frontier.push(url("/d"));
        assert_eq!(frontier.pop(), Some(url("/b")));
        assert_eq!(frontier.pop(), Some(url("/c")));
        assert_eq!(frontier.pop(), Some(url("/d")));
        assert_eq!(frontier.pop(), None);
    }

    #[test]
    fn test_push_deduplicates() {
        let mut frontier = Frontier::new(10);
        assert!(frontier.push(url("/about/")));
        assert!(!frontier.push(url("/about")));
        assert!(!frontier.push(url("/about#team")));
        assert_eq!(frontier.queued(), 1);
    }

    #[test]
    fn test_visited_after_pop_is_not_requeued() {
        let mut frontier = Frontier::new(10);
        frontier.push(url("/"));
        frontier.pop();

        assert!(frontier.is_visited(&url("/")));
        assert!(!frontier.push(url("/")));
        assert!(frontier.is_done());
    }

    #[test]
    fn test_marked_url_is_not_queued() {
        let mut frontier = Frontier::new(10);
        assert!(frontier.mark_visited(url("/new")));
        assert!(!frontier.mark_visited(url("/new/")));

        assert!(!frontier.push(url("/new")));
        assert_eq!(frontier.queued(), 0);
        assert!(frontier.is_visited(&url("/new")));
    }

    #[test]
    fn test_push_reserves_cap() {
        let mut frontier = Frontier::new(2);
        assert!(frontier.push(url("/")));
        frontier.pop();

        assert!(frontier.push(url("/a")));
        assert!(!frontier.push(url("/b")));
        assert!(!frontier.is_visited(&url("/b")));
    }

    #[test]
    fn test_pages_fetched_never_exceeds_cap() {
        let mut frontier = Frontier::new(3);
        frontier.push(url("/"));

        let mut next = 0;
        while let Some(_page) = frontier.pop() {
            for _ in 0..5 {
                next += 1;
                frontier.push(url(&format!("/p{}", next)));
            }
            assert!(frontier.pages_fetched() <= frontier.max_pages());
        }

        assert_eq!(frontier.pages_fetched(), 3);
        assert!(frontier.is_done());
    }

    #[test]
    fn test_done_at_cap() {
        let mut frontier = Frontier::new(1);
        frontier.push(url("/"));
        assert!(!frontier.is_done());

        frontier.pop();
        assert!(frontier.is_done());
        assert!(!frontier.push(url("/next")));
    }
}
