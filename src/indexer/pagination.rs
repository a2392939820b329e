//! Pagination controller primitives
//!
//! Termination is expressed as values: after every page the controller returns
//! a [`PageOutcome`] telling the pipeline whether to pull the next page, stop
//! this sequence, or abort the whole search.

use super::classify::Classification;

/// What the pipeline should do after a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Page was full, fetch the next one
    Continue,
    /// Sequence is finished (short page, page cap, or a local failure)
    Stop,
    /// Indexer-fatal failure, abandon remaining pages and tiers
    Abort,
}

/// Tracks the nominal page size of a sequence and judges page fullness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFullness {
    nominal: Option<usize>,
}

impl PageFullness {
    /// `page_size <= 1` means "unknown": the first page's count becomes the nominal size
    pub fn new(page_size: u32) -> Self {
        Self {
            nominal: (page_size > 1).then_some(page_size as usize),
        }
    }

    pub fn nominal(&self) -> Option<usize> {
        self.nominal
    }

    /// Record a page's raw record count and report whether the page was full
    pub fn observe(&mut self, count: usize) -> bool {
        if count == 0 {
            return false;
        }
        let nominal = *self.nominal.get_or_insert(count);
        count >= nominal
    }
}

/// Drives the stop decision for one paged sequence
#[derive(Debug, Clone)]
pub struct PaginationController {
    fullness: PageFullness,
    pages_seen: u32,
    max_pages: u32,
}

impl PaginationController {
    pub fn new(page_size: u32, max_pages: u32) -> Self {
        Self {
            fullness: PageFullness::new(page_size),
            pages_seen: 0,
            max_pages: max_pages.max(1),
        }
    }

    pub fn pages_seen(&self) -> u32 {
        self.pages_seen
    }

    /// Outcome after a page parsed into `raw_count` records
    pub fn after_page(&mut self, raw_count: usize) -> PageOutcome {
        self.pages_seen += 1;
        let full = self.fullness.observe(raw_count);
        if full && self.pages_seen < self.max_pages {
            PageOutcome::Continue
        } else {
            PageOutcome::Stop
        }
    }

    /// Outcome after a failed page
    pub fn after_failure(&mut self, classification: &Classification) -> PageOutcome {
        self.pages_seen += 1;
        if classification.is_fatal() {
            PageOutcome::Abort
        } else {
            PageOutcome::Stop
        }
    }
}

/// Whether the pipeline may move on to the next tier
pub fn advance_to_next_tier(accepted_so_far: usize) -> bool {
    accepted_so_far == 0
}
