//! Request chains produced by site request generators
//!
//! A [`RequestChain`] is an ordered list of tiers. Each tier holds one or more
//! [`PagedRequests`] sequences, and each sequence lazily yields the request for
//! page 1, 2, 3, ... until its consumer stops pulling.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Content type a request expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HttpAccept {
    #[default]
    Html,
    Json,
    Xml,
    Any,
}

impl HttpAccept {
    /// Value for the `Accept` header
    pub fn header_value(&self) -> &'static str {
        match self {
            HttpAccept::Html => "text/html,application/xhtml+xml",
            HttpAccept::Json => "application/json",
            HttpAccept::Xml => "application/rss+xml,application/xml,text/xml",
            HttpAccept::Any => "*/*",
        }
    }
}

/// A single page request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerRequest {
    pub url: String,
    pub accept: HttpAccept,
    /// 1-based page index within its sequence
    pub page: u32,
}

impl IndexerRequest {
    pub fn new(url: impl Into<String>, accept: HttpAccept) -> Self {
        Self {
            url: url.into(),
            accept,
            page: 1,
        }
    }
}

type PageUrlFn = Arc<dyn Fn(u32) -> Option<String> + Send + Sync>;

/// Restartable lazy sequence of page requests
///
/// The sequence itself never decides when pagination ends; the builder may
/// return `None` to mark a hard end, otherwise it yields forever and the
/// pagination controller stops pulling once a page is not full.
#[derive(Clone)]
pub struct PagedRequests {
    page_url: PageUrlFn,
    accept: HttpAccept,
    next_page: u32,
}

impl PagedRequests {
    /// Sequence whose URL for page `n` is produced by `page_url(n)`
    pub fn new<F>(accept: HttpAccept, page_url: F) -> Self
    where
        F: Fn(u32) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            page_url: Arc::new(page_url),
            accept,
            next_page: 1,
        }
    }

    /// Sequence holding exactly one request
    pub fn single(url: impl Into<String>, accept: HttpAccept) -> Self {
        let url = url.into();
        Self::new(accept, move |page| (page == 1).then(|| url.clone()))
    }

    /// Rewind to page 1
    pub fn restart(&mut self) {
        self.next_page = 1;
    }

    /// Page index the next call to `next` will produce
    pub fn next_page(&self) -> u32 {
        self.next_page
    }
}

impl Iterator for PagedRequests {
    type Item = IndexerRequest;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next_page;
        let url = (self.page_url)(page)?;
        self.next_page = page.saturating_add(1);
        Some(IndexerRequest {
            url,
            accept: self.accept,
            page,
        })
    }
}

impl fmt::Debug for PagedRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedRequests")
            .field("accept", &self.accept)
            .field("next_page", &self.next_page)
            .finish_non_exhaustive()
    }
}

/// One fallback level of a chain
pub type RequestTier = Vec<PagedRequests>;

/// Ordered tiers of paged request sequences
#[derive(Debug, Clone, Default)]
pub struct RequestChain {
    tiers: Vec<RequestTier>,
}

impl RequestChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sequence to the current (last) tier, opening the first tier if needed
    pub fn add(&mut self, requests: PagedRequests) -> &mut Self {
        match self.tiers.last_mut() {
            Some(tier) => tier.push(requests),
            None => self.tiers.push(vec![requests]),
        }
        self
    }

    /// Open a new fallback tier holding `requests`
    pub fn add_tier(&mut self, requests: PagedRequests) -> &mut Self {
        self.tiers.push(vec![requests]);
        self
    }

    pub fn tiers(&self) -> &[RequestTier] {
        &self.tiers
    }

    pub fn into_tiers(self) -> Vec<RequestTier> {
        self.tiers
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// True when the chain holds no sequences at all
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|t| t.is_empty())
    }
}
