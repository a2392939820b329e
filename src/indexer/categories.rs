//! Shared category taxonomy and tracker mappings
//!
//! Categories follow the Newznab numbering scheme: main categories are in
//! thousands (2000 = Movies, 5000 = TV) and subcategories add tens
//! (2030 = Movies/SD). Site adapters translate their own category tokens
//! into these ids through an [`IndexerCategories`] table.

use serde::{Deserialize, Serialize};

/// A mapping from a tracker-specific category token to a shared category id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// The tracker's own category token (path segment, numeric id, ...)
    pub tracker_id: String,
    /// The shared category id
    pub torznab_cat: i32,
    /// Description of the category
    pub description: Option<String>,
}

impl CategoryMapping {
    pub fn new(tracker_id: impl Into<String>, torznab_cat: i32, desc: impl Into<String>) -> Self {
        Self {
            tracker_id: tracker_id.into(),
            torznab_cat,
            description: Some(desc.into()),
        }
    }
}

/// Common category constants
pub mod cats {
    pub const CONSOLE: i32 = 1000;
    pub const MOVIES: i32 = 2000;
    pub const AUDIO: i32 = 3000;
    pub const PC: i32 = 4000;
    pub const TV: i32 = 5000;
    pub const XXX: i32 = 6000;
    pub const BOOKS: i32 = 7000;
    pub const OTHER: i32 = 8000;

    pub const MOVIES_FOREIGN: i32 = 2010;
    pub const MOVIES_SD: i32 = 2030;
    pub const MOVIES_HD: i32 = 2040;
    pub const MOVIES_UHD: i32 = 2045;
    pub const MOVIES_3D: i32 = 2060;
    pub const MOVIES_DVD: i32 = 2070;

    pub const TV_FOREIGN: i32 = 5020;
    pub const TV_SD: i32 = 5030;
    pub const TV_HD: i32 = 5040;

    pub const OTHER_MISC: i32 = 8010;
}

/// Parent (main) category of a category id. Main categories are their own parent.
pub fn parent_of(id: i32) -> i32 {
    id / 1000 * 1000
}

/// Whether any of `release_cats` satisfies `filter`.
///
/// An empty filter accepts everything. A category matches when it, or its
/// parent, is listed in the filter, so asking for `Movies` accepts
/// `Movies/SD`. Asking for a subcategory does not accept its siblings.
pub fn matches_filter(release_cats: &[i32], filter: &[i32]) -> bool {
    if filter.is_empty() {
        return true;
    }

    release_cats
        .iter()
        .any(|cat| filter.contains(cat) || filter.contains(&parent_of(*cat)))
}

/// Category table of one indexer: its tracker tokens and the shared ids they map to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerCategories {
    mappings: Vec<CategoryMapping>,
}

impl IndexerCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a category mapping
    pub fn add(&mut self, tracker_id: &str, torznab_cat: i32, desc: &str) {
        self.mappings
            .push(CategoryMapping::new(tracker_id, torznab_cat, desc));
    }

    pub fn mappings(&self) -> &[CategoryMapping] {
        &self.mappings
    }

    /// Map a tracker token to shared category ids (empty when unknown)
    pub fn map_tracker_to_torznab(&self, tracker_id: &str) -> Vec<i32> {
        let mut cats: Vec<i32> = self
            .mappings
            .iter()
            .filter(|c| c.tracker_id.eq_ignore_ascii_case(tracker_id))
            .map(|c| c.torznab_cat)
            .collect();
        cats.dedup();
        cats
    }
}
