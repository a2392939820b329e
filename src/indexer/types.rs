//! Core types for the indexer pipeline
//!
//! These types are modeled after Torznab: a normalized
//! [`SearchQuery`] goes in, typed [`ReleaseInfo`] records come out, wrapped in a
//! [`QueryResult`] together with the per-request diagnostic trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::categories::IndexerCategories;

/// Type of search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// General text search
    #[default]
    Basic,
    /// TV show search (supports season/episode)
    Tv,
    /// Movie search
    Movie,
    /// Music search
    Music,
    /// Book search
    Book,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Basic => write!(f, "search"),
            SearchMode::Tv => write!(f, "tvsearch"),
            SearchMode::Movie => write!(f, "movie"),
            SearchMode::Music => write!(f, "music"),
            SearchMode::Book => write!(f, "book"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" | "basic" | "q" => Ok(SearchMode::Basic),
            "tvsearch" | "tv-search" | "tv" => Ok(SearchMode::Tv),
            "movie" | "movie-search" | "moviesearch" => Ok(SearchMode::Movie),
            "music" | "music-search" | "musicsearch" | "audio" => Ok(SearchMode::Music),
            "book" | "book-search" | "booksearch" => Ok(SearchMode::Book),
            _ => Err(anyhow::anyhow!("Unknown search mode: {}", s)),
        }
    }
}

/// TV search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvSearchParam {
    Q,
    Season,
    Ep,
    ImdbId,
    TvdbId,
}

/// Movie search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieSearchParam {
    Q,
    ImdbId,
    TmdbId,
}

/// Music search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicSearchParam {
    Q,
    Album,
    Artist,
}

/// Book search parameters supported by an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSearchParam {
    Q,
    Title,
    Author,
}

/// Capability descriptor of an indexer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerCapabilities {
    /// Whether basic search is available
    pub search_available: bool,
    /// TV search parameters supported
    pub tv_search_params: Vec<TvSearchParam>,
    /// Movie search parameters supported
    pub movie_search_params: Vec<MovieSearchParam>,
    /// Music search parameters supported
    pub music_search_params: Vec<MusicSearchParam>,
    /// Book search parameters supported
    pub book_search_params: Vec<BookSearchParam>,
    /// Tracker category -> shared category table
    pub categories: IndexerCategories,
}

impl IndexerCapabilities {
    pub fn tv_search_available(&self) -> bool {
        !self.tv_search_params.is_empty()
    }

    pub fn movie_search_available(&self) -> bool {
        !self.movie_search_params.is_empty()
    }

    pub fn music_search_available(&self) -> bool {
        !self.music_search_params.is_empty()
    }

    pub fn book_search_available(&self) -> bool {
        !self.book_search_params.is_empty()
    }

    /// Whether the indexer can serve a search in the given mode
    pub fn supports(&self, mode: SearchMode) -> bool {
        match mode {
            SearchMode::Basic => self.search_available,
            SearchMode::Tv => self.tv_search_available(),
            SearchMode::Movie => self.movie_search_available(),
            SearchMode::Music => self.music_search_available(),
            SearchMode::Book => self.book_search_available(),
        }
    }
}

/// A normalized search query. Immutable for the duration of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The type of search
    pub mode: SearchMode,

    /// Free-text search term
    pub search_term: Option<String>,

    /// Shared category ids to restrict results to (empty = all)
    pub categories: Vec<i32>,

    /// Season number
    pub season: Option<i32>,

    /// Episode number/identifier
    pub episode: Option<String>,

    /// Whether a human is driving the search and will confirm releases
    pub interactive: bool,
}

impl SearchQuery {
    /// Create a basic search query
    pub fn search(term: &str) -> Self {
        Self::with_mode(SearchMode::Basic, term)
    }

    /// Create a TV search query
    pub fn tv_search(term: &str) -> Self {
        Self::with_mode(SearchMode::Tv, term)
    }

    /// Create a movie search query
    pub fn movie_search(term: &str) -> Self {
        Self::with_mode(SearchMode::Movie, term)
    }

    pub fn with_mode(mode: SearchMode, term: &str) -> Self {
        Self {
            mode,
            search_term: Some(term.to_string()),
            ..Default::default()
        }
    }

    /// Add season/episode to a TV search
    pub fn with_season_episode(mut self, season: i32, episode: Option<&str>) -> Self {
        self.season = Some(season);
        self.episode = episode.map(|s| s.to_string());
        self
    }

    /// Add categories to the query
    pub fn with_categories(mut self, cats: Vec<i32>) -> Self {
        self.categories = cats;
        self
    }

    /// Mark the query as interactive
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// The free text, or an empty string
    pub fn term(&self) -> &str {
        self.search_term.as_deref().unwrap_or("")
    }

    /// Get the episode search string (e.g., "S01E05" or "S01")
    pub fn get_episode_string(&self) -> Option<String> {
        self.season.map(|s| match self.episode.as_deref() {
            Some(ep) => match ep.parse::<u32>() {
                Ok(n) => format!("S{:02}E{:02}", s, n),
                Err(_) => format!("S{:02}E{}", s, ep),
            },
            None => format!("S{:02}", s),
        })
    }

    /// Free text followed by the episode string, as TV searches send it
    pub fn tv_search_string(&self) -> String {
        match self.get_episode_string() {
            Some(ep) if !self.term().is_empty() => format!("{} {}", self.term(), ep),
            Some(ep) => ep,
            None => self.term().to_string(),
        }
    }
}

/// A release record produced by a site parser
///
/// A record with no download reference is *partial*: it only carries an info
/// URL pointing at a detail page that a secondary fetch has to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Release title
    pub title: String,

    /// Unique identifier (usually the details or download URL)
    pub guid: String,

    /// Details page URL
    pub info_url: Option<String>,

    /// Download link; `None` or empty while the record is partial
    pub download_url: Option<String>,

    /// Publication date
    pub publish_date: DateTime<Utc>,

    /// Shared category ids
    pub categories: Vec<i32>,

    /// File size in bytes
    pub size: Option<u64>,

    /// Number of files in the torrent
    pub files: Option<u32>,

    /// Number of seeders
    pub seeders: Option<u32>,
    /// Number of peers (seeders + leechers)
    pub peers: Option<u32>,

    /// Download volume factor (0 = freeleech, 1 = normal)
    pub download_volume_factor: f64,
    /// Upload volume factor (usually 1, can be 2 for double upload)
    pub upload_volume_factor: f64,

    /// The indexer that found this release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_name: Option<String>,
}

impl ReleaseInfo {
    /// Create a new release with minimal info
    pub fn new(title: String, guid: String, publish_date: DateTime<Utc>) -> Self {
        Self {
            title,
            guid,
            publish_date,
            info_url: None,
            download_url: None,
            categories: vec![],
            size: None,
            files: None,
            seeders: None,
            peers: None,
            download_volume_factor: 1.0,
            upload_volume_factor: 1.0,
            indexer_id: None,
            indexer_name: None,
        }
    }

    /// Whether the record still lacks a download reference
    pub fn is_partial(&self) -> bool {
        self.download_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    }

    /// Key used to deduplicate releases: the guid, or the download URL when no guid was given
    pub fn dedup_key(&self) -> Option<&str> {
        if !self.guid.trim().is_empty() {
            return Some(self.guid.as_str());
        }
        self.download_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

impl Default for ReleaseInfo {
    fn default() -> Self {
        Self::new(String::new(), String::new(), Utc::now())
    }
}

/// What happened to one request issued by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Page fetched and parsed
    Parsed { records: usize },
    /// Fetch or parse failed
    Failed {
        kind: String,
        message: String,
        /// The site answered with an anti-bot challenge; an external solver is needed
        #[serde(default)]
        requires_solver: bool,
    },
}

/// Diagnostic entry for one request (listing page or detail page)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDiagnostic {
    pub url: String,
    /// HTTP status when one was received
    pub status: Option<u16>,
    /// Whether this was a secondary (detail page) fetch
    pub secondary: bool,
    #[serde(flatten)]
    pub outcome: RequestOutcome,
    pub elapsed_ms: u64,
}

impl RequestDiagnostic {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RequestOutcome::Failed { .. })
    }
}

/// Why a search was not attempted at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Indexer is backing off until the given time
    Backoff { until: DateTime<Utc> },
    /// Indexer was disabled administratively
    Disabled,
    /// Indexer has no requests for this search mode
    Unsupported,
}

/// Result of one search against one indexer, owned by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Accepted, deduplicated releases in first-seen order
    pub records: Vec<ReleaseInfo>,
    /// Per-request trail, in issue order
    pub diagnostics: Vec<RequestDiagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    /// The health tracker crossed its disable threshold during this search
    #[serde(default)]
    pub should_disable: bool,
}

impl QueryResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RequestDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_failure())
    }
}
