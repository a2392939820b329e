//! DivxTotal indexer implementation
//!
//! DivxTotal is a public Spanish tracker serving movies, series and software.
//!
//! Listing pages (`/page/N?s=term`, TV under `/series-6`) show 15 rows each.
//! Movie rows link straight to a page that serves the torrent, so they are
//! complete at listing time. Series rows only link to the show's detail page,
//! which lists one download per episode; those rows are left partial and the
//! pipeline resolves them through [`DivxTotalSeriesParser`].

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::indexer::categories::IndexerCategories;
use crate::indexer::request::{HttpAccept, PagedRequests, RequestChain};
use crate::indexer::sanitize::sanitize;
use crate::indexer::{
    IndexerCapabilities, IndexerDefinition, IndexerError, IndexerResponse, MovieSearchParam,
    ReleaseInfo, RequestGenerator, ResponseParser, SearchMode, SearchQuery, TvSearchParam,
    categories::cats,
};

pub const DEFAULT_BASE_URL: &str = "https://www5.divxtotal.mov/";

/// Rows per full listing page
pub const PAGE_SIZE: u32 = 15;

const TV_PATH: &str = "/series-6";
const DOWNLOAD_LINK: &str = "/download_tt.php";

/// Tracker category tokens (third path segment of a details URL)
pub mod tracker_cats {
    pub const PELICULAS: &str = "peliculas";
    pub const PELICULAS_HD: &str = "peliculas-hd";
    pub const PELICULAS_3D: &str = "peliculas-3-d";
    pub const PELICULAS_DVDR: &str = "peliculas-dvdr";
    pub const SERIES: &str = "series";
    pub const PROGRAMAS: &str = "programas";
    pub const OTROS: &str = "otros";
}

const GB: u64 = 1024 * 1024 * 1024;
const MB: u64 = 1024 * 1024;

/// Size assumed when a row carries none
fn default_size(tracker_cat: &str) -> u64 {
    match tracker_cat {
        tracker_cats::PELICULAS | tracker_cats::PELICULAS_HD | tracker_cats::PELICULAS_3D => 2 * GB,
        tracker_cats::PELICULAS_DVDR => 5 * GB,
        _ => 512 * MB,
    }
}

static ROWS: Lazy<Selector> = Lazy::new(|| selector("table.table > tbody > tr"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("td"));
static INFO_PANE: Lazy<Selector> = Lazy::new(|| selector(".panel-body > .row > .col-lg-7"));
static INFO_ITEM: Lazy<Selector> = Lazy::new(|| selector(".info-item"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static EPISODE_TABLES: Lazy<Selector> = Lazy::new(|| selector("table.rwd-table"));
static TABLE_ROWS: Lazy<Selector> = Lazy::new(|| selector("tbody > tr"));
static DOWNLOAD_ANCHOR: Lazy<Selector> =
    Lazy::new(|| selector(&format!("a[href*=\"{}\"]", DOWNLOAD_LINK)));

static EPISODE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9]+)x([0-9]+)[^0-9]*$").expect("valid episode regex"));
static SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([0-9]+(?:[.,][0-9]+)?)\s*([KMGT]I?B|B|BYTES)\b").expect("valid size regex")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Tracker category token of a DivxTotal URL (`https://host/<cat>/...`)
fn tracker_cat_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let first = url.path_segments()?.next()?;
    (!first.is_empty()).then(|| first.to_string())
}

/// Resolve a possibly relative link against the page it was found on
fn absolute_url(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Parse a `dd-mm-yyyy` date
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s.trim(), "%d-%m-%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parse size string (e.g., "1.5 GB" or "700,5 MB")
fn parse_size(s: &str) -> Option<u64> {
    let caps = SIZE.captures(s)?;
    let num: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let multiplier = match caps.get(2)?.as_str().to_uppercase().as_str() {
        "B" | "BYTES" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => MB as f64,
        "GB" | "GIB" => GB as f64,
        "TB" | "TIB" => (GB * 1024) as f64,
        _ => return None,
    };
    let bytes = (num * multiplier) as u64;
    (bytes > 0).then_some(bytes)
}

/// Rewrite a site episode title into scene form
///
/// `American Horror Story6x04` becomes `American Horror Story S06E04 SPANISH SDTV XviD`.
fn scene_title(episode_title: &str) -> String {
    let mut title = episode_title.trim().to_string();
    if let Some(caps) = EPISODE_SUFFIX.captures(&title) {
        let season: u32 = caps[1].parse().unwrap_or(0);
        let episode: u32 = caps[2].parse().unwrap_or(0);
        let start = caps.get(0).map_or(title.len(), |m| m.start());
        title = format!("{} S{:02}E{:02}", title[..start].trim_end(), season, episode);
    }
    title.push_str(" SPANISH SDTV XviD");
    title
}

/// Builds DivxTotal listing URLs
pub struct DivxTotalRequestGenerator {
    base_url: String,
}

impl DivxTotalRequestGenerator {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn paged_requests(&self, term: &str, sub: &str) -> PagedRequests {
        let base = format!("{}{}", self.base_url, sub);
        let query = format!("s={}", urlencoding::encode(&sanitize(term)));
        PagedRequests::new(HttpAccept::Html, move |page| {
            Some(format!("{}/page/{}?{}", base, page, query))
        })
    }
}

impl RequestGenerator for DivxTotalRequestGenerator {
    fn generate(&self, query: &SearchQuery) -> RequestChain {
        let mut chain = RequestChain::new();
        match query.mode {
            SearchMode::Basic | SearchMode::Movie => {
                chain.add(self.paged_requests(query.term(), ""));
            }
            SearchMode::Tv => {
                chain.add(self.paged_requests(&query.tv_search_string(), TV_PATH));
            }
            SearchMode::Music | SearchMode::Book => {}
        }
        chain
    }
}

/// Parses DivxTotal listing pages
pub struct DivxTotalParser {
    categories: IndexerCategories,
}

impl DivxTotalParser {
    pub fn new(categories: IndexerCategories) -> Self {
        Self { categories }
    }

    fn parse_row(&self, page_url: &str, row: ElementRef<'_>) -> Option<ReleaseInfo> {
        let anchor = row.select(&ANCHOR).next()?;
        let title = text_of(anchor);
        let href = anchor.value().attr("href")?.trim();
        if title.is_empty() || href.is_empty() {
            return None;
        }
        let details = absolute_url(page_url, href);
        let cat = tracker_cat_of(&details).unwrap_or_else(|| tracker_cats::OTROS.to_string());

        let cells: Vec<_> = row.select(&CELL).collect();
        let publish_date = cells
            .get(2)
            .and_then(|c| parse_date(&text_of(*c)))
            .unwrap_or_else(Utc::now);
        let size = cells
            .get(3)
            .and_then(|c| parse_size(&text_of(*c)))
            .unwrap_or_else(|| default_size(&cat));

        let mut release = ReleaseInfo::new(title, details.clone(), publish_date);
        release.info_url = Some(details.clone());
        // series rows only point at the show page
        release.download_url = (cat != tracker_cats::SERIES).then_some(details);
        release.categories = self.categories.map_tracker_to_torznab(&cat);
        release.size = Some(size);
        release.files = Some(1);
        release.seeders = Some(1);
        release.peers = Some(2);
        release.download_volume_factor = 0.0;
        release.upload_volume_factor = 1.0;
        Some(release)
    }
}

impl ResponseParser for DivxTotalParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>, IndexerError> {
        if response.status != 200 {
            return Err(IndexerError::UnexpectedStatus {
                status: response.status,
            });
        }

        let document = Html::parse_document(&response.content);
        let releases: Vec<_> = document
            .select(&ROWS)
            .filter_map(|row| self.parse_row(&response.request.url, row))
            .collect();

        debug!(url = %response.request.url, releases = releases.len(), "Parsed DivxTotal listing");
        Ok(releases)
    }
}

/// Parses a DivxTotal series detail page into one release per episode
pub struct DivxTotalSeriesParser {
    categories: IndexerCategories,
}

impl DivxTotalSeriesParser {
    pub fn new(categories: IndexerCategories) -> Self {
        Self { categories }
    }

    /// Second paragraph of the second info item in the info pane
    fn publish_date(document: &Html) -> Option<DateTime<Utc>> {
        let pane = document.select(&INFO_PANE).next()?;
        let item = pane.select(&INFO_ITEM).nth(1)?;
        let text = text_of(item.select(&PARAGRAPH).nth(1)?);
        parse_date(&text)
    }
}

impl ResponseParser for DivxTotalSeriesParser {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>, IndexerError> {
        if response.status != 200 {
            return Err(IndexerError::UnexpectedStatus {
                status: response.status,
            });
        }

        let document = Html::parse_document(&response.content);
        let details = response.request.url.clone();
        let has_info = document.select(&INFO_PANE).next().is_some();
        let tables: Vec<_> = document.select(&EPISODE_TABLES).collect();
        if !has_info && tables.is_empty() {
            return Err(IndexerError::Malformed(format!(
                "{} is not a series detail page",
                details
            )));
        }

        let cat = tracker_cat_of(&details).unwrap_or_else(|| tracker_cats::SERIES.to_string());
        let categories = self.categories.map_tracker_to_torznab(&cat);
        let publish_date = Self::publish_date(&document).unwrap_or_else(Utc::now);

        let mut releases = Vec::new();
        for row in tables.iter().flat_map(|t| t.select(&TABLE_ROWS)) {
            let Some(anchor) = row.select(&ANCHOR).next() else {
                continue;
            };
            let Some(link) = row
                .select(&DOWNLOAD_ANCHOR)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                debug!(url = %details, "Episode row without a download link");
                continue;
            };

            let link = absolute_url(&details, link);
            let mut release = ReleaseInfo::new(scene_title(&text_of(anchor)), link.clone(), publish_date);
            release.info_url = Some(details.clone());
            release.download_url = Some(link);
            release.categories = categories.clone();
            release.size = Some(default_size(tracker_cats::SERIES));
            release.files = Some(1);
            releases.push(release);
        }

        debug!(url = %details, releases = releases.len(), "Parsed DivxTotal series page");
        Ok(releases)
    }
}

/// DivxTotal indexer
pub struct DivxTotalIndexer {
    /// Unique instance ID
    id: String,
    /// Display name
    name: String,
    capabilities: IndexerCapabilities,
    generator: DivxTotalRequestGenerator,
    parser: DivxTotalParser,
    series_parser: DivxTotalSeriesParser,
}

impl DivxTotalIndexer {
    pub fn new(id: String, name: String, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let capabilities = Self::build_capabilities();
        Self {
            id,
            name,
            generator: DivxTotalRequestGenerator::new(&base_url),
            parser: DivxTotalParser::new(capabilities.categories.clone()),
            series_parser: DivxTotalSeriesParser::new(capabilities.categories.clone()),
            capabilities,
        }
    }

    /// Build the capabilities for DivxTotal
    fn build_capabilities() -> IndexerCapabilities {
        let mut categories = IndexerCategories::new();
        categories.add(tracker_cats::PELICULAS, cats::MOVIES_SD, "Películas");
        categories.add(tracker_cats::PELICULAS_HD, cats::MOVIES_HD, "Películas HD");
        categories.add(tracker_cats::PELICULAS_3D, cats::MOVIES_3D, "Películas 3D");
        categories.add(tracker_cats::PELICULAS_DVDR, cats::MOVIES_DVD, "Películas DVD-r");
        categories.add(tracker_cats::SERIES, cats::TV_SD, "Series");
        categories.add(tracker_cats::PROGRAMAS, cats::PC, "Programas");
        categories.add(tracker_cats::OTROS, cats::OTHER_MISC, "Otros");

        IndexerCapabilities {
            search_available: true,
            tv_search_params: vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep],
            movie_search_params: vec![MovieSearchParam::Q],
            categories,
            ..Default::default()
        }
    }
}

impl IndexerDefinition for DivxTotalIndexer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    fn capabilities(&self) -> &IndexerCapabilities {
        &self.capabilities
    }

    fn request_generator(&self) -> &dyn RequestGenerator {
        &self.generator
    }

    fn parser(&self) -> &dyn ResponseParser {
        &self.parser
    }

    fn detail_parser(&self) -> &dyn ResponseParser {
        &self.series_parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::request::IndexerRequest;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    const LISTING: &str = r#"
        <html><body>
        <table class="table"><tbody>
          <tr>
            <td><a href="https://www5.divxtotal.mov/peliculas-hd/marco-polo/">Marco Polo</a></td>
            <td>HD</td>
            <td>05-03-2021</td>
            <td>1.5 GB</td>
          </tr>
          <tr>
            <td><a href="https://www5.divxtotal.mov/series/marco-polo/">Marco Polo (Serie)</a></td>
            <td>Serie</td>
            <td>not a date</td>
            <td></td>
          </tr>
          <tr><td>no link here</td></tr>
        </tbody></table>
        </body></html>
    "#;

    const SERIES: &str = r#"
        <html><body>
        <div class="panel-body"><div class="row"><div class="col-lg-7">
          <div class="info-item"><p>Genero</p><p>Drama</p></div>
          <div class="info-item"><p>Fecha</p><p>12-12-2014</p></div>
        </div></div></div>
        <table class="rwd-table"><tbody>
          <tr>
            <td><a href="https://www5.divxtotal.mov/series/marco-polo/1x01/">Marco Polo1x01</a></td>
            <td><a href="https://www5.divxtotal.mov/download_tt.php?u=ep1">Descargar</a></td>
          </tr>
          <tr>
            <td><a href="https://www5.divxtotal.mov/series/marco-polo/1x02/">Marco Polo 1x02</a></td>
            <td><a href="https://www5.divxtotal.mov/download_tt.php?u=ep2">Descargar</a></td>
          </tr>
          <tr>
            <td><a href="https://www5.divxtotal.mov/series/marco-polo/1x03/">Marco Polo 1x03</a></td>
            <td>Proximamente</td>
          </tr>
        </tbody></table>
        </body></html>
    "#;

    fn response(url: &str, content: &str) -> IndexerResponse {
        IndexerResponse::new(IndexerRequest::new(url, HttpAccept::Html), 200, content)
    }

    fn indexer() -> DivxTotalIndexer {
        DivxTotalIndexer::new("divx".into(), "DivxTotal".into(), None)
    }

    #[test]
    fn test_scene_title() {
        assert_eq!(
            scene_title("American Horror Story6x04"),
            "American Horror Story S06E04 SPANISH SDTV XviD"
        );
        assert_eq!(scene_title("Dark 2x10 (HDTV)"), "Dark S02E10 SPANISH SDTV XviD");
        assert_eq!(scene_title("Especial"), "Especial SPANISH SDTV XviD");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1.5 GB"), Some(1_610_612_736));
        assert_eq!(parse_size("500 MB"), Some(524_288_000));
        assert_eq!(parse_size("700,5 MB"), Some(734_527_488));
        assert_eq!(parse_size("1 TB"), Some(1_099_511_627_776));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("0 MB"), None);
    }

    #[test]
    fn test_default_sizes() {
        assert_eq!(default_size(tracker_cats::PELICULAS), 2 * GB);
        assert_eq!(default_size(tracker_cats::PELICULAS_DVDR), 5 * GB);
        assert_eq!(default_size(tracker_cats::SERIES), 512 * MB);
        assert_eq!(default_size(tracker_cats::OTROS), 512 * MB);
    }

    #[test]
    fn test_request_urls() {
        let indexer = indexer();
        let generator = indexer.request_generator();

        let chain = generator.generate(&SearchQuery::movie_search("Marco Polo 2014"));
        assert_eq!(chain.tier_count(), 1);
        let urls: Vec<_> = chain.tiers()[0][0].clone().take(2).map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://www5.divxtotal.mov/page/1?s=Marco%20Polo",
                "https://www5.divxtotal.mov/page/2?s=Marco%20Polo",
            ]
        );

        let tv = SearchQuery::tv_search("Dark").with_season_episode(1, Some("2"));
        let chain = generator.generate(&tv);
        let first = chain.tiers()[0][0].clone().next().map(|r| r.url);
        assert_eq!(
            first.as_deref(),
            Some("https://www5.divxtotal.mov/series-6/page/1?s=Dark%20S01E02")
        );
    }

    #[test]
    fn test_unsupported_modes_yield_empty_chain() {
        let indexer = indexer();
        let music = SearchQuery::with_mode(SearchMode::Music, "x");
        assert!(indexer.request_generator().generate(&music).is_empty());
        assert!(!indexer.can_handle_query(&music));
        let book = SearchQuery::with_mode(SearchMode::Book, "x");
        assert!(indexer.request_generator().generate(&book).is_empty());
    }

    #[test]
    fn test_parse_listing() {
        let indexer = indexer();
        let releases = indexer
            .parser()
            .parse(&response("https://www5.divxtotal.mov/page/1?s=Marco%20Polo", LISTING))
            .unwrap();
        assert_eq!(releases.len(), 2);

        let movie = &releases[0];
        assert_eq!(movie.title, "Marco Polo");
        assert_eq!(movie.categories, vec![cats::MOVIES_HD]);
        assert_eq!(movie.size, Some(1_610_612_736));
        assert_eq!(movie.publish_date.format("%Y-%m-%d").to_string(), "2021-03-05");
        assert_eq!(
            movie.download_url.as_deref(),
            Some("https://www5.divxtotal.mov/peliculas-hd/marco-polo/")
        );
        assert_eq!(movie.download_volume_factor, 0.0);
        assert!(!movie.is_partial());

        let series = &releases[1];
        assert!(series.is_partial());
        assert_eq!(series.categories, vec![cats::TV_SD]);
        assert_eq!(series.size, Some(512 * MB));
        assert_eq!(
            series.info_url.as_deref(),
            Some("https://www5.divxtotal.mov/series/marco-polo/")
        );
    }

    #[test]
    fn test_relative_links_are_resolved() {
        let html = r#"<table class="table"><tbody><tr>
            <td><a href="/programas/some-app/">Some App</a></td><td></td><td></td><td>300 MB</td>
        </tr></tbody></table>"#;
        let releases = indexer()
            .parser()
            .parse(&response("https://www5.divxtotal.mov/page/1?s=app", html))
            .unwrap();
        assert_eq!(releases[0].guid, "https://www5.divxtotal.mov/programas/some-app/");
        assert_eq!(releases[0].categories, vec![cats::PC]);
        assert_eq!(tracker_cat_of("not a url"), None);
    }

    #[test]
    fn test_parse_listing_without_rows() {
        let releases = indexer()
            .parser()
            .parse(&response("https://www5.divxtotal.mov/page/1?s=x", "<html></html>"))
            .unwrap();
        assert!(releases.is_empty());
    }

    #[test]
    fn test_parse_series_page() {
        let indexer = indexer();
        let releases = indexer
            .detail_parser()
            .parse(&response("https://www5.divxtotal.mov/series/marco-polo/", SERIES))
            .unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].title, "Marco Polo S01E01 SPANISH SDTV XviD");
        assert_eq!(releases[1].title, "Marco Polo S01E02 SPANISH SDTV XviD");
        assert_eq!(releases[0].guid, "https://www5.divxtotal.mov/download_tt.php?u=ep1");
        assert_eq!(releases[0].download_url.as_deref(), Some(releases[0].guid.as_str()));
        assert_eq!(releases[0].categories, vec![cats::TV_SD]);
        assert_eq!(releases[0].publish_date.format("%d-%m-%Y").to_string(), "12-12-2014");
        assert_eq!(releases[0].size, Some(512 * MB));
    }

    #[test]
    fn test_parse_series_rejects_unrelated_page() {
        let result = indexer()
            .detail_parser()
            .parse(&response("https://www5.divxtotal.mov/series/x/", "<html><p>oops</p></html>"));
        assert_matches!(result, Err(IndexerError::Malformed(_)));
    }

    #[test]
    fn test_non_200_is_error() {
        let mut resp = response("https://www5.divxtotal.mov/page/1?s=x", LISTING);
        resp.status = 202;
        assert_matches!(
            indexer().parser().parse(&resp),
            Err(IndexerError::UnexpectedStatus { status: 202 })
        );
    }
}
