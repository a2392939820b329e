//! Minimal CLI parsing.

use std::env;

use anyhow::{Context, Result, anyhow, bail};

use librarian_indexer::indexer::{SearchMode, SearchQuery};

pub const USAGE: &str = "\
Usage:
  librarian-indexer search <terms...> [--mode basic|tv|movie] [--season N] [--episode N]
                           [--category ID]... [--interactive]
  librarian-indexer indexers
  librarian-indexer help";

#[derive(Debug, PartialEq, Eq)]
pub enum CliCommand {
    Search(SearchQuery),
    ListIndexers,
    Help,
}

impl CliCommand {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        match args.next().as_deref() {
            None | Some("help") | Some("--help") | Some("-h") => Ok(CliCommand::Help),
            Some("indexers") => Ok(CliCommand::ListIndexers),
            Some("search") => parse_search(args).map(CliCommand::Search),
            Some(other) => Err(anyhow!("Unknown command: {}", other)),
        }
    }
}

fn parse_search(mut args: impl Iterator<Item = String>) -> Result<SearchQuery> {
    let mut terms = Vec::new();
    let mut query = SearchQuery::default();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if arg.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| anyhow!("{} requires a value", name))
        };
        match flag.as_str() {
            "--mode" => query.mode = value("--mode")?.parse()?,
            "--season" => {
                query.season = Some(value("--season")?.parse().context("Invalid --season")?)
            }
            "--episode" => query.episode = Some(value("--episode")?),
            "--category" => query
                .categories
                .push(value("--category")?.parse().context("Invalid --category")?),
            "--interactive" => query.interactive = true,
            _ if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            _ => terms.push(arg),
        }
    }

    if terms.is_empty() && query.season.is_none() {
        bail!("search requires at least one term");
    }
    if query.mode != SearchMode::Tv && (query.season.is_some() || query.episode.is_some()) {
        bail!("--season and --episode only apply to --mode tv");
    }
    query.search_term = (!terms.is_empty()).then(|| terms.join(" "));
    Ok(query)
}
