//! Search term normalization shared by request generators

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-._()@/\\\[\]+%]").expect("valid punctuation regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" +([0-9]{4})$").expect("valid year regex"));
static LANGUAGE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(espa[ñn]ol|spanish|castellano|spa)\b").expect("valid language regex")
});

/// Normalized search term plus the year stripped from it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedTerm {
    pub term: String,
    pub year: Option<u32>,
}

/// Normalize free text for use in a site query string
///
/// Punctuation becomes spaces, whitespace runs collapse, a trailing four digit
/// year is removed (and returned), and language tags are dropped.
pub fn sanitize_search_term(input: &str) -> SanitizedTerm {
    let spaced = PUNCTUATION.replace_all(input, " ");
    let mut term = WHITESPACE.replace_all(&spaced, " ").trim().to_string();

    let mut year = None;
    if let Some(caps) = TRAILING_YEAR.captures(&term) {
        year = caps.get(1).and_then(|m| m.as_str().parse().ok());
        if let Some(whole) = caps.get(0) {
            term.truncate(whole.start());
        }
    }

    let without_tags = LANGUAGE_TAGS.replace_all(&term, "");
    let term = WHITESPACE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string();

    SanitizedTerm { term, year }
}

/// Shorthand for [`sanitize_search_term`] when only the term matters
pub fn sanitize(input: &str) -> String {
    sanitize_search_term(input).term
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_year() {
        let result = sanitize_search_term("Marco Polo 2014");
        assert_eq!(result.term, "Marco Polo");
        assert_eq!(result.year, Some(2014));
    }

    #[test]
    fn test_year_only_stripped_at_end() {
        assert_eq!(sanitize("2001 A Space Odyssey"), "2001 A Space Odyssey");
        assert_eq!(sanitize("Blade Runner 2049 Final Cut"), "Blade Runner 2049 Final Cut");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(sanitize("The.Office-(US)  [720p]"), "The Office US 720p");
        assert_eq!(sanitize("  50%+off / now "), "50 off now");
    }

    #[test]
    fn test_language_tags_removed() {
        assert_eq!(sanitize("La Casa de Papel Castellano"), "La Casa de Papel");
        assert_eq!(sanitize("Dark SPANISH 2017"), "Dark");
        assert_eq!(sanitize("Elite español"), "Elite");
        // only whole words
        assert_eq!(sanitize("Spartacus"), "Spartacus");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize_search_term(""), SanitizedTerm::default());
    }
}
