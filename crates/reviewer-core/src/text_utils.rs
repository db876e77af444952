//! Query-term synthesis shared by adapters that need to build a boolean
//! query from keywords when the caller hasn't supplied one.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "and", "or", "for", "to", "in", "on", "with", "by",
    ]
    .into_iter()
    .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9]+").unwrap());

/// Extract up to `n` significant words from free text for building a search
/// query. Skips stop words and very short words, but keeps short
/// alphanumeric terms like "L2", "3D", "AI", "5G".
pub fn get_query_words(text: &str, n: usize) -> Vec<String> {
    let all_words: Vec<&str> = WORD_RE.find_iter(text).map(|m| m.as_str()).collect();

    let significant: Vec<&str> = all_words.iter().copied().filter(|w| is_significant(w)).collect();

    if significant.len() >= 3 {
        significant.into_iter().take(n).map(String::from).collect()
    } else {
        all_words.into_iter().take(n).map(String::from).collect()
    }
}

fn is_significant(w: &str) -> bool {
    if STOP_WORDS.contains(w.to_lowercase().as_str()) {
        return false;
    }
    if w.len() >= 3 {
        return true;
    }
    let has_letter = w.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = w.chars().any(|c| c.is_ascii_digit());
    has_letter && has_digit
}

/// Stopwords stripped from institution names before computing institutional
/// similarity (§4.5 step 3).
static INSTITUTION_STOPWORDS: &[&str] = &[
    "university",
    "college",
    "institute",
    "hospital",
    "medical",
    "center",
];

/// Lowercase an institution name and drop the common institutional
/// stopwords, collapsing whitespace.
pub fn strip_institution_stopwords(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .filter(|w| !INSTITUTION_STOPWORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Synthesize a boolean query string for `keywords`, joining significant
/// words. Returns the empty string for an empty input, per the
/// `generateSearchStrings([], anyDb)` boundary behaviour.
pub fn synthesize_boolean_query(keywords: &[String], max_words: usize) -> String {
    if keywords.is_empty() {
        return String::new();
    }
    let joined = keywords.join(" ");
    get_query_words(&joined, max_words).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_short_alphanumeric_terms() {
        let words = get_query_words("A Study of L2 Regularization in 5G Networks", 10);
        assert!(words.contains(&"L2".to_string()));
        assert!(words.contains(&"5G".to_string()));
    }

    #[test]
    fn drops_stop_words_when_enough_significant_words() {
        let words = get_query_words("The Study of the Neural Network Architecture", 10);
        assert!(!words.iter().any(|w| w.eq_ignore_ascii_case("the")));
    }

    #[test]
    fn strips_institution_stopwords() {
        assert_eq!(strip_institution_stopwords("Test University"), "test");
        assert_eq!(
            strip_institution_stopwords("Test University Medical Center"),
            "test"
        );
    }

    #[test]
    fn empty_keywords_yield_empty_string() {
        assert_eq!(synthesize_boolean_query(&[], 6), "");
    }
}
