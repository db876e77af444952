//! Normalised string similarity used by the validation pipeline: manuscript
//! author name matching and institutional affiliation matching both reduce to
//! the same normalised-Levenshtein similarity over a cleaned-up string.

use crate::text_utils::strip_institution_stopwords;

/// Lowercase, trim, and collapse internal whitespace — the baseline
/// normalisation applied before any equality or similarity comparison.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity in `[0, 1]` via normalised Levenshtein distance
/// (`1 - distance / max(len)`), using `rapidfuzz`'s `ratio` which computes
/// exactly that measure over the character sequences.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return if a.is_empty() && b.is_empty() { 1.0 } else { 0.0 };
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Manuscript-author-check name comparison (§4.5 step 1): exact case-folded
/// equality, or similarity strictly greater than 0.9.
pub fn names_match(a: &str, b: &str) -> bool {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na == nb {
        return true;
    }
    similarity(&na, &nb) > 0.9
}

/// Institutional-conflict-check comparison (§4.5 step 3): case-folded
/// equality of institution name, or similarity over the stopword-stripped
/// names strictly greater than 0.8.
pub fn institutions_match(a: &str, b: &str) -> bool {
    let la = a.to_lowercase();
    let lb = b.to_lowercase();
    if la == lb {
        return true;
    }
    let sa = strip_institution_stopwords(a);
    let sb = strip_institution_stopwords(b);
    similarity(&sa, &sb) > 0.8
}

/// Pattern an author-record email must NOT match to be usable as an equality
/// key: a synthesised `<orcid>@orcid.org` address. ORCID ids are
/// `\d{4}-\d{4}-\d{4}-\d{3}[\dX]`.
pub fn looks_like_synthetic_orcid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if !domain.eq_ignore_ascii_case("orcid.org") {
        return false;
    }
    let digits_and_dashes: Vec<&str> = local.split('-').collect();
    if digits_and_dashes.len() != 4 {
        return false;
    }
    let (first_three, last) = digits_and_dashes.split_at(3);
    first_three.iter().all(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_digit()))
        && last[0].len() == 4
        && last[0][..3].chars().all(|c| c.is_ascii_digit())
        && (last[0].as_bytes()[3].is_ascii_digit() || last[0].ends_with('X') || last[0].ends_with('x'))
}

/// A loose well-formedness check (`local@domain` with a `.` in `domain`,
/// and not an ORCID-synthesised address) used by the manuscript-author-match
/// email branch.
pub fn is_well_formed_email(email: &str) -> bool {
    if looks_like_synthetic_orcid_email(email) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_match() {
        assert!(names_match("John Doe", "john   doe"));
    }

    #[test]
    fn similar_name_above_threshold_matches() {
        // one-character difference on a fairly long name — similarity > 0.9
        assert!(names_match("Jonathan Smithson", "Jonathan Smithsen"));
    }

    #[test]
    fn dissimilar_names_do_not_match() {
        assert!(!names_match("John Doe", "Jane Roe"));
    }

    #[test]
    fn institution_similarity_after_stopword_strip() {
        // "Test University" -> "test"; "Test University Medical Center" -> "test"
        assert!(institutions_match(
            "Test University",
            "Test University Medical Center"
        ));
    }

    #[test]
    fn unrelated_institutions_do_not_match() {
        assert!(!institutions_match("Test University", "Acme College"));
    }

    #[test]
    fn orcid_synthetic_email_detected() {
        assert!(looks_like_synthetic_orcid_email("0000-0002-1825-0097@orcid.org"));
        assert!(!is_well_formed_email("0000-0002-1825-0097@orcid.org"));
    }

    #[test]
    fn ordinary_email_is_well_formed() {
        assert!(is_well_formed_email("jane.doe@example.edu"));
    }
}
