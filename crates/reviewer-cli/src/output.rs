use std::io::Write;

use owo_colors::OwoColorize;
use reviewer_core::{AdapterState, RecommendationResponse, ScoredCandidate, SearchState, SearchStatus};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

pub fn print_search_status(w: &mut dyn Write, status: &SearchStatus, color: ColorMode) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SEARCH STATUS".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{sep}")?;
        writeln!(w, "SEARCH STATUS")?;
        writeln!(w, "{sep}")?;
    }

    let mut names: Vec<&String> = status.per_database.keys().collect();
    names.sort();
    for name in names {
        let progress = &status.per_database[name];
        let (label, colored) = match progress.state {
            AdapterState::Completed => ("COMPLETED", format!("{}", "COMPLETED".green())),
            AdapterState::Error => ("ERROR", format!("{}", "ERROR".red())),
            AdapterState::Running => ("RUNNING", format!("{}", "RUNNING".yellow())),
            AdapterState::Pending => ("PENDING", format!("{}", "PENDING".dimmed())),
        };
        if color.enabled() {
            write!(w, "  {name:<18} {colored}")?;
        } else {
            write!(w, "  {name:<18} {label}")?;
        }
        if progress.authors_found > 0 {
            write!(w, " ({} found)", progress.authors_found)?;
        }
        if let Some(err) = &progress.error {
            write!(w, " — {err}")?;
        }
        writeln!(w)?;
    }

    writeln!(w)?;
    let overall = match status.state {
        SearchState::Completed => "COMPLETED",
        SearchState::Searching => "SEARCHING",
        SearchState::Pending => "PENDING",
        SearchState::Error => "ERROR",
    };
    writeln!(w, "  Total authors found: {}", status.total_authors_found)?;
    writeln!(w, "  Overall state: {overall}")?;
    writeln!(w)?;
    Ok(())
}

pub fn print_recommendations(w: &mut dyn Write, response: &RecommendationResponse, color: ColorMode) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(70);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "RECOMMENDED REVIEWERS".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{sep}")?;
        writeln!(w, "RECOMMENDED REVIEWERS")?;
        writeln!(w, "{sep}")?;
    }
    writeln!(
        w,
        "  {} total candidates, {} after filters",
        response.total_count, response.filtered_count
    )?;
    writeln!(w)?;

    if response.page.is_empty() {
        if color.enabled() {
            writeln!(w, "  {}", "No candidates match the current filters.".yellow())?;
        } else {
            writeln!(w, "  No candidates match the current filters.")?;
        }
    }

    for scored in &response.page {
        print_candidate_row(w, scored, color)?;
    }

    if !response.suggestions.is_empty() {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "{}", "Suggestions to widen the result set:".bold())?;
        } else {
            writeln!(w, "Suggestions to widen the result set:")?;
        }
        for suggestion in &response.suggestions {
            writeln!(w, "  - {}", describe_suggestion(suggestion))?;
        }
    }
    writeln!(w)?;
    Ok(())
}

fn describe_suggestion(suggestion: &reviewer_core::recommendation::Suggestion) -> String {
    use reviewer_core::recommendation::SuggestionType;
    match suggestion.suggestion_type {
        SuggestionType::RelaxPublications => format!(
            "lower the minimum publication count to {}",
            suggestion.suggested_min_publications.unwrap_or(0)
        ),
        SuggestionType::RelaxRetractions => format!(
            "raise the maximum retraction count to {}",
            suggestion.suggested_max_retractions.unwrap_or(2)
        ),
        SuggestionType::DropCountries => "drop the country filter".to_string(),
        SuggestionType::DropInstitutions => "drop the institution filter".to_string(),
    }
}

fn print_candidate_row(w: &mut dyn Write, scored: &ScoredCandidate, color: ColorMode) -> std::io::Result<()> {
    let author = &scored.candidate.author;
    let passed = scored.candidate.validation.as_ref().map(|v| v.passed);
    let status_label = match passed {
        Some(true) => "PASS",
        Some(false) => "FLAGGED",
        None => "UNVALIDATED",
    };

    if color.enabled() {
        let colored_status = match passed {
            Some(true) => format!("{}", status_label.green()),
            Some(false) => format!("{}", status_label.yellow()),
            None => format!("{}", status_label.dimmed()),
        };
        writeln!(
            w,
            "  {:<28} score={:<4} pubs={:<4} trials={:<3} retractions={:<2} [{}]",
            author.name.cyan(),
            scored.relevance_score,
            author.publication_count,
            author.clinical_trials,
            author.retractions,
            colored_status,
        )?;
    } else {
        writeln!(
            w,
            "  {:<28} score={:<4} pubs={:<4} trials={:<3} retractions={:<2} [{}]",
            author.name, scored.relevance_score, author.publication_count, author.clinical_trials, author.retractions, status_label,
        )?;
    }
    if let Some(affiliation) = &scored.primary_affiliation {
        if color.enabled() {
            writeln!(w, "    {}", affiliation.dimmed())?;
        } else {
            writeln!(w, "    {affiliation}")?;
        }
    }
    if let Some(validation) = &scored.candidate.validation {
        if !validation.conflicts.is_empty() {
            let conflicts: Vec<String> = validation.conflicts.iter().map(|c| format!("{c:?}")).collect();
            if color.enabled() {
                writeln!(w, "    {} {}", "conflicts:".red(), conflicts.join(", "))?;
            } else {
                writeln!(w, "    conflicts: {}", conflicts.join(", "))?;
            }
        }
    }
    Ok(())
}
