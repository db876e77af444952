//! Recommendation query layer (§4.6): filtering, sorting, paging and
//! relevance scoring over a process's validated candidates, plus the
//! filter-option and suggestion machinery the UI drives off of.

use std::cmp::Ordering;

use crate::model::{Candidate, CandidateRole, ConflictKind, Id};
use crate::repository::{RepoResult, RepositoryPort};

const DEFAULT_PAGE_SIZE_CAP: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub min_publications: Option<u32>,
    pub max_retractions: Option<u32>,
    pub min_clinical_trials: Option<u32>,
    pub countries: Vec<String>,
    pub institutions: Vec<String>,
    pub research_areas: Vec<String>,
    pub only_validated: bool,
    pub exclude_conflicts: Vec<ConflictKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    PublicationCount,
    ClinicalTrials,
    Retractions,
    Country,
    Institution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// A candidate augmented with its computed relevance score and primary
/// (first) affiliation, as returned by `getValidatedCandidates`/`getRecommendations`.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub relevance_score: i64,
    pub primary_affiliation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionType {
    RelaxPublications,
    RelaxRetractions,
    DropCountries,
    DropInstitutions,
}

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub suggestion_type: SuggestionType,
    pub suggested_min_publications: Option<u32>,
    pub suggested_max_retractions: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RecommendationResponse {
    pub total_count: u32,
    pub filtered_count: u32,
    pub applied_filters: Filters,
    pub sort: Sort,
    pub suggestions: Vec<Suggestion>,
    pub page: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub countries: Vec<String>,
    pub institutions: Vec<String>,
    pub research_areas: Vec<String>,
    pub publication_range: Range,
    pub retraction_range: Range,
    pub clinical_trial_range: Range,
}

/// `min(publicationCount * 2, 40) + min(clinicalTrials * 5, 20)
///   + (validationPassed ? 20 : 0) - retractions * 10
///   + min(|researchAreas| * 2, 10) + min(|meshTerms|, 10)`, clamped >= 0.
pub fn relevance_score(candidate: &Candidate) -> i64 {
    let author = &candidate.author;
    let publication_component = (author.publication_count as i64 * 2).min(40);
    let clinical_component = (author.clinical_trials as i64 * 5).min(20);
    let validation_component = candidate.validation.as_ref().map(|v| if v.passed { 20 } else { 0 }).unwrap_or(0);
    let retraction_penalty = author.retractions as i64 * 10;
    let research_area_component = (author.research_areas.len() as i64 * 2).min(10);
    let mesh_component = (author.mesh_terms.len() as i64).min(10);

    let score = publication_component + clinical_component + validation_component - retraction_penalty
        + research_area_component
        + mesh_component;
    score.max(0)
}

fn primary_affiliation(candidate: &Candidate) -> Option<String> {
    candidate.author.affiliations.first().map(|a| a.institution_name.clone())
}

fn matches_filters(candidate: &Candidate, filters: &Filters) -> bool {
    let author = &candidate.author;

    if let Some(min_pubs) = filters.min_publications {
        if author.publication_count < min_pubs {
            return false;
        }
    }
    if let Some(max_retractions) = filters.max_retractions {
        if author.retractions > max_retractions {
            return false;
        }
    }
    if let Some(min_trials) = filters.min_clinical_trials {
        if author.clinical_trials < min_trials {
            return false;
        }
    }
    if !filters.countries.is_empty() {
        let matches = author.affiliations.iter().any(|affiliation| {
            affiliation
                .country
                .as_deref()
                .map(|country| filters.countries.iter().any(|wanted| wanted.eq_ignore_ascii_case(country)))
                .unwrap_or(false)
        });
        if !matches {
            return false;
        }
    }
    if !filters.institutions.is_empty() {
        let matches = author.affiliations.iter().any(|affiliation| {
            let institution = affiliation.institution_name.to_lowercase();
            filters.institutions.iter().any(|wanted| {
                let wanted = wanted.to_lowercase();
                institution.contains(&wanted) || wanted.contains(&institution)
            })
        });
        if !matches {
            return false;
        }
    }
    if !filters.research_areas.is_empty() {
        let matches = author.research_areas.iter().any(|area| {
            let area = area.to_lowercase();
            filters.research_areas.iter().any(|wanted| {
                let wanted = wanted.to_lowercase();
                area.contains(&wanted) || wanted.contains(&area)
            })
        });
        if !matches {
            return false;
        }
    }
    if filters.only_validated && candidate.validation.is_none() {
        return false;
    }
    if !filters.exclude_conflicts.is_empty() {
        if let Some(validation) = &candidate.validation {
            if validation.conflicts.iter().any(|c| filters.exclude_conflicts.contains(c)) {
                return false;
            }
        }
    }
    true
}

fn sort_key_string(candidate: &Candidate, field: SortField) -> String {
    match field {
        SortField::Name => candidate.author.name.to_lowercase(),
        SortField::Country => candidate
            .author
            .affiliations
            .first()
            .and_then(|a| a.country.clone())
            .unwrap_or_default()
            .to_lowercase(),
        SortField::Institution => candidate
            .author
            .affiliations
            .first()
            .map(|a| a.institution_name.to_lowercase())
            .unwrap_or_default(),
        _ => unreachable!("sort_key_string only called for string-valued fields"),
    }
}

fn sort_key_numeric(candidate: &Candidate, field: SortField) -> u32 {
    match field {
        SortField::PublicationCount => candidate.author.publication_count,
        SortField::ClinicalTrials => candidate.author.clinical_trials,
        SortField::Retractions => candidate.author.retractions,
        _ => unreachable!("sort_key_numeric only called for numeric-valued fields"),
    }
}

fn compare_by_sort(a: &Candidate, b: &Candidate, sort: Sort) -> Ordering {
    let ordering = match sort.field {
        SortField::Name | SortField::Country | SortField::Institution => {
            sort_key_string(a, sort.field).cmp(&sort_key_string(b, sort.field))
        }
        SortField::PublicationCount | SortField::ClinicalTrials | SortField::Retractions => {
            sort_key_numeric(a, sort.field).cmp(&sort_key_numeric(b, sort.field))
        }
    };
    let directed = match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    directed.then_with(|| a.author.id.cmp(&b.author.id))
}

fn compare_by_default(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.relevance_score
        .cmp(&a.relevance_score)
        .then_with(|| b.candidate.author.publication_count.cmp(&a.candidate.author.publication_count))
        .then_with(|| a.candidate.author.id.cmp(&b.candidate.author.id))
}

/// `floor` is 0 in the zero-result case and 3 in the "thin" case
/// (`filteredCount` between 1 and 4 with a double-digit `totalCount`) — the
/// thin case floors higher so the relaxed filter still narrows the field
/// rather than collapsing straight back to "no minimum".
fn build_suggestions(filters: &Filters, floor: u32) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    if let Some(min_pubs) = filters.min_publications {
        if min_pubs > 0 {
            let suggested = min_pubs.saturating_sub(5).max(floor);
            suggestions.push(Suggestion {
                suggestion_type: SuggestionType::RelaxPublications,
                suggested_min_publications: Some(suggested),
                suggested_max_retractions: None,
            });
        }
    }
    if let Some(max_retractions) = filters.max_retractions {
        if max_retractions < 2 {
            suggestions.push(Suggestion {
                suggestion_type: SuggestionType::RelaxRetractions,
                suggested_min_publications: None,
                suggested_max_retractions: Some(2),
            });
        }
    }
    if !filters.countries.is_empty() {
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::DropCountries,
            suggested_min_publications: None,
            suggested_max_retractions: None,
        });
    }
    if !filters.institutions.is_empty() {
        suggestions.push(Suggestion {
            suggestion_type: SuggestionType::DropInstitutions,
            suggested_min_publications: None,
            suggested_max_retractions: None,
        });
    }
    suggestions
}

pub struct RecommendationQuery<'a> {
    repo: &'a dyn RepositoryPort,
}

impl<'a> RecommendationQuery<'a> {
    pub fn new(repo: &'a dyn RepositoryPort) -> Self {
        Self { repo }
    }

    /// All CANDIDATE-role candidates for a process, scored and carrying
    /// their primary affiliation. No filtering, sorting, or paging.
    pub fn get_validated_candidates(&self, process_id: &str) -> RepoResult<Vec<ScoredCandidate>> {
        let candidates = self.repo.find_by_process_and_role(process_id, CandidateRole::Candidate)?;
        Ok(candidates
            .into_iter()
            .map(|candidate| ScoredCandidate {
                relevance_score: relevance_score(&candidate),
                primary_affiliation: primary_affiliation(&candidate),
                candidate,
            })
            .collect())
    }

    pub fn get_recommendations(
        &self,
        process_id: &str,
        filters: Filters,
        sort: Option<Sort>,
        page: u32,
        limit: u32,
    ) -> RepoResult<RecommendationResponse> {
        let all_candidates = self.repo.find_by_process_and_role(process_id, CandidateRole::Candidate)?;
        let total_count = all_candidates.len() as u32;

        let filtered: Vec<Candidate> = all_candidates.into_iter().filter(|c| matches_filters(c, &filters)).collect();
        let filtered_count = filtered.len() as u32;

        let mut scored: Vec<ScoredCandidate> = filtered
            .into_iter()
            .map(|candidate| ScoredCandidate {
                relevance_score: relevance_score(&candidate),
                primary_affiliation: primary_affiliation(&candidate),
                candidate,
            })
            .collect();

        match sort {
            Some(explicit) => scored.sort_by(|a, b| compare_by_sort(&a.candidate, &b.candidate, explicit)),
            None => scored.sort_by(compare_by_default),
        }

        let effective_limit = limit.min(DEFAULT_PAGE_SIZE_CAP).max(1);
        let effective_page = page.max(1);
        let start = ((effective_page - 1) * effective_limit) as usize;
        let page_slice: Vec<ScoredCandidate> = scored.into_iter().skip(start).take(effective_limit as usize).collect();

        let suggestions = if filtered_count == 0 {
            build_suggestions(&filters, 0)
        } else if filtered_count < 5 && total_count > 10 {
            build_suggestions(&filters, 3)
        } else {
            Vec::new()
        };

        Ok(RecommendationResponse {
            total_count,
            filtered_count,
            applied_filters: filters,
            sort: sort.unwrap_or(Sort {
                field: SortField::PublicationCount,
                direction: SortDirection::Desc,
            }),
            suggestions,
            page: page_slice,
        })
    }

    pub fn get_filter_options(&self, process_id: &str) -> RepoResult<FilterOptions> {
        let candidates = self.repo.find_by_process_and_role(process_id, CandidateRole::Candidate)?;
        if candidates.is_empty() {
            return Ok(FilterOptions {
                countries: Vec::new(),
                institutions: Vec::new(),
                research_areas: Vec::new(),
                publication_range: Range { min: 0, max: 0 },
                retraction_range: Range { min: 0, max: 0 },
                clinical_trial_range: Range { min: 0, max: 0 },
            });
        }

        let mut countries = std::collections::BTreeSet::new();
        let mut institutions = std::collections::BTreeSet::new();
        let mut research_areas = std::collections::BTreeSet::new();
        let mut pub_min = u32::MAX;
        let mut pub_max = 0u32;
        let mut retraction_min = u32::MAX;
        let mut retraction_max = 0u32;
        let mut trial_min = u32::MAX;
        let mut trial_max = 0u32;

        for candidate in &candidates {
            let author = &candidate.author;
            for affiliation in &author.affiliations {
                if let Some(country) = &affiliation.country {
                    countries.insert(country.clone());
                }
                institutions.insert(affiliation.institution_name.clone());
            }
            research_areas.extend(author.research_areas.iter().cloned());
            pub_min = pub_min.min(author.publication_count);
            pub_max = pub_max.max(author.publication_count);
            retraction_min = retraction_min.min(author.retractions);
            retraction_max = retraction_max.max(author.retractions);
            trial_min = trial_min.min(author.clinical_trials);
            trial_max = trial_max.max(author.clinical_trials);
        }

        Ok(FilterOptions {
            countries: countries.into_iter().collect(),
            institutions: institutions.into_iter().collect(),
            research_areas: research_areas.into_iter().collect(),
            publication_range: Range { min: pub_min, max: pub_max },
            retraction_range: Range {
                min: retraction_min,
                max: retraction_max,
            },
            clinical_trial_range: Range { min: trial_min, max: trial_max },
        })
    }

    pub fn create_shortlist(&self, process_id: &str, name: &str, author_ids: Vec<Id>) -> RepoResult<crate::model::Shortlist> {
        self.repo.create_shortlist(process_id, name, author_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Affiliation, Author, PublicationMetrics, ValidationRecord};
    use crate::repository::InMemoryRepository;
    use std::time::SystemTime;

    fn candidate(id: &str, name: &str, pubs: u32, retractions: u32, passed: bool) -> Candidate {
        let mut author = Author::new(id, name);
        author.publication_count = pubs;
        author.retractions = retractions;
        Candidate {
            process_id: "p1".to_string(),
            author,
            role: CandidateRole::Candidate,
            validation: Some(ValidationRecord {
                passed,
                conflicts: Default::default(),
                retraction_flags: Vec::new(),
                metrics: PublicationMetrics::default(),
                steps: Vec::new(),
                validated_at: SystemTime::now(),
            }),
        }
    }

    #[test]
    fn relevance_score_matches_published_formula() {
        let mut c = candidate("a1", "Jane Smith", 30, 1, true);
        c.author.clinical_trials = 10;
        c.author.research_areas.insert("oncology".to_string());
        c.author.research_areas.insert("genomics".to_string());
        c.author.mesh_terms.insert("Neoplasms".to_string());
        // pub: min(60,40)=40, trials: min(50,20)=20, validation: 20, retraction: -10
        // research areas: min(4,10)=4, mesh: min(1,10)=1 => 75
        assert_eq!(relevance_score(&c), 75);
    }

    #[test]
    fn relevance_score_clamped_at_zero() {
        let c = candidate("a1", "Jane Smith", 0, 50, false);
        assert_eq!(relevance_score(&c), 0);
    }

    #[test]
    fn empty_candidate_set_yields_zeroed_filter_options() {
        let repo = InMemoryRepository::new();
        let query = RecommendationQuery::new(&repo);
        let options = query.get_filter_options("p1").unwrap();
        assert!(options.countries.is_empty());
        assert!(options.institutions.is_empty());
        assert!(options.research_areas.is_empty());
        assert_eq!(options.publication_range.min, 0);
        assert_eq!(options.publication_range.max, 0);
    }

    #[test]
    fn limit_is_capped_and_page_is_clamped() {
        let repo = InMemoryRepository::new();
        for i in 0..10 {
            repo.upsert_candidate(candidate(&format!("a{i}"), &format!("Author {i}"), i, 0, true))
                .unwrap();
        }
        let query = RecommendationQuery::new(&repo);
        let response = query.get_recommendations("p1", Filters::default(), None, 0, 500).unwrap();
        assert_eq!(response.page.len(), 10);
        let response = query.get_recommendations("p1", Filters::default(), None, 1, 3).unwrap();
        assert_eq!(response.page.len(), 3);
    }

    #[test]
    fn default_sort_is_relevance_then_publication_count_then_id() {
        let repo = InMemoryRepository::new();
        repo.upsert_candidate(candidate("a2", "Low Scorer", 1, 0, false)).unwrap();
        repo.upsert_candidate(candidate("a1", "High Scorer", 20, 0, true)).unwrap();
        let query = RecommendationQuery::new(&repo);
        let response = query.get_recommendations("p1", Filters::default(), None, 1, 10).unwrap();
        assert_eq!(response.page[0].candidate.author.id, "a1");
    }

    #[test]
    fn suggestions_populate_when_filtered_count_is_zero() {
        let repo = InMemoryRepository::new();
        for i in 0..15 {
            repo.upsert_candidate(candidate(&format!("a{i}"), &format!("Author {i}"), 10, 0, true))
                .unwrap();
        }
        let query = RecommendationQuery::new(&repo);
        let filters = Filters {
            min_publications: Some(18),
            ..Filters::default()
        };
        let response = query.get_recommendations("p1", filters, None, 1, 20).unwrap();
        assert_eq!(response.total_count, 15);
        assert_eq!(response.filtered_count, 0);
        let relax = response
            .suggestions
            .iter()
            .find(|s| s.suggestion_type == SuggestionType::RelaxPublications)
            .unwrap();
        assert_eq!(relax.suggested_min_publications, Some(13));
    }

    #[test]
    fn no_suggestions_when_result_set_is_healthy() {
        let repo = InMemoryRepository::new();
        for i in 0..15 {
            repo.upsert_candidate(candidate(&format!("a{i}"), &format!("Author {i}"), 10, 0, true))
                .unwrap();
        }
        let query = RecommendationQuery::new(&repo);
        let response = query.get_recommendations("p1", Filters::default(), None, 1, 20).unwrap();
        assert!(response.suggestions.is_empty());
    }

    #[test]
    fn country_filter_matches_case_insensitively() {
        let repo = InMemoryRepository::new();
        let mut c = candidate("a1", "Jane Smith", 10, 0, true);
        c.author.affiliations.push(Affiliation {
            id: "f1".to_string(),
            institution_name: "Test University".to_string(),
            department: None,
            address: None,
            country: Some("US".to_string()),
        });
        repo.upsert_candidate(c).unwrap();
        let query = RecommendationQuery::new(&repo);
        let filters = Filters {
            countries: vec!["us".to_string()],
            ..Filters::default()
        };
        let response = query.get_recommendations("p1", filters, None, 1, 10).unwrap();
        assert_eq!(response.filtered_count, 1);
    }
}
