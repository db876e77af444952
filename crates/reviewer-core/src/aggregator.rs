//! Cross-adapter candidate deduplication and merging (§4.4), grounded in this
//! workspace's `pool.rs::RefCollector`/`AggState` idea: a small shared
//! aggregation state, mutated under a short-held mutex, rather than the
//! heavier per-reference drainer machinery that module also implements (that
//! part has no counterpart here — the orchestrator fans candidates straight
//! into the repository instead of a multi-drainer pipeline).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::matching::{is_well_formed_email, normalize_name};
use crate::model::{Author, Candidate, CandidateRole, Id};
use crate::repository::{RepoResult, RepositoryPort};

/// Merges candidate authors into a process's candidate set, one adapter's
/// result batch at a time. Serialises merges per process (a coarsening of
/// the required per-(processId, matchingKey) granularity that is simpler to
/// reason about and still correct: it rules out races between concurrently
/// completing adapters for the same process).
#[derive(Default)]
pub struct Aggregator {
    process_locks: DashMap<Id, Arc<Mutex<()>>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, process_id: &str) -> Arc<Mutex<()>> {
        self.process_locks
            .entry(process_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// (email if present and well-formed) else (case-folded full name).
    pub fn matching_key(author: &Author) -> String {
        match &author.email {
            Some(email) if is_well_formed_email(email) => email.to_lowercase(),
            _ => normalize_name(&author.name),
        }
    }

    /// Conservative merge of two records believed to be the same person:
    /// MAX for publicationCount/clinicalTrials/retractions (overlapping
    /// source coverage, not additive evidence), union for the set-valued
    /// fields. The earlier-seen author's id and name win, so repeated merges
    /// of the same inputs are idempotent.
    fn merge_authors(existing: Author, incoming: Author) -> Author {
        let mut merged = existing;
        merged.publication_count = merged.publication_count.max(incoming.publication_count);
        merged.clinical_trials = merged.clinical_trials.max(incoming.clinical_trials);
        merged.retractions = merged.retractions.max(incoming.retractions);
        merged.research_areas.extend(incoming.research_areas);
        merged.mesh_terms.extend(incoming.mesh_terms);
        for affiliation in incoming.affiliations {
            if !merged
                .affiliations
                .iter()
                .any(|a| a.dedup_key() == affiliation.dedup_key())
            {
                merged.affiliations.push(affiliation);
            }
        }
        if merged.email.is_none() {
            merged.email = incoming.email;
        }
        merged
    }

    /// Merge one adapter's candidate authors into `process_id`'s persisted
    /// CANDIDATE set. Returns the number of authors processed.
    pub fn merge(&self, repo: &dyn RepositoryPort, process_id: &str, authors: Vec<Author>) -> RepoResult<usize> {
        let lock = self.lock_for(process_id);
        let _guard = lock.lock().expect("aggregator process mutex poisoned");

        let mut processed = 0usize;
        for incoming in authors {
            let key = Self::matching_key(&incoming);
            let existing_candidates = repo.find_by_process_and_role(process_id, CandidateRole::Candidate)?;
            let existing = existing_candidates
                .into_iter()
                .find(|c| Self::matching_key(&c.author) == key);

            let (merged_author, preserved_validation) = match existing {
                Some(candidate) => (Self::merge_authors(candidate.author, incoming), candidate.validation),
                None => (incoming, None),
            };

            repo.update_author_monotonic(merged_author.clone())?;
            repo.upsert_candidate(Candidate {
                process_id: process_id.to_string(),
                author: merged_author,
                role: CandidateRole::Candidate,
                validation: preserved_validation,
            })?;
            processed += 1;
        }
        Ok(processed)
    }
}

/// `searchByName`'s manual dedup rule (§4.3): group by case-folded name,
/// keep the record with the highest publicationCount, union affiliations.
/// Independent of [`Aggregator::merge`] — this runs over a transient result
/// list rather than the persisted candidate set.
pub fn dedup_by_name(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_name: HashMap<String, Candidate> = HashMap::new();
    for candidate in candidates {
        let key = normalize_name(&candidate.author.name);
        match by_name.get_mut(&key) {
            Some(existing) => {
                if candidate.author.publication_count > existing.author.publication_count {
                    let mut winner = candidate.clone();
                    for affiliation in existing.author.affiliations.iter().cloned() {
                        if !winner
                            .author
                            .affiliations
                            .iter()
                            .any(|a| a.dedup_key() == affiliation.dedup_key())
                        {
                            winner.author.affiliations.push(affiliation);
                        }
                    }
                    *existing = winner;
                } else {
                    for affiliation in candidate.author.affiliations {
                        if !existing
                            .author
                            .affiliations
                            .iter()
                            .any(|a| a.dedup_key() == affiliation.dedup_key())
                        {
                            existing.author.affiliations.push(affiliation);
                        }
                    }
                }
            }
            None => {
                by_name.insert(key, candidate);
            }
        }
    }
    by_name.into_values().collect()
}
