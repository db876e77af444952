//! `RepositoryPort`: the persistence boundary the core calls through (§6, §9
//! "mock-heavy service wiring" redesign note — the port is explicit, never a
//! concrete database client reached for inside a component). Also provides
//! an in-memory reference implementation that doubles as the default test
//! fixture, grounded in this workspace's existing `MockDb` test-double
//! pattern generalised into a real trait boundary, using `dashmap` for the
//! same lock-free concurrent map this workspace's orchestrator already uses.

use std::sync::Mutex;

use dashmap::DashMap;
use thiserror::Error;

use crate::model::{Author, Candidate, CandidateRole, Id, ManuscriptMetadata, Process, Shortlist, ValidationRecord};

#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("process not found: {0}")]
    ProcessNotFound(Id),
    #[error("candidate not found: process={0} author={1}")]
    CandidateNotFound(Id, Id),
    #[error("shortlist not found: {0}")]
    ShortlistNotFound(Id),
    #[error("backing store error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// CRUD + query surface the core calls through. Every write that spans
/// multiple rows (shortlist creation, role reassignment) is transactional —
/// the in-memory implementation achieves this by holding its map's entry
/// lock for the duration of the mutation, never by issuing separate
/// unguarded reads/writes.
pub trait RepositoryPort: Send + Sync {
    fn create_process(&self, process: Process) -> RepoResult<()>;
    fn get_process(&self, process_id: &str) -> RepoResult<Option<Process>>;
    fn update_process(&self, process: Process) -> RepoResult<()>;
    fn update_metadata(&self, process_id: &str, metadata: ManuscriptMetadata) -> RepoResult<()>;
    fn get_metadata(&self, process_id: &str) -> RepoResult<Option<ManuscriptMetadata>>;

    /// Insert or replace a candidate row. Used both by the aggregator
    /// (role=CANDIDATE) and by role reassignment (e.g. shortlisting).
    fn upsert_candidate(&self, candidate: Candidate) -> RepoResult<()>;
    fn find_by_id(&self, process_id: &str, author_id: &str) -> RepoResult<Option<Candidate>>;
    fn find_by_process_and_role(&self, process_id: &str, role: CandidateRole) -> RepoResult<Vec<Candidate>>;
    fn find_all_by_process(&self, process_id: &str) -> RepoResult<Vec<Candidate>>;

    fn update_validation_status(&self, process_id: &str, author_id: &str, record: ValidationRecord) -> RepoResult<()>;
    fn clear_validation_records(&self, process_id: &str) -> RepoResult<()>;

    fn find_author(&self, author_id: &str) -> RepoResult<Option<Author>>;

    /// Monotonic-merge update (§3 ownership rule): `publicationCount` may
    /// only increase. Returns the author row as it stands after the merge.
    fn update_author_monotonic(&self, author: Author) -> RepoResult<Author>;

    fn create_shortlist(&self, process_id: &str, name: &str, author_ids: Vec<Id>) -> RepoResult<Shortlist>;
    fn get_shortlists_by_process(&self, process_id: &str) -> RepoResult<Vec<Shortlist>>;
}

/// Reference `RepositoryPort` implementation. Not a cache or a shortcut: it
/// is a fully conformant implementation of the port, used both as the demo
/// CLI's backing store and as the test fixture for every core component.
#[derive(Default)]
pub struct InMemoryRepository {
    processes: DashMap<Id, Process>,
    // keyed by (process_id, author_id)
    candidates: DashMap<(Id, Id), Candidate>,
    authors: DashMap<Id, Author>,
    shortlists: DashMap<Id, Shortlist>,
    shortlist_seq: Mutex<u64>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_shortlist_id(&self, process_id: &str) -> Id {
        let mut seq = self.shortlist_seq.lock().expect("shortlist sequence mutex poisoned");
        *seq += 1;
        format!("shortlist-{process_id}-{seq}")
    }
}

impl RepositoryPort for InMemoryRepository {
    fn create_process(&self, process: Process) -> RepoResult<()> {
        self.processes.insert(process.id.clone(), process);
        Ok(())
    }

    fn get_process(&self, process_id: &str) -> RepoResult<Option<Process>> {
        Ok(self.processes.get(process_id).map(|p| p.clone()))
    }

    fn update_process(&self, process: Process) -> RepoResult<()> {
        self.processes.insert(process.id.clone(), process);
        Ok(())
    }

    fn update_metadata(&self, process_id: &str, metadata: ManuscriptMetadata) -> RepoResult<()> {
        let mut entry = self
            .processes
            .get_mut(process_id)
            .ok_or_else(|| RepositoryError::ProcessNotFound(process_id.to_string()))?;
        entry.metadata = metadata;
        Ok(())
    }

    fn get_metadata(&self, process_id: &str) -> RepoResult<Option<ManuscriptMetadata>> {
        Ok(self.processes.get(process_id).map(|p| p.metadata.clone()))
    }

    fn upsert_candidate(&self, candidate: Candidate) -> RepoResult<()> {
        let key = (candidate.process_id.clone(), candidate.author.id.clone());
        self.candidates.insert(key, candidate);
        Ok(())
    }

    fn find_by_id(&self, process_id: &str, author_id: &str) -> RepoResult<Option<Candidate>> {
        Ok(self
            .candidates
            .get(&(process_id.to_string(), author_id.to_string()))
            .map(|c| c.clone()))
    }

    fn find_by_process_and_role(&self, process_id: &str, role: CandidateRole) -> RepoResult<Vec<Candidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|entry| entry.key().0 == process_id && entry.value().role == role)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn find_all_by_process(&self, process_id: &str) -> RepoResult<Vec<Candidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|entry| entry.key().0 == process_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn update_validation_status(&self, process_id: &str, author_id: &str, record: ValidationRecord) -> RepoResult<()> {
        let key = (process_id.to_string(), author_id.to_string());
        let mut entry = self
            .candidates
            .get_mut(&key)
            .ok_or_else(|| RepositoryError::CandidateNotFound(process_id.to_string(), author_id.to_string()))?;
        entry.validation = Some(record);
        Ok(())
    }

    fn clear_validation_records(&self, process_id: &str) -> RepoResult<()> {
        for mut entry in self.candidates.iter_mut() {
            if entry.key().0 == process_id {
                entry.validation = None;
            }
        }
        Ok(())
    }

    fn find_author(&self, author_id: &str) -> RepoResult<Option<Author>> {
        Ok(self.authors.get(author_id).map(|a| a.clone()))
    }

    fn update_author_monotonic(&self, author: Author) -> RepoResult<Author> {
        let mut entry = self.authors.entry(author.id.clone()).or_insert_with(|| author.clone());
        if author.publication_count > entry.publication_count {
            entry.publication_count = author.publication_count;
        }
        if author.clinical_trials > entry.clinical_trials {
            entry.clinical_trials = author.clinical_trials;
        }
        if author.retractions > entry.retractions {
            entry.retractions = author.retractions;
        }
        entry.research_areas.extend(author.research_areas.iter().cloned());
        entry.mesh_terms.extend(author.mesh_terms.iter().cloned());
        for affiliation in &author.affiliations {
            if !entry
                .affiliations
                .iter()
                .any(|a| a.dedup_key() == affiliation.dedup_key())
            {
                entry.affiliations.push(affiliation.clone());
            }
        }
        if entry.email.is_none() {
            entry.email = author.email.clone();
        }
        Ok(entry.clone())
    }

    fn create_shortlist(&self, process_id: &str, name: &str, author_ids: Vec<Id>) -> RepoResult<Shortlist> {
        // Validate every id resolves to an existing candidate before mutating
        // any role, so a missing id fails the whole call with zero side
        // effects (§5/§6: shortlist creation is transactional).
        for author_id in &author_ids {
            let key = (process_id.to_string(), author_id.clone());
            if !self.candidates.contains_key(&key) {
                return Err(RepositoryError::CandidateNotFound(process_id.to_string(), author_id.clone()));
            }
        }

        let id = self.next_shortlist_id(process_id);
        for author_id in &author_ids {
            let key = (process_id.to_string(), author_id.clone());
            let mut candidate = self
                .candidates
                .get_mut(&key)
                .ok_or_else(|| RepositoryError::CandidateNotFound(process_id.to_string(), author_id.clone()))?;
            candidate.role = CandidateRole::Shortlisted;
        }
        let shortlist = Shortlist {
            id: id.clone(),
            process_id: process_id.to_string(),
            name: name.to_string(),
            author_ids,
        };
        self.shortlists.insert(id, shortlist.clone());
        Ok(shortlist)
    }

    fn get_shortlists_by_process(&self, process_id: &str) -> RepoResult<Vec<Shortlist>> {
        Ok(self
            .shortlists
            .iter()
            .filter(|entry| entry.value().process_id == process_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
