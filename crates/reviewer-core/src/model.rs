//! Core data model: processes, manuscripts, authors, candidates and the
//! records produced by search and validation.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

/// Unique id type used throughout the model. Call sites that synthesise ids
/// (adapters, the aggregator) build these from a source prefix and a stable
/// hash of identifying fields rather than random generation.
pub type Id = String;

/// The step a [`Process`] is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    Upload,
    MetadataExtraction,
    KeywordEnhancement,
    DatabaseSearch,
    ManualSearch,
    Validation,
    Recommendations,
    Shortlist,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Created,
    Processing,
    Searching,
    Validating,
    Completed,
    Error,
}

/// The unit of work the core operates on.
#[derive(Debug, Clone)]
pub struct Process {
    pub id: Id,
    pub owner_id: Id,
    pub title: String,
    pub step: ProcessStep,
    pub status: ProcessStatus,
    pub metadata: ManuscriptMetadata,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Manuscript metadata seeding a search.
#[derive(Debug, Clone, Default)]
pub struct ManuscriptMetadata {
    pub title: String,
    pub authors: Vec<Author>,
    pub affiliations: Vec<Affiliation>,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub primary_focus_area: Option<String>,
    pub secondary_focus_area: Option<String>,
}

impl ManuscriptMetadata {
    /// Keywords, ordered, unique after case-fold (first occurrence wins).
    pub fn deduped_keywords(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for kw in &self.keywords {
            let key = kw.to_lowercase();
            if seen.insert(key) {
                out.push(kw.clone());
            }
        }
        out
    }
}

/// Unified author shape for both manuscript authors and search candidates.
#[derive(Debug, Clone)]
pub struct Author {
    pub id: Id,
    pub name: String,
    pub email: Option<String>,
    pub affiliations: Vec<Affiliation>,
    pub publication_count: u32,
    pub clinical_trials: u32,
    pub retractions: u32,
    pub research_areas: BTreeSet<String>,
    pub mesh_terms: BTreeSet<String>,
}

impl Author {
    pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            affiliations: Vec::new(),
            publication_count: 0,
            clinical_trials: 0,
            retractions: 0,
            research_areas: BTreeSet::new(),
            mesh_terms: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affiliation {
    pub id: Id,
    pub institution_name: String,
    pub department: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
}

impl Affiliation {
    /// Case-folded (institutionName, country) key used to union affiliation
    /// sets during aggregation.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.institution_name.to_lowercase(),
            self.country.as_deref().unwrap_or("").to_lowercase(),
        )
    }
}

/// The search terms handed to adapters.
#[derive(Debug, Clone, Default)]
pub struct SearchTerms {
    pub keywords: BTreeSet<String>,
    pub mesh_terms: BTreeSet<String>,
    /// Pre-built boolean query per source name, overriding synthesis.
    pub boolean_queries: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateRole {
    ManuscriptAuthor,
    Candidate,
    Shortlisted,
}

/// An [`Author`] bound to a [`Process`] with a role and optional validation
/// outcome. `(process_id, author_id)` is unique.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub process_id: Id,
    pub author: Author,
    pub role: CandidateRole,
    pub validation: Option<ValidationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictKind {
    ManuscriptAuthor,
    CoAuthor,
    Institutional,
    RecentCollaboration,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: &'static str,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublicationMetrics {
    pub total_publications: u32,
    /// `floor(total_publications * 0.3)` — a documented placeholder pending
    /// real date-windowed publication counts (see design notes).
    pub recent_publications: u32,
}

#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub passed: bool,
    pub conflicts: BTreeSet<ConflictKind>,
    pub retraction_flags: Vec<String>,
    pub metrics: PublicationMetrics,
    pub steps: Vec<StepResult>,
    pub validated_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone)]
pub struct AdapterProgress {
    pub state: AdapterState,
    pub percent: u8,
    pub authors_found: u32,
    pub error: Option<String>,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

impl Default for AdapterProgress {
    fn default() -> Self {
        Self {
            state: AdapterState::Pending,
            percent: 0,
            authors_found: 0,
            error: None,
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchState {
    Pending,
    Searching,
    Completed,
    Error,
}

#[derive(Debug, Clone)]
pub struct SearchStatus {
    pub process_id: Id,
    pub state: SearchState,
    pub per_database: std::collections::HashMap<String, AdapterProgress>,
    pub total_authors_found: u32,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

impl SearchStatus {
    pub fn new(process_id: impl Into<Id>) -> Self {
        Self {
            process_id: process_id.into(),
            state: SearchState::Pending,
            per_database: std::collections::HashMap::new(),
            total_authors_found: 0,
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shortlist {
    pub id: Id,
    pub process_id: Id,
    pub name: String,
    pub author_ids: Vec<Id>,
}

impl Shortlist {
    pub fn reviewer_count(&self) -> usize {
        self.author_ids.len()
    }
}

/// Retry/circuit/timeout knobs a single [`crate::resilience::ResilienceLayer`]
/// call is configured with.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub min_publications: u32,
    pub max_retractions: u32,
    pub min_recent_publications: u32,
    pub recent_years: u32,
    pub check_institutional_conflicts: bool,
    pub check_co_author_conflicts: bool,
    pub collaboration_years: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_publications: 5,
            max_retractions: 0,
            min_recent_publications: 2,
            recent_years: 5,
            check_institutional_conflicts: true,
            check_co_author_conflicts: true,
            collaboration_years: 3,
        }
    }
}
