use std::sync::Arc;
use std::time::SystemTime;

pub mod adapters;
pub mod aggregator;
pub mod config;
pub mod errors;
pub mod matching;
pub mod model;
pub mod orchestrator;
pub mod recommendation;
pub mod repository;
pub mod resilience;
pub mod text_utils;
pub mod validation;

pub use adapters::{DatabaseAdapter, SearchOpts};
pub use config::Config;
pub use errors::{AdapterError, CoreError, CoreResult};
pub use model::*;
pub use orchestrator::SearchOrchestrator;
pub use recommendation::{Filters, RecommendationQuery, RecommendationResponse, ScoredCandidate, Sort, SortDirection, SortField};
pub use repository::{InMemoryRepository, RepositoryError, RepositoryPort};

/// Top-level facade wiring a [`Config`], a [`RepositoryPort`] and the
/// configured [`DatabaseAdapter`]s into the public operations listed in this
/// project's external-interface contract. Upstream collaborators construct
/// one of these and call through it rather than touching the orchestrator,
/// aggregator or validation modules directly.
pub struct ReviewerCore {
    orchestrator: SearchOrchestrator,
    repo: Arc<dyn RepositoryPort>,
}

impl ReviewerCore {
    /// Builds the adapter set from `config.enabled_databases`, wires each one
    /// through a [`resilience::ResilienceLayer`], and constructs the
    /// orchestrator. Elsevier/Wiley/Taylor & Francis adapters are only
    /// instantiated when the relevant API key/enablement is present.
    pub fn new(config: Config, repo: Arc<dyn RepositoryPort>) -> Self {
        let mut entries: Vec<Arc<dyn DatabaseAdapter>> = Vec::new();

        if config.enabled_databases.iter().any(|d| d == "PUBMED") {
            entries.push(Arc::new(adapters::pubmed::PubMed::new(
                config.pubmed_api_key.clone(),
                config.mailto.clone(),
            )));
        }
        if config.enabled_databases.iter().any(|d| d == "ELSEVIER") {
            if let Some(key) = &config.elsevier_api_key {
                entries.push(Arc::new(adapters::elsevier::Elsevier::new(key.clone())));
            }
        }
        if config.enabled_databases.iter().any(|d| d == "WILEY") {
            entries.push(Arc::new(adapters::crossref::CrossRefMember::wiley(config.mailto.clone())));
        }
        if config.enabled_databases.iter().any(|d| d == "TAYLOR_FRANCIS") {
            entries.push(Arc::new(adapters::crossref::CrossRefMember::taylor_francis(config.mailto.clone())));
        }

        let orchestrator = SearchOrchestrator::new(
            entries,
            config.resilience.clone(),
            repo.clone(),
            config.max_results_per_database,
            config.search_timeout,
        );

        Self { orchestrator, repo }
    }

    pub fn repository(&self) -> &Arc<dyn RepositoryPort> {
        &self.repo
    }

    /// Begins a federated search and returns immediately once `SearchStatus`
    /// has been initialised; adapter tasks continue in the background.
    pub async fn start_search(&self, process_id: &str, terms: SearchTerms, enabled_adapters: Option<&[String]>) {
        let span = tracing::info_span!("start_search", process_id);
        let _enter = span.enter();
        self.orchestrator.start_search(process_id, terms, enabled_adapters).await;
    }

    pub async fn get_search_status(&self, process_id: &str) -> Option<SearchStatus> {
        self.orchestrator.get_status(process_id).await
    }

    pub fn clear_search_status(&self, process_id: &str) {
        self.orchestrator.clear_status(process_id);
    }

    pub async fn search_by_name(&self, name: &str, adapters: Option<&[String]>) -> Vec<Candidate> {
        let span = tracing::info_span!("search_by_name", name);
        let _enter = span.enter();
        self.orchestrator.search_by_name(name, adapters).await
    }

    pub fn validate_process_authors(
        &self,
        process_id: &str,
        manuscript: &ManuscriptMetadata,
        config: &ValidationConfig,
    ) -> CoreResult<validation::ProcessValidationResult> {
        let span = tracing::info_span!("validate_process_authors", process_id);
        let _enter = span.enter();
        Ok(validation::validate_process_authors(self.repo.as_ref(), process_id, manuscript, config)?)
    }

    pub fn revalidate_process_authors(
        &self,
        process_id: &str,
        manuscript: &ManuscriptMetadata,
        config: &ValidationConfig,
    ) -> CoreResult<validation::ProcessValidationResult> {
        let span = tracing::info_span!("revalidate_process_authors", process_id);
        let _enter = span.enter();
        Ok(validation::revalidate_process_authors(self.repo.as_ref(), process_id, manuscript, config)?)
    }

    pub fn get_recommendations(
        &self,
        process_id: &str,
        filters: Filters,
        sort: Option<Sort>,
        page: u32,
        limit: u32,
    ) -> CoreResult<RecommendationResponse> {
        let span = tracing::info_span!("get_recommendations", process_id);
        let _enter = span.enter();
        let query = RecommendationQuery::new(self.repo.as_ref());
        Ok(query.get_recommendations(process_id, filters, sort, page, limit)?)
    }

    pub fn get_filter_options(&self, process_id: &str) -> CoreResult<recommendation::FilterOptions> {
        let span = tracing::info_span!("get_filter_options", process_id);
        let _enter = span.enter();
        let query = RecommendationQuery::new(self.repo.as_ref());
        Ok(query.get_filter_options(process_id)?)
    }

    pub fn create_shortlist(&self, process_id: &str, name: &str, author_ids: Vec<Id>) -> CoreResult<Shortlist> {
        let span = tracing::info_span!("create_shortlist", process_id, name);
        let _enter = span.enter();
        Ok(self.repo.create_shortlist(process_id, name, author_ids)?)
    }
}

/// Convenience constructor for a new [`Process`] in the `Upload` step,
/// `Created` status, with empty manuscript metadata — the shape every
/// process starts in before metadata extraction populates it.
pub fn new_process(id: impl Into<Id>, owner_id: impl Into<Id>, title: impl Into<String>) -> Process {
    let now = SystemTime::now();
    Process {
        id: id.into(),
        owner_id: owner_id.into(),
        title: title.into(),
        step: ProcessStep::Upload,
        status: ProcessStatus::Created,
        metadata: ManuscriptMetadata::default(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_to_end_search_validate_recommend() {
        let repo: Arc<dyn RepositoryPort> = Arc::new(InMemoryRepository::new());
        repo.create_process(new_process("p1", "owner-1", "Test manuscript")).unwrap();

        let mut config = Config::default();
        config.enabled_databases = vec![];
        let core = ReviewerCore::new(config, repo.clone());

        let mut manuscript = ManuscriptMetadata::default();
        manuscript.authors.push(Author::new("manuscript-author-1", "Someone Else"));

        let mut candidate_author = Author::new("auth-1", "Jane Smith");
        candidate_author.publication_count = 10;
        repo.upsert_candidate(Candidate {
            process_id: "p1".to_string(),
            author: candidate_author,
            role: CandidateRole::Candidate,
            validation: None,
        })
        .unwrap();

        let result = core
            .validate_process_authors("p1", &manuscript, &ValidationConfig::default())
            .unwrap();
        assert_eq!(result.validated_candidates, 1);

        let response = core
            .get_recommendations("p1", Filters::default(), None, 1, 10)
            .unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.page.len(), 1);

        let shortlist = core.create_shortlist("p1", "Finalists", vec!["auth-1".to_string()]).unwrap();
        assert_eq!(shortlist.reviewer_count(), 1);
    }
}
