//! Federated search orchestrator (§4.3): fans out one task per enabled
//! adapter, tracks per-adapter progress in a process-keyed status map, and
//! tolerates partial failure. Grounded in this workspace's
//! `orchestrator.rs::query_all_databases` (the spawn-one-task-per-database,
//! `JoinSet`-driven fan-out) generalised from "first verified match wins" to
//! "wait for every adapter to settle, keep everything it found" — this
//! system always needs the full candidate set, not an early exit.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapters::{DatabaseAdapter, SearchOpts};
use crate::aggregator::{Aggregator, dedup_by_name};
use crate::errors::CoreError;
use crate::model::{AdapterProgress, AdapterState, Candidate, CandidateRole, Id, SearchState, SearchStatus, SearchTerms};
use crate::repository::RepositoryPort;
use crate::resilience::ResilienceLayer;

/// One adapter plus the resilience wrapper it is always called through.
struct AdapterEntry {
    adapter: Arc<dyn DatabaseAdapter>,
    resilience: Arc<ResilienceLayer>,
}

pub struct SearchOrchestrator {
    adapters: Vec<AdapterEntry>,
    repo: Arc<dyn RepositoryPort>,
    aggregator: Arc<Aggregator>,
    client: reqwest::Client,
    max_results_per_database: u32,
    search_timeout: Duration,
    statuses: DashMap<Id, Arc<AsyncMutex<SearchStatus>>>,
    cancellations: DashMap<Id, CancellationToken>,
}

impl SearchOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn DatabaseAdapter>>,
        resilience_config: crate::model::ResilienceConfig,
        repo: Arc<dyn RepositoryPort>,
        max_results_per_database: u32,
        search_timeout: Duration,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| {
                let resilience = Arc::new(ResilienceLayer::new(
                    adapter.name().to_string(),
                    adapter.min_request_interval(),
                    resilience_config.clone(),
                ));
                AdapterEntry { adapter, resilience }
            })
            .collect();
        Self {
            adapters,
            repo,
            aggregator: Arc::new(Aggregator::new()),
            client: reqwest::Client::new(),
            max_results_per_database,
            search_timeout,
            statuses: DashMap::new(),
            cancellations: DashMap::new(),
        }
    }

    /// Enqueues one task per enabled adapter and returns immediately after
    /// initialising `SearchStatus` to SEARCHING. `enabled` names the adapters
    /// (by [`DatabaseAdapter::name`]) this search should dispatch to; `None`
    /// dispatches to every adapter the orchestrator was constructed with.
    pub async fn start_search(&self, process_id: &str, terms: SearchTerms, enabled: Option<&[String]>) {
        let span = tracing::info_span!("start_search", process_id = %process_id);
        let _enter = span.enter();

        let entries: Vec<&AdapterEntry> = self
            .adapters
            .iter()
            .filter(|e| enabled.is_none_or(|names| names.iter().any(|n| n == e.adapter.name())))
            .collect();

        let mut status = SearchStatus::new(process_id);
        status.state = SearchState::Searching;
        status.start_time = Some(SystemTime::now());
        for entry in &entries {
            status
                .per_database
                .insert(entry.adapter.name().to_string(), AdapterProgress::default());
        }
        let status = Arc::new(AsyncMutex::new(status));
        self.statuses.insert(process_id.to_string(), status.clone());

        let cancel = CancellationToken::new();
        self.cancellations.insert(process_id.to_string(), cancel.clone());

        let process_id = process_id.to_string();
        let opts = SearchOpts {
            max_results: self.max_results_per_database,
            ..SearchOpts::default()
        };
        let timeout = self.search_timeout;
        let repo = self.repo.clone();
        let aggregator = self.aggregator.clone();
        let client = self.client.clone();

        let entry_handles: Vec<(Arc<dyn DatabaseAdapter>, Arc<ResilienceLayer>)> = entries
            .into_iter()
            .map(|e| (e.adapter.clone(), e.resilience.clone()))
            .collect();

        tokio::spawn(async move {
            let mut join_set = JoinSet::new();
            for (adapter, resilience) in entry_handles {
                let terms = terms.clone();
                let opts = opts.clone();
                let client = client.clone();
                let cancel = cancel.clone();
                let status = status.clone();
                let repo = repo.clone();
                let aggregator = aggregator.clone();
                let process_id = process_id.clone();

                join_set.spawn(async move {
                    let name = adapter.name().to_string();
                    {
                        let mut s = status.lock().await;
                        if let Some(slot) = s.per_database.get_mut(&name) {
                            slot.state = AdapterState::Running;
                            slot.start_time = Some(SystemTime::now());
                        }
                    }

                    let run = resilience.execute(|| adapter.search_authors(&terms, &opts, &client, timeout));
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = tokio::time::timeout(timeout, run) => Some(result),
                    };

                    let Some(outcome) = outcome else {
                        // Cancelled: do not mutate the status entry at all.
                        return;
                    };

                    let mut s = status.lock().await;
                    let Some(slot) = s.per_database.get_mut(&name) else {
                        return;
                    };
                    match outcome {
                        Err(_elapsed) => {
                            slot.state = AdapterState::Error;
                            slot.error = Some("timeout".to_string());
                            slot.end_time = Some(SystemTime::now());
                        }
                        Ok(Err(core_err)) => {
                            slot.state = AdapterState::Error;
                            slot.error = Some(core_err.to_string());
                            slot.end_time = Some(SystemTime::now());
                            tracing::warn!(adapter = %name, error = %core_err, "adapter search failed");
                        }
                        Ok(Ok(result)) => {
                            drop(s);
                            let authors: Vec<_> = result.candidates.into_iter().map(|c| c.author).collect();
                            let found = authors.len() as u32;
                            let merge_result = aggregator.merge(repo.as_ref(), &process_id, authors);
                            let mut s = status.lock().await;
                            if let Some(slot) = s.per_database.get_mut(&name) {
                                match merge_result {
                                    Ok(_) => {
                                        slot.state = AdapterState::Completed;
                                        slot.percent = 100;
                                        slot.authors_found = found;
                                    }
                                    Err(e) => {
                                        slot.state = AdapterState::Error;
                                        slot.error = Some(e.to_string());
                                    }
                                }
                                slot.end_time = Some(SystemTime::now());
                            }
                            s.total_authors_found += found;
                        }
                    }
                });
            }

            while join_set.join_next().await.is_some() {}

            let mut s = status.lock().await;
            if !cancel.is_cancelled() {
                s.state = SearchState::Completed;
                s.end_time = Some(SystemTime::now());
            }
        });
    }

    pub async fn get_status(&self, process_id: &str) -> Option<SearchStatus> {
        let entry = self.statuses.get(process_id)?;
        let status = entry.value().clone();
        drop(entry);
        Some(status.lock().await.clone())
    }

    /// Cancels any in-flight search for `process_id` and drops its status
    /// entry. In-flight adapter tasks observe cancellation at their next
    /// suspension point and exit without writing to the status map.
    pub fn clear_status(&self, process_id: &str) {
        if let Some((_, token)) = self.cancellations.remove(process_id) {
            token.cancel();
        }
        self.statuses.remove(process_id);
    }

    /// Synchronous manual search across the named adapters (or all
    /// adapters if `None`), deduplicated by case-folded name with the
    /// highest-publicationCount record winning ties (§4.3).
    pub async fn search_by_name(&self, name: &str, adapters: Option<&[String]>) -> Vec<Candidate> {
        let entries: Vec<&AdapterEntry> = self
            .adapters
            .iter()
            .filter(|e| adapters.is_none_or(|names| names.iter().any(|n| n == e.adapter.name())))
            .collect();

        let opts = SearchOpts {
            max_results: self.max_results_per_database,
            ..SearchOpts::default()
        };
        let mut join_set = JoinSet::new();
        for entry in entries {
            let adapter = entry.adapter.clone();
            let resilience = entry.resilience.clone();
            let name = name.to_string();
            let client = self.client.clone();
            let opts = opts.clone();
            let timeout = self.search_timeout;
            join_set.spawn(async move {
                resilience
                    .execute(|| adapter.search_by_name(&name, &opts, &client, timeout))
                    .await
            });
        }

        let mut all = Vec::new();
        while let Some(result) = join_set.join_next().await {
            if let Ok(Ok(candidates)) = result {
                all.extend(candidates);
            }
        }
        dedup_by_name(all)
    }
}

/// Synthesize `Author.id -> count` groupings (§4.3 partial-failure scenario
/// helper): the number of adapters currently in a terminal state vs total.
pub fn terminal_counts(status: &SearchStatus) -> (usize, usize) {
    let total = status.per_database.len();
    let terminal = status
        .per_database
        .values()
        .filter(|p| matches!(p.state, AdapterState::Completed | AdapterState::Error))
        .count();
    (terminal, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockAdapter, MockResponse};
    use crate::errors::AdapterError;
    use crate::model::{Author, ResilienceConfig};
    use crate::repository::InMemoryRepository;

    fn candidate(id: &str, name: &str) -> Candidate {
        Candidate {
            process_id: String::new(),
            author: Author::new(id, name),
            role: CandidateRole::Candidate,
            validation: None,
        }
    }

    fn orchestrator_with(adapters: Vec<Arc<dyn DatabaseAdapter>>) -> SearchOrchestrator {
        SearchOrchestrator::new(
            adapters,
            ResilienceConfig {
                max_attempts: 1,
                ..ResilienceConfig::default()
            },
            Arc::new(InMemoryRepository::new()),
            100,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn partial_failure_search_completes_with_error_recorded() {
        let pubmed = Arc::new(MockAdapter::new(
            "PUBMED",
            MockResponse::Error(AdapterError::UpstreamClient(500)),
        ));
        let elsevier = Arc::new(MockAdapter::new(
            "ELSEVIER",
            MockResponse::Found(vec![candidate("e1", "Jane Smith")]),
        ));
        let wiley = Arc::new(MockAdapter::new(
            "WILEY",
            MockResponse::Found(vec![candidate("w1", "John Doe")]),
        ));
        let orchestrator: SearchOrchestrator = orchestrator_with(vec![pubmed, elsevier, wiley]);

        orchestrator.start_search("p1", SearchTerms::default(), None).await;

        let mut status = orchestrator.get_status("p1").await;
        for _ in 0..50 {
            if let Some(ref s) = status {
                if s.state == SearchState::Completed {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = orchestrator.get_status("p1").await;
        }
        let status = status.expect("status present");
        assert_eq!(status.state, SearchState::Completed);
        assert_eq!(status.total_authors_found, 2);
        assert_eq!(status.per_database["PUBMED"].state, AdapterState::Error);
        assert_eq!(status.per_database["ELSEVIER"].state, AdapterState::Completed);
        assert_eq!(status.per_database["WILEY"].state, AdapterState::Completed);
    }

    #[tokio::test]
    async fn search_by_name_dedups_highest_publication_count_wins() {
        let mut a = candidate("src-a", "Jane Smith");
        a.author.publication_count = 10;
        let mut b = candidate("src-b", "Jane Smith");
        b.author.publication_count = 5;
        let source_a = Arc::new(MockAdapter::new("A", MockResponse::Found(vec![a])));
        let source_b = Arc::new(MockAdapter::new("B", MockResponse::Found(vec![b])));
        let orchestrator = orchestrator_with(vec![source_a, source_b]);

        let results = orchestrator.search_by_name("Jane Smith", None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].author.publication_count, 10);
    }

    #[tokio::test]
    async fn clear_status_cancels_in_flight_search() {
        let slow = Arc::new(
            MockAdapter::new("SLOW", MockResponse::Found(Vec::new())).with_min_interval(Duration::from_millis(0)),
        );
        let orchestrator = orchestrator_with(vec![slow]);
        orchestrator.start_search("p2", SearchTerms::default(), None).await;
        orchestrator.clear_status("p2");
        assert!(orchestrator.get_status("p2").await.is_none());
    }
}
