//! Scriptable test-double adapter. Grounded in this workspace's existing
//! `MockDb`/`MockResponse` double: a fixed or sequenced response, optional
//! simulated latency, and a call counter, generalised from a single-title
//! lookup to the full `DatabaseAdapter` contract.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::adapters::{AdapterResult, DatabaseAdapter, SearchOpts};
use crate::errors::AdapterError;
use crate::model::Candidate;

#[derive(Clone)]
pub enum MockResponse {
    Found(Vec<Candidate>),
    Error(AdapterError),
}

pub struct MockAdapter {
    name: &'static str,
    min_interval: Duration,
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    call_count: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &'static str, response: MockResponse) -> Self {
        Self {
            name,
            min_interval: Duration::from_millis(0),
            responses: Mutex::new(Vec::new()),
            fallback: response,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_sequence(name: &'static str, mut responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "sequence must have at least one response");
        responses.reverse();
        let fallback = responses.first().cloned().expect("non-empty sequence");
        Self {
            name,
            min_interval: Duration::from_millis(0),
            responses: Mutex::new(responses),
            fallback,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        let mut seq = self.responses.lock().expect("mock responses mutex poisoned");
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl DatabaseAdapter for MockAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn min_request_interval(&self) -> Duration {
        self.min_interval
    }

    fn search_authors<'a>(
        &'a self,
        _terms: &'a crate::model::SearchTerms,
        _opts: &'a SearchOpts,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<AdapterResult, AdapterError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        Box::pin(async move {
            match response {
                MockResponse::Found(candidates) => Ok(AdapterResult {
                    source: self.name().to_string(),
                    total_found: candidates.len() as u32,
                    candidates,
                    elapsed_ms: 0,
                    has_more: false,
                    next_offset: None,
                }),
                MockResponse::Error(e) => Err(e),
            }
        })
    }

    fn search_by_name<'a>(
        &'a self,
        _name: &'a str,
        _opts: &'a SearchOpts,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Candidate>, AdapterError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        Box::pin(async move {
            match response {
                MockResponse::Found(candidates) => Ok(candidates),
                MockResponse::Error(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_response_repeats() {
        let mock = MockAdapter::new("Mock", MockResponse::Found(Vec::new()));
        let terms = crate::model::SearchTerms::default();
        let opts = SearchOpts::default();
        let client = reqwest::Client::new();
        mock.search_authors(&terms, &opts, &client, Duration::from_secs(1))
            .await
            .unwrap();
        mock.search_authors(&terms, &opts, &client, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn sequence_exhausts_to_last() {
        let mock = MockAdapter::with_sequence(
            "Mock",
            vec![
                MockResponse::Error(AdapterError::Network("boom".into())),
                MockResponse::Found(Vec::new()),
            ],
        );
        let terms = crate::model::SearchTerms::default();
        let opts = SearchOpts::default();
        let client = reqwest::Client::new();
        let first = mock.search_authors(&terms, &opts, &client, Duration::from_secs(1)).await;
        assert!(first.is_err());
        let second = mock.search_authors(&terms, &opts, &client, Duration::from_secs(1)).await;
        assert!(second.is_ok());
        // sequence exhausted: repeats the last entry, not the first
        let third = mock.search_authors(&terms, &opts, &client, Duration::from_secs(1)).await;
        assert!(third.is_ok());
    }
}
