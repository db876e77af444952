//! `DatabaseAdapter` contract (§4.1) and the concrete per-source adapters.

pub mod crossref;
pub mod elsevier;
pub mod pubmed;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::AdapterError;
use crate::model::{Candidate, SearchTerms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortHint {
    Relevance,
    Date,
    Citations,
}

#[derive(Debug, Clone)]
pub struct SearchOpts {
    pub max_results: u32,
    pub offset: u32,
    pub date_from: Option<i32>,
    pub date_to: Option<i32>,
    pub sort_hint: SortHint,
}

impl Default for SearchOpts {
    fn default() -> Self {
        Self {
            max_results: 100,
            offset: 0,
            date_from: None,
            date_to: None,
            sort_hint: SortHint::Relevance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub source: String,
    pub candidates: Vec<Candidate>,
    pub total_found: u32,
    pub elapsed_ms: u64,
    pub has_more: bool,
    pub next_offset: Option<u32>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AdapterError>> + Send + 'a>>;

/// Contract every per-source adapter implements. Adapters are responsible for
/// query construction (preferring a caller-supplied boolean query),
/// HTTP I/O, response parsing and normalisation into [`Candidate`] records
/// with stable synthetic ids — but NOT for rate limiting or retrying, which
/// is the [`crate::resilience::ResilienceLayer`]'s job.
pub trait DatabaseAdapter: Send + Sync {
    /// The canonical source identifier (e.g. "PubMed", "Elsevier").
    fn name(&self) -> &str;

    /// Minimum inter-request delay this adapter is entitled to (enforced by
    /// the resilience layer's rate limiter, not by the adapter itself).
    fn min_request_interval(&self) -> Duration;

    /// Per-source hard ceiling on `max_results`, independent of the caller's
    /// configured `maxResultsPerDatabase`.
    fn hard_result_ceiling(&self) -> u32 {
        u32::MAX
    }

    fn search_authors<'a>(
        &'a self,
        terms: &'a SearchTerms,
        opts: &'a SearchOpts,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> BoxFuture<'a, AdapterResult>;

    fn search_by_name<'a>(
        &'a self,
        name: &'a str,
        opts: &'a SearchOpts,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> BoxFuture<'a, Vec<Candidate>>;

    fn search_by_email<'a>(
        &'a self,
        _email: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> BoxFuture<'a, Vec<Candidate>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn get_author_profile<'a>(
        &'a self,
        _id: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> BoxFuture<'a, Option<Candidate>> {
        Box::pin(async { Ok(None) })
    }
}

/// Builds the stable synthetic candidate id `<source>-<base64(name|externalId)[:16]>`.
pub fn synthesize_candidate_id(source: &str, name: &str, external_id: &str) -> String {
    use base64::Engine;
    let raw = format!("{name}|{external_id}");
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes());
    let truncated: String = encoded.chars().take(16).collect();
    format!("{source}-{truncated}")
}

/// Deterministic affiliation id synthesised from an institution name, so the
/// same institution always maps to the same id across adapters and calls.
pub fn synthesize_affiliation_id(institution_name: &str) -> String {
    use base64::Engine;
    let key = institution_name.trim().to_lowercase();
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes());
    let truncated: String = encoded.chars().take(16).collect();
    format!("affil-{truncated}")
}
