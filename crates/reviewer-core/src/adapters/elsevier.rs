//! Elsevier Scopus search adapter. This workspace has no existing Scopus
//! backend to draw on directly; query construction and response handling
//! follow the same shape as [`crate::adapters::crossref`]'s header and
//! status-classification idiom, adapted to Scopus's `TITLE-ABS-KEY` /
//! `AFFIL` field syntax and its required API-key header.

use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::{AdapterResult, DatabaseAdapter, SearchOpts, synthesize_candidate_id};
use crate::errors::AdapterError;
use crate::model::{Author, Candidate, CandidateRole, SearchTerms};
use crate::text_utils::get_query_words;

/// Elsevier requires an API key to be instantiable at all (§6); there is no
/// anonymous query path.
pub struct Elsevier {
    pub api_key: String,
}

impl Elsevier {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }

    fn query_string(&self, terms: &SearchTerms) -> String {
        if let Some(q) = terms.boolean_queries.get("Elsevier") {
            return q.clone();
        }
        if terms.keywords.is_empty() {
            return String::new();
        }
        let words = get_query_words(&terms.keywords.iter().cloned().collect::<Vec<_>>().join(" "), 6);
        if words.is_empty() {
            return String::new();
        }
        format!("TITLE-ABS-KEY({})", words.join(" AND "))
    }

    async fn fetch(
        &self,
        client: &reqwest::Client,
        query: &str,
        count: u32,
        start: u32,
        timeout: Duration,
    ) -> Result<serde_json::Value, AdapterError> {
        let url = "https://api.elsevier.com/content/search/scopus";
        let count_str = count.to_string();
        let start_str = start.to_string();

        let resp = client
            .get(url)
            .query(&[("query", query), ("count", count_str.as_str()), ("start", start_str.as_str())])
            .header("X-ELS-APIKey", &self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", "Scholarly Reviewer Recommender (reviewer-core)")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after: None });
        }
        if status.is_server_error() {
            return Err(AdapterError::UpstreamServer(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AdapterError::UpstreamClient(status.as_u16()));
        }

        resp.json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    fn candidates_from_entries(&self, entries: &[serde_json::Value]) -> Vec<Candidate> {
        // Scopus's search-results endpoint returns one entry per document, each
        // with a flattened "creator" (first author only) rather than a full
        // author list; accumulate publicationCount per creator name the same
        // way the PubMed/CrossRef adapters accumulate across articles.
        let mut by_name: HashMap<String, Author> = HashMap::new();

        for entry in entries {
            let Some(creator) = entry["dc:creator"].as_str() else {
                continue;
            };
            let scopus_id = entry["dc:identifier"].as_str().unwrap_or("");
            let key = creator.to_lowercase();
            let entry_author = by_name.entry(key).or_insert_with(|| {
                let id = synthesize_candidate_id("Elsevier", creator, scopus_id);
                let mut author = Author::new(id, creator.to_string());
                if let Some(affil) = entry["affiliation"].as_array().and_then(|a| a.first()) {
                    if let Some(name) = affil["affilname"].as_str() {
                        author.affiliations.push(crate::model::Affiliation {
                            id: crate::adapters::synthesize_affiliation_id(name),
                            institution_name: name.to_string(),
                            department: None,
                            address: None,
                            country: affil["affiliation-country"].as_str().map(String::from),
                        });
                    }
                }
                author
            });
            entry_author.publication_count += 1;
        }

        by_name
            .into_values()
            .map(|author| Candidate {
                process_id: String::new(),
                author,
                role: CandidateRole::Candidate,
                validation: None,
            })
            .collect()
    }
}

impl DatabaseAdapter for Elsevier {
    fn name(&self) -> &str {
        "Elsevier"
    }

    fn min_request_interval(&self) -> Duration {
        Duration::from_millis(1000)
    }

    fn hard_result_ceiling(&self) -> u32 {
        200
    }

    fn search_authors<'a>(
        &'a self,
        terms: &'a SearchTerms,
        opts: &'a SearchOpts,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<AdapterResult, AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let query = self.query_string(terms);
            if query.is_empty() {
                return Ok(AdapterResult {
                    source: self.name().to_string(),
                    candidates: Vec::new(),
                    total_found: 0,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    has_more: false,
                    next_offset: None,
                });
            }
            let count = opts.max_results.min(self.hard_result_ceiling());
            let data = self.fetch(client, &query, count, opts.offset, timeout).await?;
            let entries = data["search-results"]["entry"].as_array().cloned().unwrap_or_default();
            let total_results: u32 = data["search-results"]["opensearch:totalResults"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let candidates = self.candidates_from_entries(&entries);
            Ok(AdapterResult {
                source: self.name().to_string(),
                total_found: candidates.len() as u32,
                has_more: total_results > opts.offset + count,
                next_offset: if total_results > opts.offset + count {
                    Some(opts.offset + count)
                } else {
                    None
                },
                candidates,
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        })
    }

    fn search_by_name<'a>(
        &'a self,
        name: &'a str,
        opts: &'a SearchOpts,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Candidate>, AdapterError>> + Send + 'a>> {
        Box::pin(async move {
            let query = format!("AUTHOR-NAME({name})");
            let count = opts.max_results.min(self.hard_result_ceiling());
            let data = self.fetch(client, &query, count, opts.offset, timeout).await?;
            let entries = data["search-results"]["entry"].as_array().cloned().unwrap_or_default();
            Ok(self.candidates_from_entries(&entries))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_wraps_title_abs_key() {
        let elsevier = Elsevier::new("key".to_string());
        let mut terms = SearchTerms::default();
        terms.keywords.insert("oncology".to_string());
        let q = elsevier.query_string(&terms);
        assert!(q.starts_with("TITLE-ABS-KEY("));
    }

    #[test]
    fn query_string_prefers_caller_supplied() {
        let elsevier = Elsevier::new("key".to_string());
        let mut terms = SearchTerms::default();
        terms
            .boolean_queries
            .insert("Elsevier".to_string(), "AFFIL(mit)".to_string());
        assert_eq!(elsevier.query_string(&terms), "AFFIL(mit)");
    }

    #[test]
    fn empty_terms_yield_empty_query() {
        let elsevier = Elsevier::new("key".to_string());
        assert_eq!(elsevier.query_string(&SearchTerms::default()), "");
    }

    #[test]
    fn hard_ceiling_is_200() {
        let elsevier = Elsevier::new("key".to_string());
        assert_eq!(elsevier.hard_result_ceiling(), 200);
    }

    #[test]
    fn candidates_aggregate_by_creator_name() {
        let elsevier = Elsevier::new("key".to_string());
        let entries = vec![
            serde_json::json!({"dc:creator": "Smith J.", "dc:identifier": "SCOPUS_ID:1"}),
            serde_json::json!({"dc:creator": "Smith J.", "dc:identifier": "SCOPUS_ID:2"}),
        ];
        let candidates = elsevier.candidates_from_entries(&entries);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].author.publication_count, 2);
    }
}
