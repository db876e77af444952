//! PubMed E-utilities adapter: a two-step `esearch` (find matching PMIDs)
//! plus `esummary` (fetch author lists) query, as this workspace's existing
//! PubMed backend already does for single-title verification — generalised
//! here to author search over a whole query instead of a single-title match.

use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::{AdapterResult, DatabaseAdapter, SearchOpts, synthesize_candidate_id};
use crate::errors::AdapterError;
use crate::model::{Author, Candidate, CandidateRole, SearchTerms};
use crate::text_utils::get_query_words;

pub struct PubMed {
    pub api_key: Option<String>,
    pub mailto: Option<String>,
}

impl PubMed {
    pub fn new(api_key: Option<String>, mailto: Option<String>) -> Self {
        Self { api_key, mailto }
    }

    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("ScholarlyReviewerRecommender/1.0 (mailto:{email})"),
            None => "Scholarly Reviewer Recommender (reviewer-core)".to_string(),
        }
    }

    fn boolean_query(&self, terms: &SearchTerms) -> String {
        if let Some(q) = terms.boolean_queries.get("PubMed") {
            return q.clone();
        }
        if terms.keywords.is_empty() {
            return String::new();
        }
        let words = get_query_words(&terms.keywords.iter().cloned().collect::<Vec<_>>().join(" "), 6);
        words
            .iter()
            .map(|w| format!("{w}[Title/Abstract]"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    async fn esearch(
        &self,
        client: &reqwest::Client,
        term: &str,
        retmax: u32,
        timeout: Duration,
    ) -> Result<Vec<String>, AdapterError> {
        let url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
        let retmax_str = retmax.to_string();
        let mut query = vec![
            ("db", "pubmed"),
            ("term", term),
            ("retmode", "json"),
            ("retmax", retmax_str.as_str()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.as_str()));
        }
        if let Some(email) = &self.mailto {
            query.push(("email", email.as_str()));
        }

        let resp = client
            .get(url)
            .query(&query)
            .header("User-Agent", self.user_agent())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        classify_status(resp.status())?;

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        Ok(data["esearchresult"]["idlist"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn esummary(
        &self,
        client: &reqwest::Client,
        ids: &[String],
        timeout: Duration,
    ) -> Result<serde_json::Value, AdapterError> {
        let url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";
        let joined = ids.join(",");
        let mut query = vec![("db", "pubmed"), ("id", joined.as_str()), ("retmode", "json")];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.as_str()));
        }
        if let Some(email) = &self.mailto {
            query.push(("email", email.as_str()));
        }

        let resp = client
            .get(url)
            .query(&query)
            .header("User-Agent", self.user_agent())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        classify_status(resp.status())?;

        resp.json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    fn candidates_from_summaries(&self, ids: &[String], data: &serde_json::Value) -> Vec<Candidate> {
        // Aggregate within this single response: same author name appearing
        // across multiple returned articles accumulates publicationCount.
        let mut by_name: HashMap<String, Author> = HashMap::new();
        let results = &data["result"];

        for pmid in ids {
            let item = &results[pmid];
            let authors = item["authors"].as_array().cloned().unwrap_or_default();
            for a in &authors {
                let Some(full_name) = a["name"].as_str() else {
                    continue;
                };
                let key = full_name.to_lowercase();
                let entry = by_name.entry(key).or_insert_with(|| {
                    let id = synthesize_candidate_id("PubMed", full_name, pmid);
                    Author::new(id, full_name.to_string())
                });
                entry.publication_count += 1;
            }
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

fn classify_status(status: reqwest::StatusCode) -> Result<(), AdapterError> {
    if status.as_u16() == 429 {
        return Err(AdapterError::RateLimited { retry_after: None });
    }
    if status.is_server_error() {
        return Err(AdapterError::UpstreamServer(status.as_u16()));
    }
    if !status.is_success() {
        return Err(AdapterError::UpstreamClient(status.as_u16()));
    }
    Ok(())
}

impl DatabaseAdapter for PubMed {
    fn name(&self) -> &str {
        "PubMed"
    }

    fn min_request_interval(&self) -> Duration {
        if self.api_key.is_some() {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(334)
        }
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
            let term = self.boolean_query(terms);
            if term.is_empty() {
                return Ok(AdapterResult {
                    source: self.name().to_string(),
                    candidates: Vec::new(),
                    total_found: 0,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    has_more: false,
                    next_offset: None,
                });
            }
            let ids = self.esearch(client, &term, opts.max_results, timeout).await?;
            if ids.is_empty() {
                return Ok(AdapterResult {
                    source: self.name().to_string(),
                    candidates: Vec::new(),
                    total_found: 0,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    has_more: false,
                    next_offset: None,
                });
            }
            let data = self.esummary(client, &ids, timeout).await?;
            let candidates = self.candidates_from_summaries(&ids, &data);
            Ok(AdapterResult {
                source: self.name().to_string(),
                total_found: candidates.len() as u32,
                candidates,
                elapsed_ms: start.elapsed().as_millis() as u64,
                has_more: false,
                next_offset: None,
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
            let term = format!("{name}[Author]");
            let ids = self.esearch(client, &term, opts.max_results, timeout).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let data = self.esummary(client, &ids, timeout).await?;
            Ok(self.candidates_from_summaries(&ids, &data))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_query_prefers_caller_supplied() {
        let pubmed = PubMed::new(None, None);
        let mut terms = SearchTerms::default();
        terms
            .boolean_queries
            .insert("PubMed".to_string(), "custom[Title]".to_string());
        assert_eq!(pubmed.boolean_query(&terms), "custom[Title]");
    }

    #[test]
    fn boolean_query_synthesizes_from_keywords() {
        let pubmed = PubMed::new(None, None);
        let mut terms = SearchTerms::default();
        terms.keywords.insert("neural networks".to_string());
        let query = pubmed.boolean_query(&terms);
        assert!(query.contains("[Title/Abstract]"));
    }

    #[test]
    fn empty_terms_yield_empty_query() {
        let pubmed = PubMed::new(None, None);
        let terms = SearchTerms::default();
        assert_eq!(pubmed.boolean_query(&terms), "");
    }

    #[test]
    fn aggregates_author_publication_count_across_articles() {
        let pubmed = PubMed::new(None, None);
        let data = serde_json::json!({
            "result": {
                "1": { "authors": [{"name": "Smith JA"}, {"name": "Doe J"}] },
                "2": { "authors": [{"name": "Smith JA"}] },
            }
        });
        let candidates = pubmed.candidates_from_summaries(&["1".to_string(), "2".to_string()], &data);
        let smith = candidates
            .iter()
            .find(|c| c.author.name == "Smith JA")
            .expect("Smith JA present");
        assert_eq!(smith.author.publication_count, 2);
    }

    #[test]
    fn min_request_interval_faster_with_api_key() {
        let without = PubMed::new(None, None);
        let with = PubMed::new(Some("key".to_string()), None);
        assert!(with.min_request_interval() < without.min_request_interval());
    }

    #[test]
    fn user_agent_embeds_mailto_when_present() {
        let without = PubMed::new(None, None);
        assert_eq!(without.user_agent(), "Scholarly Reviewer Recommender (reviewer-core)");
        let with = PubMed::new(None, Some("me@example.com".to_string()));
        assert_eq!(with.user_agent(), "ScholarlyReviewerRecommender/1.0 (mailto:me@example.com)");
    }
}
