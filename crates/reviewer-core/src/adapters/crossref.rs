//! Crossref-backed adapters. Crossref's `works` endpoint, filtered by
//! publisher member id, stands in for the Wiley and Taylor & Francis sources
//! (§6): `member=311` is Wiley, `member=301` is Taylor & Francis. Query
//! construction and response parsing mirror this workspace's existing
//! CrossRef backend.

use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::{AdapterResult, DatabaseAdapter, SearchOpts, synthesize_candidate_id};
use crate::errors::AdapterError;
use crate::model::{Author, Candidate, CandidateRole, SearchTerms};
use crate::text_utils::get_query_words;

pub const WILEY_MEMBER_ID: &str = "311";
pub const TAYLOR_FRANCIS_MEMBER_ID: &str = "301";

pub struct CrossRefMember {
    source_name: &'static str,
    member_id: &'static str,
    pub mailto: Option<String>,
}

impl CrossRefMember {
    pub fn wiley(mailto: Option<String>) -> Self {
        Self {
            source_name: "Wiley",
            member_id: WILEY_MEMBER_ID,
            mailto,
        }
    }

    pub fn taylor_francis(mailto: Option<String>) -> Self {
        Self {
            source_name: "Taylor & Francis",
            member_id: TAYLOR_FRANCIS_MEMBER_ID,
            mailto,
        }
    }

    fn query_string(&self, terms: &SearchTerms) -> String {
        if let Some(q) = terms.boolean_queries.get(self.source_name) {
            return q.clone();
        }
        if terms.keywords.is_empty() {
            return String::new();
        }
        let words = get_query_words(&terms.keywords.iter().cloned().collect::<Vec<_>>().join(" "), 6);
        words.join(" ")
    }

    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("ScholarlyReviewerRecommender/1.0 (mailto:{email})"),
            None => "Scholarly Reviewer Recommender (reviewer-core)".to_string(),
        }
    }

    async fn fetch_works(
        &self,
        client: &reqwest::Client,
        query: &str,
        rows: u32,
        timeout: Duration,
    ) -> Result<serde_json::Value, AdapterError> {
        let mut url = format!(
            "https://api.crossref.org/works?query.bibliographic={}&filter=member:{}&rows={}",
            urlencoding::encode(query),
            self.member_id,
            rows.min(1000),
        );
        if let Some(ref email) = self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }

        let resp = client
            .get(&url)
            .header("User-Agent", self.user_agent())
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

    fn candidates_from_items(&self, items: &[serde_json::Value]) -> Vec<Candidate> {
        let mut by_name: HashMap<String, Author> = HashMap::new();

        for item in items {
            let authors = item["author"].as_array().cloned().unwrap_or_default();
            let doi = item["DOI"].as_str().unwrap_or("");
            for a in &authors {
                let given = a["given"].as_str().unwrap_or("");
                let family = a["family"].as_str().unwrap_or("");
                let full_name = format!("{given} {family}").trim().to_string();
                if full_name.is_empty() {
                    continue;
                }
                let key = full_name.to_lowercase();
                let entry = by_name.entry(key).or_insert_with(|| {
                    let id = synthesize_candidate_id(self.source_name, &full_name, doi);
                    let mut author = Author::new(id, full_name.clone());
                    if let Some(affs) = a["affiliation"].as_array() {
                        for aff in affs {
                            if let Some(name) = aff["name"].as_str() {
                                author.affiliations.push(crate::model::Affiliation {
                                    id: crate::adapters::synthesize_affiliation_id(name),
                                    institution_name: name.to_string(),
                                    department: None,
                                    address: None,
                                    country: None,
                                });
                            }
                        }
                    }
                    author
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

impl DatabaseAdapter for CrossRefMember {
    fn name(&self) -> &str {
        self.source_name
    }

    fn min_request_interval(&self) -> Duration {
        if self.mailto.is_some() {
            Duration::from_millis(333)
        } else {
            Duration::from_millis(1000)
        }
    }

    fn hard_result_ceiling(&self) -> u32 {
        1000
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
            let rows = opts.max_results.min(self.hard_result_ceiling());
            let data = self.fetch_works(client, &query, rows, timeout).await?;
            let items = data["message"]["items"].as_array().cloned().unwrap_or_default();
            let total_results = data["message"]["total-results"].as_u64().unwrap_or(0) as u32;
            let candidates = self.candidates_from_items(&items);
            Ok(AdapterResult {
                source: self.name().to_string(),
                total_found: candidates.len() as u32,
                has_more: total_results > rows,
                next_offset: if total_results > rows { Some(rows) } else { None },
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
            let mut url = format!(
                "https://api.crossref.org/works?query.author={}&filter=member:{}&rows={}",
                urlencoding::encode(name),
                self.member_id,
                opts.max_results.min(self.hard_result_ceiling()),
            );
            if let Some(ref email) = self.mailto {
                url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
            }
            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| AdapterError::Network(e.to_string()))?;
            if resp.status().as_u16() == 429 {
                return Err(AdapterError::RateLimited { retry_after: None });
            }
            if !resp.status().is_success() {
                return Err(AdapterError::UpstreamClient(resp.status().as_u16()));
            }
            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| AdapterError::Parse(e.to_string()))?;
            let items = data["message"]["items"].as_array().cloned().unwrap_or_default();
            Ok(self.candidates_from_items(&items))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiley_uses_member_311() {
        let wiley = CrossRefMember::wiley(None);
        assert_eq!(wiley.member_id, WILEY_MEMBER_ID);
        assert_eq!(wiley.name(), "Wiley");
    }

    #[test]
    fn taylor_francis_uses_member_301() {
        let tf = CrossRefMember::taylor_francis(None);
        assert_eq!(tf.member_id, TAYLOR_FRANCIS_MEMBER_ID);
    }

    #[test]
    fn mailto_speeds_up_rate() {
        let without = CrossRefMember::wiley(None);
        let with = CrossRefMember::wiley(Some("me@example.com".to_string()));
        assert!(with.min_request_interval() < without.min_request_interval());
    }

    #[test]
    fn candidates_aggregate_within_response_and_union_affiliations() {
        let wiley = CrossRefMember::wiley(None);
        let items = vec![serde_json::json!({
            "DOI": "10.1/abc",
            "author": [
                {"given": "Jane", "family": "Smith", "affiliation": [{"name": "Test University"}]},
            ]
        })];
        let candidates = wiley.candidates_from_items(&items);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].author.affiliations.len(), 1);
    }

    #[test]
    fn empty_query_short_circuits() {
        let wiley = CrossRefMember::wiley(None);
        let terms = SearchTerms::default();
        assert_eq!(wiley.query_string(&terms), "");
    }
}
