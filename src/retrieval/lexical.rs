//! The lexical (BM25-style) index client.
//!
//! `HttpLexicalIndex` talks to an OpenSearch/Elasticsearch-shaped HTTP endpoint: a
//! shared middleware client, a `{base}/{index}/_search` POST, `_source` field
//! projection. `StaticLexicalIndex` is an in-memory implementation of the same
//! contract over a fixed corpus, for tests and for embedding this core without a
//! live search cluster.

use std::borrow::Cow;
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::TrialRankError;
use crate::model::{Sex, TrialDoc};

/// AND-combined filters recognized by `lexical_search`.
#[derive(Debug, Clone, Default)]
pub struct LexicalFilters {
    pub phase: Option<String>,
    pub overall_status: Option<String>,
    pub condition: Option<String>,
    pub country: Option<String>,
    pub patient_age: Option<f64>,
    pub patient_sex: Option<Sex>,
}

/// Per-field weights for the disjunctive multi-field match.
const FIELD_WEIGHTS: &[(&str, u32)] = &[
    ("title", 3),
    ("brief_summary", 2),
    ("detailed_description", 1),
    ("conditions", 4),
    ("conditions_all", 5),
    ("interventions", 1),
    ("criteria_inclusion_clean", 2),
];

/// A page of lexical hits plus the backend's reported total match count, when it
/// reports one. `total_hits` is the index's own count of matches (before
/// `candidate_size` truncation), used to detect when the candidate pool was
/// truncated; `None` when the backend doesn't report a total (e.g. the in-memory
/// `StaticLexicalIndex`, which always returns its full filtered set).
#[derive(Debug, Clone, Default)]
pub struct LexicalSearchResult {
    pub hits: Vec<(TrialDoc, f64)>,
    pub total_hits: Option<usize>,
}

/// Contract for the lexical index: `search(query_text?, filters, candidate_size) ->
/// ordered (TrialDoc, raw_score)` plus the backend's reported total, and the by-id
/// fetch the dense-only fallback needs.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn search(
        &self,
        query_text: Option<&str>,
        filters: &LexicalFilters,
        candidate_size: usize,
    ) -> Result<LexicalSearchResult, TrialRankError>;

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<TrialDoc>, TrialRankError>;
}

/// Score-shaping multipliers, composed multiplicatively over the base lexical
/// score.
fn score_multiplier(doc: &TrialDoc) -> f64 {
    let mut multiplier = 1.0;
    if doc.overall_status.as_deref() == Some("Recruiting") {
        multiplier *= 1.05;
    }
    match doc.phase.as_deref() {
        Some("Phase 3") | Some("Phase 4") => multiplier *= 1.10,
        Some("Phase 2") => multiplier *= 1.05,
        _ => {}
    }
    multiplier
}

fn passes_filters(doc: &TrialDoc, filters: &LexicalFilters) -> bool {
    if let Some(phase) = &filters.phase {
        if doc.phase.as_deref() != Some(phase.as_str()) {
            return false;
        }
    }
    if let Some(status) = &filters.overall_status {
        if doc.overall_status.as_deref() != Some(status.as_str()) {
            return false;
        }
    }
    if let Some(condition) = &filters.condition {
        let condition_lower = condition.to_lowercase();
        let words: Vec<&str> = condition_lower.split_whitespace().collect();
        let matches = doc.conditions.iter().any(|c| {
            let lowered = c.to_lowercase();
            words.iter().all(|w| lowered.contains(w))
        });
        if !matches {
            return false;
        }
    }
    if let Some(country) = &filters.country {
        let matches = doc
            .locations
            .iter()
            .any(|loc| loc.country.as_deref() == Some(country.as_str()));
        if !matches {
            return false;
        }
    }
    if let Some(age) = filters.patient_age {
        let (min, max) = doc.age_bounds();
        if age < min || age > max {
            return false;
        }
    }
    if let Some(sex) = filters.patient_sex {
        let trial_sex = doc.sex_or_default();
        if trial_sex != Sex::All && trial_sex != sex {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Simplified BM25-style scorer over a field's text: counts query-term occurrences,
/// case-insensitively, weighted by field importance.
fn field_score(field_text: &str, terms: &[String], weight: u32) -> f64 {
    if field_text.is_empty() {
        return 0.0;
    }
    let lowered = field_text.to_lowercase();
    let mut hits = 0usize;
    for term in terms {
        hits += lowered.matches(term.as_str()).count();
    }
    if hits == 0 {
        return 0.0;
    }
    // Diminishing returns per extra occurrence, same shape as BM25's term-frequency
    // saturation.
    weight as f64 * (1.0 + (hits as f64).ln())
}

fn base_lexical_score(doc: &TrialDoc, query_text: Option<&str>) -> f64 {
    let Some(query) = query_text else {
        return 1.0;
    };
    let terms: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if terms.is_empty() {
        return 1.0;
    }
    let conditions_joined = doc.conditions.join(" ");
    let fields: &[(&str, Option<&str>)] = &[
        ("title", doc.title.as_deref()),
        ("brief_summary", doc.brief_summary.as_deref()),
        ("detailed_description", doc.detailed_description.as_deref()),
        ("conditions", Some(conditions_joined.as_str())),
        ("conditions_all", Some(conditions_joined.as_str())),
        ("criteria_inclusion_clean", doc.eligibility_criteria_raw.as_deref()),
    ];
    let mut score = 0.0;
    for (name, text) in fields {
        let Some(text) = text else { continue };
        let weight = FIELD_WEIGHTS
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, w)| *w)
            .unwrap_or(1);
        score += field_score(text, &terms, weight);
    }
    score
}

/// In-memory `LexicalIndex` over a fixed corpus, no live search cluster required.
/// Used for tests and for embedding the core without a separately deployed lexical
/// backend.
#[derive(Debug, Clone, Default)]
pub struct StaticLexicalIndex {
    corpus: Vec<TrialDoc>,
}

impl StaticLexicalIndex {
    pub fn new(corpus: Vec<TrialDoc>) -> Self {
        Self { corpus }
    }
}

#[async_trait]
impl LexicalIndex for StaticLexicalIndex {
    async fn search(
        &self,
        query_text: Option<&str>,
        filters: &LexicalFilters,
        candidate_size: usize,
    ) -> Result<LexicalSearchResult, TrialRankError> {
        let mut scored: Vec<(TrialDoc, f64)> = self
            .corpus
            .iter()
            .filter(|doc| passes_filters(doc, filters))
            .map(|doc| {
                let base = base_lexical_score(doc, query_text);
                let shaped = base * score_multiplier(doc);
                (doc.clone(), shaped)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let total_hits = Some(scored.len());
        scored.truncate(candidate_size);
        Ok(LexicalSearchResult {
            hits: scored,
            total_hits,
        })
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<TrialDoc>, TrialRankError> {
        Ok(self
            .corpus
            .iter()
            .filter(|doc| ids.contains(&doc.nct_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

const LEXICAL_API: &str = "lexical-index";
const HTTP_USER_AGENT: &str = concat!("trialrank-core/", env!("CARGO_PKG_VERSION"));

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

/// Returns a shared HTTP client with retry and on-disk caching middleware.
fn shared_client() -> Result<ClientWithMiddleware, TrialRankError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    use http_cache_reqwest::{CACacheManager, Cache, CacheMode, HttpCache, HttpCacheOptions};
    use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

    let base_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .connect_timeout(std::time::Duration::from_secs(10))
        .user_agent(HTTP_USER_AGENT)
        .build()
        .map_err(TrialRankError::HttpClientInit)?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    let cache_path = crate::utils::cache_dir::trialrank_cache_dir().join("http-cacache");
    std::fs::create_dir_all(&cache_path)?;

    let client = reqwest_middleware::ClientBuilder::new(base_client)
        .with(Cache(HttpCache {
            mode: CacheMode::Default,
            manager: CACacheManager { path: cache_path },
            options: HttpCacheOptions::default(),
        }))
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| TrialRankError::LexicalBackend("client init race".to_string())),
    }
}

/// HTTP client for a document index supporting boolean filters, weighted multi-field
/// match, and function-score multipliers.
#[derive(Clone)]
pub struct HttpLexicalIndex {
    client: ClientWithMiddleware,
    base: Cow<'static, str>,
    index: Cow<'static, str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponseEnvelope {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
    #[serde(default)]
    total: Option<TotalValue>,
}

/// OpenSearch/Elasticsearch-style `hits.total`: `{"value": N, "relation": "eq"}`.
#[derive(Debug, Deserialize)]
struct TotalValue {
    value: usize,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_source")]
    source: TrialDoc,
    #[serde(rename = "_score", default)]
    score: f64,
}

impl HttpLexicalIndex {
    pub fn new(base_url: impl Into<String>, index_name: impl Into<String>) -> Result<Self, TrialRankError> {
        Ok(Self {
            client: shared_client()?,
            base: Cow::Owned(base_url.into()),
            index: Cow::Owned(index_name.into()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            self.index.as_ref(),
            path
        )
    }

    fn build_filter_clauses(filters: &LexicalFilters) -> Vec<Value> {
        let mut clauses = Vec::new();
        if let Some(phase) = &filters.phase {
            clauses.push(json!({"term": {"phase": phase}}));
        }
        if let Some(status) = &filters.overall_status {
            clauses.push(json!({"term": {"overall_status": status}}));
        }
        if let Some(condition) = &filters.condition {
            clauses.push(json!({
                "match": {"conditions": {"query": condition, "operator": "and"}}
            }));
        }
        if let Some(country) = &filters.country {
            clauses.push(json!({
                "nested": {
                    "path": "locations",
                    "query": {"term": {"locations.country": country}},
                }
            }));
        }
        if let Some(age) = filters.patient_age {
            clauses.push(json!({
                "range": {"min_age_years": {"lte": age}}
            }));
            clauses.push(json!({
                "range": {"max_age_years": {"gte": age}}
            }));
        }
        if let Some(sex) = filters.patient_sex {
            let sex_str = match sex {
                Sex::Male => "MALE",
                Sex::Female => "FEMALE",
                Sex::All => "ALL",
            };
            clauses.push(json!({
                "terms": {"sex": [sex_str, "ALL"]}
            }));
        }
        clauses
    }

    fn build_query(query_text: Option<&str>, filters: &LexicalFilters) -> Value {
        let must_clause = match query_text {
            Some(text) if !text.trim().is_empty() => {
                let fields: Vec<String> = FIELD_WEIGHTS
                    .iter()
                    .map(|(field, weight)| format!("{field}^{weight}"))
                    .collect();
                json!({
                    "multi_match": {
                        "query": text,
                        "fields": fields,
                        "operator": "or",
                    }
                })
            }
            _ => json!({"match_all": {}}),
        };
        json!({
            "bool": {
                "must": [must_clause],
                "filter": Self::build_filter_clauses(filters),
            }
        })
    }
}

#[async_trait]
impl LexicalIndex for HttpLexicalIndex {
    async fn search(
        &self,
        query_text: Option<&str>,
        filters: &LexicalFilters,
        candidate_size: usize,
    ) -> Result<LexicalSearchResult, TrialRankError> {
        let body = json!({
            "from": 0,
            "size": candidate_size,
            "query": Self::build_query(query_text, filters),
        });

        let resp = self
            .client
            .post(self.endpoint("_search"))
            .json(&body)
            .send()
            .await
            .map_err(|err| TrialRankError::LexicalBackend(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TrialRankError::LexicalBackend(format!(
                "{LEXICAL_API} returned HTTP {status}: {text}"
            )));
        }

        let parsed: SearchResponseEnvelope = resp
            .json()
            .await
            .map_err(|err| TrialRankError::LexicalBackend(err.to_string()))?;

        let total_hits = parsed.hits.total.map(|t| t.value);
        let hits = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let shaped = hit.score * score_multiplier(&hit.source);
                (hit.source, shaped)
            })
            .collect();
        Ok(LexicalSearchResult { hits, total_hits })
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<TrialDoc>, TrialRankError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "size": ids.len(),
            "query": {"terms": {"nct_id": ids}},
        });
        let resp = self
            .client
            .post(self.endpoint("_search"))
            .json(&body)
            .send()
            .await
            .map_err(|err| TrialRankError::LexicalBackend(err.to_string()))?;
        let parsed: SearchResponseEnvelope = resp
            .json()
            .await
            .map_err(|err| TrialRankError::LexicalBackend(err.to_string()))?;
        Ok(parsed.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrialLocation;

    fn doc(nct_id: &str, title: &str, phase: &str, status: &str) -> TrialDoc {
        TrialDoc {
            nct_id: nct_id.to_string(),
            title: Some(title.to_string()),
            brief_summary: None,
            detailed_description: None,
            conditions: vec!["NSCLC".to_string()],
            conditions_cuis: vec![],
            phase: Some(phase.to_string()),
            overall_status: Some(status.to_string()),
            study_type: None,
            min_age_years: Some(18.0),
            max_age_years: Some(99.0),
            sex: Some(Sex::All),
            locations: vec![TrialLocation {
                city: None,
                state: None,
                country: Some("United States".to_string()),
            }],
            eligibility_criteria_raw: None,
            parsed_criteria: None,
            retrieval_meta: None,
        }
    }

    #[tokio::test]
    async fn search_ranks_recruiting_phase3_above_plain_match() {
        let index = StaticLexicalIndex::new(vec![
            doc("NCT01", "NSCLC trial", "Phase 1", "Not yet recruiting"),
            doc("NCT02", "NSCLC trial", "Phase 3", "Recruiting"),
        ]);
        let result = index
            .search(Some("NSCLC"), &LexicalFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(result.hits[0].0.nct_id, "NCT02");
        assert!(result.hits[0].1 > result.hits[1].1);
    }

    #[tokio::test]
    async fn age_and_country_filters_exclude_non_matching_docs() {
        let mut out_of_range = doc("NCT03", "trial", "Phase 2", "Recruiting");
        out_of_range.min_age_years = Some(65.0);
        let index = StaticLexicalIndex::new(vec![
            doc("NCT01", "trial", "Phase 2", "Recruiting"),
            out_of_range,
        ]);
        let filters = LexicalFilters {
            patient_age: Some(40.0),
            ..Default::default()
        };
        let result = index.search(None, &filters, 10).await.unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].0.nct_id, "NCT01");
    }

    #[tokio::test]
    async fn match_all_fallback_when_query_text_absent() {
        let index = StaticLexicalIndex::new(vec![doc("NCT01", "trial", "Phase 1", "Recruiting")]);
        let result = index.search(None, &LexicalFilters::default(), 10).await.unwrap();
        assert_eq!(result.hits.len(), 1);
    }

    #[tokio::test]
    async fn total_hits_reports_pre_truncation_count() {
        let index = StaticLexicalIndex::new(vec![
            doc("NCT01", "trial", "Phase 1", "Recruiting"),
            doc("NCT02", "trial", "Phase 1", "Recruiting"),
            doc("NCT03", "trial", "Phase 1", "Recruiting"),
        ]);
        let result = index.search(None, &LexicalFilters::default(), 2).await.unwrap();
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.total_hits, Some(3));
    }

    #[tokio::test]
    async fn fetch_by_ids_returns_only_requested_docs() {
        let index = StaticLexicalIndex::new(vec![
            doc("NCT01", "a", "Phase 1", "Recruiting"),
            doc("NCT02", "b", "Phase 1", "Recruiting"),
        ]);
        let docs = index.fetch_by_ids(&["NCT02".to_string()]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].nct_id, "NCT02");
    }
}
