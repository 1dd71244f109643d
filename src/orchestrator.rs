//! The retrieval/rerank orchestrator: fans a query out to the lexical and dense
//! indexes concurrently, fuses the two ranked lists with Reciprocal Rank Fusion, falls
//! back to dense-only when the lexical index returns nothing, evaluates feasibility
//! for each candidate, blends retrieval and feasibility into a final score, and
//! paginates.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dictionary::SynonymDictionary;
use crate::error::TrialRankError;
use crate::linker::{ConceptLinker, StubLinker};
use crate::model::{Feasibility, Hit, PatientProfile, RankOptions, SearchResponse, TrialDoc};
use crate::parser;
use crate::retrieval::{DenseIndex, LexicalFilters, LexicalIndex, LexicalSearchResult};
use crate::scorer;

/// Reciprocal rank fusion constant.
const K_RRF: f64 = 60.0;

/// Maximum number of feasibility evaluations to run concurrently.
const FEASIBILITY_CONCURRENCY: usize = 16;

/// Computes Reciprocal Rank Fusion over the union of two ranked id lists. Pure
/// arithmetic: whether a fused id is actually admitted into the final candidate set is
/// a separate, caller-level decision (see `fuse_lexical_candidates` below).
///
/// Returns `(id, rrf_score, lexical_rank, dense_rank)` sorted by `rrf_score`
/// descending, ties broken by lexical rank (ids absent from the lexical list sort
/// after ids with the same score that have one).
pub fn fuse_rrf(
    lexical_order: &[String],
    dense_order: &[String],
    k_rrf: f64,
) -> Vec<(String, f64, Option<usize>, Option<usize>)> {
    let lexical_ranks: HashMap<&str, usize> = lexical_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();
    let dense_ranks: HashMap<&str, usize> = dense_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();

    let mut ids: Vec<&str> = lexical_order.iter().map(|s| s.as_str()).collect();
    for id in dense_order {
        if !lexical_ranks.contains_key(id.as_str()) {
            ids.push(id.as_str());
        }
    }

    let mut fused: Vec<(String, f64, Option<usize>, Option<usize>)> = ids
        .into_iter()
        .map(|id| {
            let lex_rank = lexical_ranks.get(id).copied();
            let dense_rank = dense_ranks.get(id).copied();
            let mut score = 0.0;
            if let Some(rank) = lex_rank {
                score += 1.0 / (k_rrf + rank as f64);
            }
            if let Some(rank) = dense_rank {
                score += 1.0 / (k_rrf + rank as f64);
            }
            (id.to_string(), score, lex_rank, dense_rank)
        })
        .collect();

    fused.sort_by(|a, b| {
        b.1.total_cmp(&a.1).then_with(|| {
            a.2.unwrap_or(usize::MAX).cmp(&b.2.unwrap_or(usize::MAX))
        })
    });
    fused
}

/// One candidate flowing through the pipeline after fusion, before feasibility
/// evaluation.
struct FusedCandidate {
    trial: TrialDoc,
    retrieval_raw: f64,
    lexical_rank: Option<usize>,
    dense_rank: Option<usize>,
}

/// Builds the query text fed to both the lexical and dense indexes from non-empty
/// profile fields. Age and sex are used for filtering only.
pub fn build_query_text(profile: &PatientProfile) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !profile.conditions.is_empty() {
        parts.push(format!("with {}", profile.conditions.join(", ")));
    }
    if let Some(ecog) = profile.ecog_score {
        parts.push(format!("ECOG {ecog}"));
    }
    if !profile.biomarkers.is_empty() {
        parts.push(format!("Biomarkers: {}", profile.biomarkers.join(", ")));
    }
    if !profile.history.is_empty() {
        parts.push(format!("History of {}", profile.history.join(", ")));
    }
    if let Some(lines) = profile.prior_lines_of_therapy {
        parts.push(format!("{lines} prior lines of systemic therapy"));
    }
    if let Some(days) = profile.days_since_last_treatment {
        parts.push(format!("{days} days since last treatment"));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("{}.", parts.join(". "))
}

/// Maps profile conditions/biomarkers to canonical keys, keeping originals when no
/// mapping exists.
fn normalize_profile(profile: &PatientProfile, dictionary: &SynonymDictionary) -> PatientProfile {
    let mut normalized = profile.clone();
    normalized.conditions = profile
        .conditions
        .iter()
        .map(|c| dictionary.canonicalize(c))
        .collect();
    normalized.biomarkers = profile
        .biomarkers
        .iter()
        .map(|b| dictionary.canonicalize(b))
        .collect();
    normalized
}

/// Drives retrieval, parsing, and scoring for a single request and assembles a
/// paginated response. Holds read-only shared resources only; safe to share across
/// concurrent requests.
pub struct Orchestrator {
    lexical: Arc<dyn LexicalIndex>,
    dense: Arc<dyn DenseIndex>,
    dictionary: Arc<SynonymDictionary>,
    linker: Arc<dyn ConceptLinker>,
}

impl Orchestrator {
    pub fn new(
        lexical: Arc<dyn LexicalIndex>,
        dense: Arc<dyn DenseIndex>,
        dictionary: Arc<SynonymDictionary>,
    ) -> Self {
        Self {
            lexical,
            dense,
            dictionary,
            linker: Arc::new(StubLinker),
        }
    }

    pub fn with_linker(mut self, linker: Arc<dyn ConceptLinker>) -> Self {
        self.linker = linker;
        self
    }

    /// Ranks trials against a patient profile, scoring feasibility and blending it
    /// with retrieval relevance.
    pub async fn rank(
        &self,
        profile: &PatientProfile,
        options: &RankOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, TrialRankError> {
        options.validate()?;
        let normalized = normalize_profile(profile, &self.dictionary);
        let query_text = build_query_text(&normalized);
        let filters = LexicalFilters {
            phase: options.filters.phase.clone(),
            overall_status: options.filters.overall_status.clone(),
            condition: options.filters.condition.clone(),
            country: options.filters.country.clone(),
            patient_age: normalized.age_years,
            patient_sex: normalized.sex,
        };
        self.run(
            Some(query_text).filter(|s| !s.is_empty()),
            Some(&normalized),
            filters,
            options,
            cancel,
        )
        .await
    }

    /// Searches trials by free-text query and filters alone. No patient profile:
    /// feasibility is never evaluated and the infeasible filter never drops anything.
    pub async fn search(
        &self,
        query_text: Option<&str>,
        options: &RankOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, TrialRankError> {
        options.validate()?;
        let filters = LexicalFilters {
            phase: options.filters.phase.clone(),
            overall_status: options.filters.overall_status.clone(),
            condition: options.filters.condition.clone(),
            country: options.filters.country.clone(),
            patient_age: None,
            patient_sex: None,
        };
        self.run(query_text.map(str::to_string), None, filters, options, cancel)
            .await
    }

    async fn run(
        &self,
        query_text: Option<String>,
        profile: Option<&PatientProfile>,
        filters: LexicalFilters,
        options: &RankOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, TrialRankError> {
        if cancel.is_cancelled() {
            return Err(TrialRankError::Cancelled);
        }

        // Lexical and dense search run concurrently.
        let lexical_fut = self
            .lexical
            .search(query_text.as_deref(), &filters, options.candidate_size);
        let dense_ready = self.dense.is_ready();
        let dense_k = (3 * options.candidate_size).max(options.candidate_size);
        let dense_fut = async {
            if dense_ready {
                if let Some(text) = query_text.as_deref().filter(|t| !t.is_empty()) {
                    return self.dense.search(text, dense_k).await;
                }
            }
            Vec::new()
        };
        let (lexical_result, dense_hits) = tokio::join!(lexical_fut, dense_fut);
        let LexicalSearchResult {
            hits: lexical_hits,
            total_hits: lexical_total_hits,
        } = lexical_result?;

        if cancel.is_cancelled() {
            return Err(TrialRankError::Cancelled);
        }

        let lexical_pool_size = lexical_hits.len();
        let (candidates, used_dense_fallback) = if lexical_hits.is_empty() && dense_ready && !dense_hits.is_empty() {
            // Dense-only fallback.
            self.dense_only_candidates(dense_hits).await?
        } else {
            // RRF fusion over the lexical candidate set.
            (self.fuse_lexical_candidates(lexical_hits, &dense_hits), false)
        };

        if candidates.is_empty() {
            return Ok(SearchResponse {
                hits: Vec::new(),
                total: 0,
                page: options.page,
                page_size: options.page_size,
                candidate_total: options.use_candidate_total.then_some(0),
                truncated: false,
                used_dense_fallback,
            });
        }

        // Feasibility evaluation, fanned out across candidates.
        let patient_cuis = match profile {
            Some(p) if !p.conditions.is_empty() => {
                self.linker.extract_cuis_many(&p.conditions).await
            }
            _ => Default::default(),
        };

        if cancel.is_cancelled() {
            return Err(TrialRankError::Cancelled);
        }

        let dictionary = Arc::clone(&self.dictionary);
        let hits: Vec<Hit> = stream::iter(candidates)
            .map(|candidate| {
                let dictionary = Arc::clone(&dictionary);
                let patient_cuis = patient_cuis.clone();
                async move { evaluate_candidate(candidate, profile, &dictionary, &patient_cuis) }
            })
            .buffer_unordered(FEASIBILITY_CONCURRENCY)
            .collect()
            .await;

        // Blend retrieval and feasibility scores.
        let retrieval_values: Vec<f64> = hits.iter().map(|h| h.rrf_score).collect();
        let retrieval_norm = crate::normalize::min_max_normalize(&retrieval_values);
        let feasibility_weight = options.feasibility_weight;

        let mut blended: Vec<Hit> = hits
            .into_iter()
            .zip(retrieval_norm)
            .map(|(mut hit, norm)| {
                let feas_norm = hit.feasibility_score.map(|s| s as f64 / 100.0).unwrap_or(0.0);
                hit.final_score = (1.0 - feasibility_weight) * norm + feasibility_weight * feas_norm;
                hit
            })
            .collect();

        // candidate_total counts the full pool evaluated, before infeasible trials are
        // dropped from the returned page: SPEC_FULL §8 requires `candidate_total > 0`
        // even when every candidate turns out infeasible.
        let candidate_total = blended.len();

        // Filter infeasible, sort by final score descending, stable.
        blended.retain(|hit| hit.is_feasible != Feasibility::False);
        blended.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

        // Paginate over the feasible-only list; `total`/`candidate_total` both report
        // the pre-filter pool size, matching the source's `candidate_total = len(hits)`
        // (computed before infeasible trials are sunk, not after they are removed).
        let start = options.offset().min(blended.len());
        let end = (start + options.page_size).min(blended.len());
        let page_hits = blended[start..end].to_vec();

        // Prefer the backend's own reported total (the index may have matched more
        // than the pool it returned); fall back to the pool-size proxy when the
        // backend doesn't report one (e.g. the in-memory static index already folds
        // its pre-truncation count into `total_hits`, but a minimal `LexicalIndex`
        // impl may report `None`).
        let truncated = options.use_candidate_total
            && lexical_total_hits
                .map(|total| total > options.candidate_size)
                .unwrap_or(lexical_pool_size >= options.candidate_size);

        Ok(SearchResponse {
            hits: page_hits,
            total: candidate_total,
            page: options.page,
            page_size: options.page_size,
            candidate_total: options.use_candidate_total.then_some(candidate_total),
            truncated,
            used_dense_fallback,
        })
    }

    /// RRF-fuses the lexical candidate list with dense ranks, restricted to ids present
    /// in the lexical candidate list: dense-only ids are not re-admitted when the
    /// lexical search returned a non-empty candidate set.
    fn fuse_lexical_candidates(
        &self,
        lexical_hits: Vec<(TrialDoc, f64)>,
        dense_hits: &[(String, f64)],
    ) -> Vec<FusedCandidate> {
        let lexical_order: Vec<String> = lexical_hits.iter().map(|(doc, _)| doc.nct_id.clone()).collect();
        let dense_order: Vec<String> = dense_hits.iter().map(|(id, _)| id.clone()).collect();
        let fused = fuse_rrf(&lexical_order, &dense_order, K_RRF);

        let mut docs_by_id: HashMap<String, TrialDoc> =
            lexical_hits.into_iter().map(|(doc, _)| (doc.nct_id.clone(), doc)).collect();

        fused
            .into_iter()
            .filter_map(|(id, score, lex_rank, dense_rank)| {
                let doc = docs_by_id.remove(&id)?;
                Some(FusedCandidate {
                    trial: doc,
                    retrieval_raw: score,
                    lexical_rank: lex_rank,
                    dense_rank,
                })
            })
            .collect()
    }

    /// Dense-only fallback. Fetches source records for the dense hits, then
    /// min-max-normalizes similarities to `[0, 1]`.
    async fn dense_only_candidates(
        &self,
        dense_hits: Vec<(String, f64)>,
    ) -> Result<(Vec<FusedCandidate>, bool), TrialRankError> {
        let ids: Vec<String> = dense_hits.iter().map(|(id, _)| id.clone()).collect();
        let docs = self.lexical.fetch_by_ids(&ids).await?;
        let mut docs_by_id: HashMap<String, TrialDoc> =
            docs.into_iter().map(|d| (d.nct_id.clone(), d)).collect();

        let similarities: Vec<f64> = dense_hits.iter().map(|(_, s)| *s).collect();
        let normalized = crate::normalize::min_max_normalize(&similarities);

        let candidates = dense_hits
            .into_iter()
            .zip(normalized)
            .enumerate()
            .filter_map(|(rank, ((id, _), norm))| {
                let doc = docs_by_id.remove(&id)?;
                Some(FusedCandidate {
                    trial: doc,
                    retrieval_raw: norm,
                    lexical_rank: None,
                    dense_rank: Some(rank + 1),
                })
            })
            .collect();
        Ok((candidates, true))
    }
}

/// Evaluates one candidate's feasibility. Parser/scorer failures never fail the whole
/// request: this function cannot itself panic on malformed input, but a future
/// pluggable parser/linker could, so the shape here keeps room for
/// `Feasibility::Undetermined` on a per-candidate basis.
fn evaluate_candidate(
    candidate: FusedCandidate,
    profile: Option<&PatientProfile>,
    dictionary: &SynonymDictionary,
    patient_cuis: &std::collections::HashSet<String>,
) -> Hit {
    let FusedCandidate {
        trial,
        retrieval_raw,
        lexical_rank,
        dense_rank,
    } = candidate;

    let metadata = trial.metadata();
    let raw_text = trial.eligibility_criteria_raw.as_deref().unwrap_or("");
    let has_text = !raw_text.trim().is_empty();
    let has_metadata = metadata.min_age_years.is_some()
        || metadata.max_age_years.is_some()
        || metadata.sex.is_some()
        || !metadata.conditions.is_empty();

    if !has_text && !has_metadata {
        return Hit {
            trial,
            rrf_score: retrieval_raw,
            lexical_rank,
            dense_rank,
            feasibility_score: None,
            is_feasible: Feasibility::Undetermined,
            reasons: vec!["No eligibility criteria available".to_string()],
            parsed_criteria: None,
            final_score: 0.0,
        };
    }

    // Cached criteria predate this request; the metadata override (age/sex/conditions/
    // CUIs) must still be re-applied even though the text itself isn't re-parsed.
    let parsed = match trial.parsed_criteria.clone() {
        Some(mut cached) => {
            parser::apply_metadata_override(&mut cached, &metadata);
            cached.enforce_disjoint_conditions();
            cached
        }
        None => parser::parse(raw_text, &metadata, dictionary),
    };

    let Some(profile) = profile else {
        return Hit {
            trial,
            rrf_score: retrieval_raw,
            lexical_rank,
            dense_rank,
            feasibility_score: None,
            is_feasible: Feasibility::Undetermined,
            reasons: Vec::new(),
            parsed_criteria: Some(parsed),
            final_score: 0.0,
        };
    };

    let result = scorer::score(profile, &parsed, &metadata, patient_cuis);

    Hit {
        trial,
        rrf_score: retrieval_raw,
        lexical_rank,
        dense_rank,
        feasibility_score: Some(result.score),
        is_feasible: result.is_feasible,
        reasons: result.reasons,
        parsed_criteria: Some(parsed),
        final_score: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sex;
    use crate::retrieval::{HashingEncoder, StaticLexicalIndex};

    #[test]
    fn rrf_fusion_matches_literal_scenario() {
        let lexical = vec!["A", "B", "C", "D"].into_iter().map(String::from).collect::<Vec<_>>();
        let dense = vec!["C", "A", "E"].into_iter().map(String::from).collect::<Vec<_>>();
        let fused = fuse_rrf(&lexical, &dense, 60.0);
        let order: Vec<&str> = fused.iter().map(|(id, _, _, _)| id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B", "E", "D"]);

        let a = fused.iter().find(|(id, ..)| id == "A").unwrap().1;
        let c = fused.iter().find(|(id, ..)| id == "C").unwrap().1;
        assert!((a - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
        assert!((c - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn build_query_text_uses_only_non_empty_fields() {
        let profile = PatientProfile {
            conditions: vec!["NSCLC".to_string()],
            ecog_score: Some(1),
            ..Default::default()
        };
        let text = build_query_text(&profile);
        assert_eq!(text, "with NSCLC. ECOG 1.");
    }

    #[test]
    fn build_query_text_is_empty_for_empty_profile() {
        assert_eq!(build_query_text(&PatientProfile::default()), "");
    }

    fn nsclc_trial(nct_id: &str) -> TrialDoc {
        TrialDoc {
            nct_id: nct_id.to_string(),
            title: Some("A trial for NSCLC patients".to_string()),
            brief_summary: None,
            detailed_description: None,
            conditions: vec!["NSCLC".to_string()],
            conditions_cuis: vec![],
            phase: Some("Phase 2".to_string()),
            overall_status: Some("Recruiting".to_string()),
            study_type: None,
            min_age_years: Some(18.0),
            max_age_years: Some(99.0),
            sex: Some(Sex::All),
            locations: vec![],
            eligibility_criteria_raw: Some(
                "inclusion: non-small cell lung cancer patients, ecog 0-1".to_string(),
            ),
            parsed_criteria: None,
            retrieval_meta: None,
        }
    }

    fn dict() -> Arc<SynonymDictionary> {
        Arc::new(
            SynonymDictionary::from_json_str(
                r#"{"NSCLC": ["non-small cell lung cancer", "nsclc"]}"#,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn rank_returns_feasible_hit_for_matching_profile() {
        let lexical: Arc<dyn LexicalIndex> =
            Arc::new(StaticLexicalIndex::new(vec![nsclc_trial("NCT01")]));
        let dense: Arc<dyn DenseIndex> =
            Arc::new(crate::retrieval::FlatInnerProductIndex::not_ready(Box::new(
                HashingEncoder::new(16),
            )));
        let orchestrator = Orchestrator::new(lexical, dense, dict());
        let profile = PatientProfile {
            age_years: Some(60.0),
            sex: Some(Sex::Male),
            conditions: vec!["NSCLC".to_string()],
            ecog_score: Some(1),
            ..Default::default()
        };
        let options = RankOptions::default();
        let response = orchestrator
            .rank(&profile, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].is_feasible, Feasibility::True);
        assert!(response.hits[0].final_score > 0.0);
    }

    #[tokio::test]
    async fn infeasible_candidates_are_dropped_from_hits() {
        let mut excluded_trial = nsclc_trial("NCT02");
        excluded_trial.eligibility_criteria_raw =
            Some("inclusion: nsclc.\nexclusion criteria:\npregnant patients".to_string());
        let lexical: Arc<dyn LexicalIndex> = Arc::new(StaticLexicalIndex::new(vec![excluded_trial]));
        let dense: Arc<dyn DenseIndex> =
            Arc::new(crate::retrieval::FlatInnerProductIndex::not_ready(Box::new(
                HashingEncoder::new(16),
            )));
        let orchestrator = Orchestrator::new(lexical, dense, dict());
        let profile = PatientProfile {
            conditions: vec!["NSCLC".to_string(), "Pregnancy".to_string()],
            ..Default::default()
        };
        let options = RankOptions::default();
        let response = orchestrator
            .rank(&profile, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.hits.is_empty());
        assert_eq!(response.candidate_total, Some(1));
        assert_eq!(response.total, 1);
    }

    #[tokio::test]
    async fn cancelled_token_yields_cancellation_error() {
        let lexical: Arc<dyn LexicalIndex> = Arc::new(StaticLexicalIndex::new(vec![nsclc_trial("NCT01")]));
        let dense: Arc<dyn DenseIndex> =
            Arc::new(crate::retrieval::FlatInnerProductIndex::not_ready(Box::new(
                HashingEncoder::new(16),
            )));
        let orchestrator = Orchestrator::new(lexical, dense, dict());
        let token = CancellationToken::new();
        token.cancel();
        let result = orchestrator
            .search(None, &RankOptions::default(), &token)
            .await;
        assert!(matches!(result, Err(TrialRankError::Cancelled)));
    }

    #[tokio::test]
    async fn empty_candidate_pool_yields_empty_hits_and_zero_total() {
        let lexical: Arc<dyn LexicalIndex> = Arc::new(StaticLexicalIndex::new(vec![]));
        let dense: Arc<dyn DenseIndex> =
            Arc::new(crate::retrieval::FlatInnerProductIndex::not_ready(Box::new(
                HashingEncoder::new(16),
            )));
        let orchestrator = Orchestrator::new(lexical, dense, dict());
        let response = orchestrator
            .search(None, &RankOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.hits.is_empty());
        assert_eq!(response.total, 0);
    }
}
