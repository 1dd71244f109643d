//! Request options and result types for the ranking/search pipeline.

use serde::{Deserialize, Serialize};

use super::criteria::ParsedCriteria;
use super::trial::TrialDoc;

/// Trivalent feasibility verdict. `Undetermined` covers trials with no eligibility
/// text/metadata to evaluate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feasibility {
    True,
    False,
    Undetermined,
}

impl Feasibility {
    pub fn is_feasible_for_filtering(&self) -> bool {
        !matches!(self, Feasibility::False)
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub trial: TrialDoc,
    pub rrf_score: f64,
    pub lexical_rank: Option<usize>,
    pub dense_rank: Option<usize>,
    pub feasibility_score: Option<u8>,
    pub is_feasible: Feasibility,
    pub reasons: Vec<String>,
    pub parsed_criteria: Option<ParsedCriteria>,
    pub final_score: f64,
}

/// Optional category/location filters recognized by `rank`/`search`: `phase`,
/// `overall_status`, `condition`, `country`.
#[derive(Debug, Clone, Default)]
pub struct RankFilters {
    pub phase: Option<String>,
    pub overall_status: Option<String>,
    pub condition: Option<String>,
    pub country: Option<String>,
}

/// Options recognized by `rank`/`search`. `bm25_weight` is accepted for API
/// compatibility but ignored by this implementation, which adopts RRF as the
/// authoritative fusion method.
#[derive(Debug, Clone)]
pub struct RankOptions {
    pub page: usize,
    pub page_size: usize,
    pub candidate_size: usize,
    pub bm25_weight: f64,
    pub feasibility_weight: f64,
    pub use_candidate_total: bool,
    pub filters: RankFilters,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            candidate_size: 1000,
            bm25_weight: 0.5,
            feasibility_weight: 0.6,
            use_candidate_total: true,
            filters: RankFilters::default(),
        }
    }
}

impl RankOptions {
    /// Validates the recognized ranges: `page >= 1`, `1 <= page_size <= 100`, weights
    /// in `[0, 1]`.
    pub fn validate(&self) -> Result<(), crate::error::TrialRankError> {
        if self.page == 0 {
            return Err(crate::error::TrialRankError::validation(
                "page must be >= 1",
            ));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(crate::error::TrialRankError::validation(
                "page_size must be between 1 and 100",
            ));
        }
        if !(0.0..=1.0).contains(&self.bm25_weight) {
            return Err(crate::error::TrialRankError::validation(
                "bm25_weight must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.feasibility_weight) {
            return Err(crate::error::TrialRankError::validation(
                "feasibility_weight must be in [0, 1]",
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }
}

/// Paginated result envelope returned by `rank`/`search`. `candidate_total` is the
/// pre-pagination feasible-and-sorted count; `truncated` is set when the lexical
/// index reported more matches than the candidate pool actually retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub candidate_total: Option<usize>,
    pub truncated: bool,
    pub used_dense_fallback: bool,
}
