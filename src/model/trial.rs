//! `TrialDoc` and the structured metadata fields the criteria parser overrides with.

use serde::{Deserialize, Serialize};

use super::criteria::ParsedCriteria;

/// Trial-side sex eligibility. `All` means the trial is open to either sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    All,
}

impl Default for Sex {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Read-only document as produced by the lexical index.
///
/// Invariant: if `min_age_years` and `max_age_years` are both present,
/// `min_age_years <= max_age_years`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialDoc {
    pub nct_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brief_summary: Option<String>,
    #[serde(default)]
    pub detailed_description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub conditions_cuis: Vec<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub overall_status: Option<String>,
    #[serde(default)]
    pub study_type: Option<String>,
    #[serde(default)]
    pub min_age_years: Option<f64>,
    #[serde(default)]
    pub max_age_years: Option<f64>,
    #[serde(default)]
    pub sex: Option<Sex>,
    #[serde(default)]
    pub locations: Vec<TrialLocation>,
    #[serde(default)]
    pub eligibility_criteria_raw: Option<String>,
    #[serde(default)]
    pub parsed_criteria: Option<ParsedCriteria>,
    /// Raw lexical score, present when this doc came back from the lexical index.
    #[serde(default)]
    pub retrieval_meta: Option<f64>,
}

impl TrialDoc {
    /// `TrialMetadata` view used to override a freshly parsed `ParsedCriteria`.
    pub fn metadata(&self) -> TrialMetadata {
        TrialMetadata {
            min_age_years: self.min_age_years,
            max_age_years: self.max_age_years,
            sex: self.sex,
            conditions: self.conditions.clone(),
            conditions_cuis: self.conditions_cuis.clone(),
        }
    }

    /// Age bounds with the absent-value defaults (0, 120) applied.
    pub fn age_bounds(&self) -> (f64, f64) {
        (
            self.min_age_years.unwrap_or(0.0),
            self.max_age_years.unwrap_or(120.0),
        )
    }

    pub fn sex_or_default(&self) -> Sex {
        self.sex.unwrap_or_default()
    }
}

/// Structured trial metadata the parser merges in over parsed-from-text values. A
/// subset of `TrialDoc`'s fields, kept separate so the parser can be called with
/// metadata the caller has without building a full `TrialDoc`.
#[derive(Debug, Clone, Default)]
pub struct TrialMetadata {
    pub min_age_years: Option<f64>,
    pub max_age_years: Option<f64>,
    pub sex: Option<Sex>,
    pub conditions: Vec<String>,
    pub conditions_cuis: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrialDoc {
        TrialDoc {
            nct_id: "NCT00000001".to_string(),
            title: None,
            brief_summary: None,
            detailed_description: None,
            conditions: vec![],
            conditions_cuis: vec![],
            phase: None,
            overall_status: None,
            study_type: None,
            min_age_years: None,
            max_age_years: None,
            sex: None,
            locations: vec![],
            eligibility_criteria_raw: None,
            parsed_criteria: None,
            retrieval_meta: None,
        }
    }

    #[test]
    fn age_bounds_default_to_0_and_120_when_absent() {
        let doc = sample();
        assert_eq!(doc.age_bounds(), (0.0, 120.0));
    }

    #[test]
    fn sex_defaults_to_all_when_absent() {
        let doc = sample();
        assert_eq!(doc.sex_or_default(), Sex::All);
    }
}
