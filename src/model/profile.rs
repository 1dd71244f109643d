//! Patient profile, the query-side input to parsing, scoring, and ranking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::trial::Sex;

/// Structured patient data submitted to `rank`/`search`.
///
/// `labs` maps a canonical lab key (the same keys used in `ParsedCriteria::lab_rules`)
/// to the patient's observed value, not a threshold — the scorer compares these values
/// against each trial's lab rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub age_years: Option<f64>,
    #[serde(default)]
    pub sex: Option<Sex>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub biomarkers: Vec<String>,
    /// Comorbidity strings; acts as additional exclusion evidence alongside `conditions`.
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub ecog_score: Option<u8>,
    #[serde(default)]
    pub labs: HashMap<String, f64>,
    #[serde(default)]
    pub prior_lines_of_therapy: Option<u32>,
    #[serde(default)]
    pub days_since_last_treatment: Option<u32>,
}

impl PatientProfile {
    /// Case-insensitive union of `conditions` and `history`, used by the scorer's hard
    /// exclusion check.
    pub fn conditions_and_history_lower(&self) -> Vec<String> {
        self.conditions
            .iter()
            .chain(self.history.iter())
            .map(|s| s.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_and_history_lower_combines_and_lowercases() {
        let profile = PatientProfile {
            conditions: vec!["NSCLC".to_string()],
            history: vec!["Pregnancy".to_string()],
            ..Default::default()
        };
        let combined = profile.conditions_and_history_lower();
        assert_eq!(combined, vec!["nsclc".to_string(), "pregnancy".to_string()]);
    }
}
