//! Local fixtures backing the demonstration CLI: a small sample corpus and synonym
//! dictionary so `rank`/`search`/`parse`/`score` work without a live lexical backend
//! or dense artifacts configured.

use crate::dictionary::SynonymDictionary;
use crate::model::{Sex, TrialDoc};

const SAMPLE_DICTIONARY_JSON: &str = r#"{
    "NSCLC": ["non-small cell lung cancer", "non small cell lung cancer", "nsclc"],
    "Melanoma": ["melanoma"],
    "Breast_Cancer": ["breast cancer"],
    "EGFR_Gene": ["egfr", "epidermal growth factor receptor"],
    "PD-L1_Status": ["pd-l1", "pd l1", "programmed death-ligand 1"],
    "Creatinine_Level": ["creatinine"],
    "ALT_Level": ["alt", "alanine aminotransferase"]
}"#;

/// The dictionary bundled with the CLI for offline demonstration. A deployed
/// embedding of this crate is expected to load a real synonym dictionary via
/// `SynonymDictionary::load`.
pub fn sample_dictionary() -> SynonymDictionary {
    SynonymDictionary::from_json_str(SAMPLE_DICTIONARY_JSON)
        .expect("sample dictionary JSON is valid")
}

/// A handful of trials spanning feasible/infeasible paths used by the CLI's default
/// (no lexical backend configured) mode.
pub fn sample_corpus() -> Vec<TrialDoc> {
    vec![
        TrialDoc {
            nct_id: "NCT10000001".to_string(),
            title: Some("Osimertinib in EGFR-Mutant Advanced NSCLC".to_string()),
            brief_summary: Some(
                "A study of osimertinib in patients with EGFR-mutant non-small cell lung cancer."
                    .to_string(),
            ),
            detailed_description: None,
            conditions: vec!["NSCLC".to_string()],
            conditions_cuis: vec!["C0007131".to_string()],
            phase: Some("Phase 3".to_string()),
            overall_status: Some("Recruiting".to_string()),
            study_type: Some("Interventional".to_string()),
            min_age_years: Some(18.0),
            max_age_years: Some(99.0),
            sex: Some(Sex::All),
            locations: Vec::new(),
            eligibility_criteria_raw: Some(
                "Inclusion Criteria:\n\
                 - Age at least 18 years\n\
                 - Histologically confirmed non-small cell lung cancer with documented EGFR mutation\n\
                 - ECOG performance status 0-1\n\
                 - Creatinine < 1.5 mg/dl\n\
                 - At least 2 prior lines of systemic therapy\n\
                 Exclusion Criteria:\n\
                 - Known CNS metastases\n\
                 - Pregnant or nursing women"
                    .to_string(),
            ),
            parsed_criteria: None,
            retrieval_meta: None,
        },
        TrialDoc {
            nct_id: "NCT10000002".to_string(),
            title: Some("Treatment-Naive Advanced Melanoma Immunotherapy Trial".to_string()),
            brief_summary: Some(
                "Evaluating first-line immunotherapy in patients with unresectable melanoma."
                    .to_string(),
            ),
            detailed_description: None,
            conditions: vec!["Melanoma".to_string()],
            conditions_cuis: vec!["C0025202".to_string()],
            phase: Some("Phase 2".to_string()),
            overall_status: Some("Recruiting".to_string()),
            study_type: Some("Interventional".to_string()),
            min_age_years: Some(18.0),
            max_age_years: Some(85.0),
            sex: Some(Sex::All),
            locations: Vec::new(),
            eligibility_criteria_raw: Some(
                "Inclusion Criteria:\n\
                 - Age 18 to 85 years\n\
                 - Unresectable or metastatic melanoma\n\
                 - Treatment naive patients only\n\
                 - ECOG up to 1\n\
                 Exclusion Criteria:\n\
                 - History of autoimmune disease\n\
                 - Active infection requiring systemic therapy"
                    .to_string(),
            ),
            parsed_criteria: None,
            retrieval_meta: None,
        },
        TrialDoc {
            nct_id: "NCT10000003".to_string(),
            title: Some("Adjuvant Therapy for Early-Stage Breast Cancer".to_string()),
            brief_summary: Some(
                "A trial of adjuvant endocrine therapy for women with early-stage breast cancer."
                    .to_string(),
            ),
            detailed_description: None,
            conditions: vec!["Breast_Cancer".to_string()],
            conditions_cuis: vec!["C0006142".to_string()],
            phase: Some("Phase 4".to_string()),
            overall_status: Some("Active, not recruiting".to_string()),
            study_type: Some("Interventional".to_string()),
            min_age_years: Some(18.0),
            max_age_years: Some(120.0),
            sex: Some(Sex::Female),
            locations: Vec::new(),
            eligibility_criteria_raw: Some(
                "Inclusion Criteria:\n\
                 - Women at least 18 years of age\n\
                 - Early-stage breast cancer, surgically resected\n\
                 - At least 4 weeks since last surgery\n\
                 Exclusion Criteria:\n\
                 - Pregnant women\n\
                 - Prior malignancy within 5 years"
                    .to_string(),
            ),
            parsed_criteria: None,
            retrieval_meta: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_corpus_has_distinct_nct_ids() {
        let corpus = sample_corpus();
        let mut ids: Vec<&str> = corpus.iter().map(|d| d.nct_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), corpus.len());
    }

    #[test]
    fn sample_dictionary_classifies_gene_as_biomarker() {
        let dict = sample_dictionary();
        assert!(dict.biomarkers().any(|e| e.canonical_key == "EGFR_Gene"));
        assert!(dict.diseases().any(|e| e.canonical_key == "NSCLC"));
    }
}
