//! Synonym dictionary: canonical key → surface forms, loaded once at init.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::TrialRankError;

const BIOMARKER_SUFFIXES: &[&str] = &[
    "_Gene",
    "_Receptor",
    "_Marker",
    "_Status",
    "_Mutation",
    "_Score",
    "_Level",
    "_Count",
];

#[derive(Debug, Deserialize)]
struct RawDictionary(HashMap<String, Vec<String>>);

/// One canonical entry: its surface forms and whether it denotes a biomarker/lab
/// (suffix-classified) rather than a disease.
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub canonical_key: String,
    pub surface_forms: Vec<String>,
    pub is_biomarker: bool,
}

/// The loaded synonym dictionary, shared read-only across requests after init.
#[derive(Debug, Clone, Default)]
pub struct SynonymDictionary {
    entries: Vec<DictionaryEntry>,
}

fn classify(key: &str) -> bool {
    BIOMARKER_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

impl SynonymDictionary {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, TrialRankError> {
        let parsed: RawDictionary = serde_json::from_str(raw)?;
        let entries = parsed
            .0
            .into_iter()
            .map(|(canonical_key, surface_forms)| {
                let is_biomarker = classify(&canonical_key);
                DictionaryEntry {
                    canonical_key,
                    surface_forms,
                    is_biomarker,
                }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, TrialRankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn diseases(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.iter().filter(|e| !e.is_biomarker)
    }

    pub fn biomarkers(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.iter().filter(|e| e.is_biomarker)
    }

    /// Maps a free-form string to its canonical key via exact (case-insensitive)
    /// surface-form match, keeping the original if no mapping exists.
    pub fn canonicalize(&self, term: &str) -> String {
        let lowered = term.to_lowercase();
        for entry in &self.entries {
            if entry.canonical_key.to_lowercase() == lowered
                || entry
                    .surface_forms
                    .iter()
                    .any(|form| form.to_lowercase() == lowered)
            {
                return entry.canonical_key.clone();
            }
        }
        term.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "NSCLC": ["non-small cell lung cancer", "non small cell lung cancer"],
        "EGFR_Gene": ["EGFR", "epidermal growth factor receptor"]
    }"#;

    #[test]
    fn classifies_gene_suffix_as_biomarker() {
        let dict = SynonymDictionary::from_json_str(SAMPLE).unwrap();
        assert_eq!(dict.biomarkers().count(), 1);
        assert_eq!(dict.diseases().count(), 1);
    }

    #[test]
    fn canonicalize_matches_surface_form_case_insensitively() {
        let dict = SynonymDictionary::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            dict.canonicalize("Non-Small Cell Lung Cancer"),
            "NSCLC"
        );
    }

    #[test]
    fn canonicalize_keeps_unknown_terms_as_is() {
        let dict = SynonymDictionary::from_json_str(SAMPLE).unwrap();
        assert_eq!(dict.canonicalize("melanoma"), "melanoma");
    }
}
