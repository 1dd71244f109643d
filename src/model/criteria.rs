//! Structured eligibility criteria produced by the parser.

use serde::{Deserialize, Serialize};

/// Comparison operator for a lab threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Operator {
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => (value - threshold).abs() < f64::EPSILON,
            Operator::Ge => value >= threshold,
            Operator::Gt => value > threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
        }
    }
}

/// A single lab-value requirement, e.g. "ANC >= 1500/uL".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabRule {
    pub name: String,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default)]
    pub unit: String,
}

/// A washout or other temporal requirement, e.g. "no prior therapy within 4 weeks".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Temporal {
    pub description: String,
    pub min_days: u32,
}

/// Lower/upper bound on prior lines of systemic therapy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinesOfTherapy {
    #[serde(default)]
    pub min_lines: Option<u32>,
    #[serde(default)]
    pub max_lines: Option<u32>,
}

/// Structured criteria extracted from free-text eligibility plus any trial metadata
/// override.
///
/// Invariants: `0 <= age_range.0 <= age_range.1 <= 120`; `ecog_allowed` values are all
/// in `0..=5`; `required_conditions` and `excluded_conditions` are disjoint (a condition
/// named in both is dropped from `excluded_conditions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCriteria {
    pub age_range: (f64, f64),
    #[serde(default)]
    pub sex: Option<super::trial::Sex>,
    #[serde(default)]
    pub required_conditions: Vec<String>,
    #[serde(default)]
    pub required_conditions_cuis: Vec<String>,
    #[serde(default)]
    pub required_biomarkers: Vec<String>,
    #[serde(default)]
    pub ecog_allowed: Vec<u8>,
    #[serde(default)]
    pub lab_rules: Vec<LabRule>,
    #[serde(default)]
    pub temporal_rules: Vec<Temporal>,
    #[serde(default)]
    pub lines_of_therapy: Option<LinesOfTherapy>,
    #[serde(default)]
    pub hard_exclusions: Vec<String>,
}

impl ParsedCriteria {
    pub fn empty() -> Self {
        Self {
            age_range: (0.0, 120.0),
            sex: None,
            required_conditions: Vec::new(),
            required_conditions_cuis: Vec::new(),
            required_biomarkers: Vec::new(),
            ecog_allowed: Vec::new(),
            lab_rules: Vec::new(),
            temporal_rules: Vec::new(),
            lines_of_therapy: None,
            hard_exclusions: Vec::new(),
        }
    }

    /// Enforces the disjointness invariant: a condition found in the exclusion section
    /// never also counts as a hard-exclusion flag once it has already been recognized
    /// as a required (inclusion-derived) condition.
    pub fn enforce_disjoint_conditions(&mut self) {
        let required = self.required_conditions.clone();
        self.hard_exclusions.retain(|c| !required.contains(c));
    }
}

impl Default for ParsedCriteria {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_matches_boundaries() {
        assert!(Operator::Ge.matches(1500.0, 1500.0));
        assert!(!Operator::Gt.matches(1500.0, 1500.0));
        assert!(Operator::Lt.matches(0.9, 1.0));
    }

    #[test]
    fn enforce_disjoint_conditions_drops_overlap() {
        let mut criteria = ParsedCriteria::empty();
        criteria.required_conditions = vec!["melanoma".to_string()];
        criteria.hard_exclusions = vec!["melanoma".to_string(), "leukemia".to_string()];
        criteria.enforce_disjoint_conditions();
        assert_eq!(criteria.hard_exclusions, vec!["leukemia".to_string()]);
    }

    #[test]
    fn empty_criteria_has_full_age_range() {
        let criteria = ParsedCriteria::empty();
        assert_eq!(criteria.age_range, (0.0, 120.0));
    }
}
