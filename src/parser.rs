//! Free-text eligibility criteria → `ParsedCriteria`.
//!
//! Covers age/sex/condition/biomarker/ECOG/lab/temporal/lines-of-therapy extraction
//! plus a set of hard-exclusion flags (Cardiac/Renal/Hepatic/Pulmonary_Dysfunction,
//! Autoimmune_Disease, Active_Infection, Bleeding_Disorder, Seizure_Disorder), all
//! following the same word-boundary alternation style.

use std::collections::BTreeSet;

use regex::Regex;
use std::sync::LazyLock;

use crate::dictionary::SynonymDictionary;
use crate::model::{LabRule, LinesOfTherapy, Operator, ParsedCriteria, Temporal, TrialMetadata};

static MIN_AGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:≥|>=|at least|age|>\s*):?\s*(\d{1,3})\s*(?:years|yrs|y\.o\.|yo)").unwrap()
});
static MAX_AGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:≤|<=|up to|younger than):?\s*(\d{1,3})\s*(?:years|yrs|y\.o\.|yo)").unwrap()
});
static FEMALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(women|female|females)\b").unwrap());
static MALE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(men|male|males)\b").unwrap());

static ECOG_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:ecog|zubrod|who).*?status.*?(\d)\s*(?:-|to)\s*(\d)").unwrap()
});
static ECOG_LE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:ecog|zubrod|who).*?(?:≤|<=|up to|less than).*?(\d)").unwrap()
});
static ECOG_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:ecog|zubrod|who).*?(\d)(?:\s*or\s*|\s*,\s*)(\d)").unwrap()
});

static LAB_OP_TAIL: &str = r"(>|>=|<|<=|≥|≤|greater than|less than|equals|up to)\s*(\d+(?:\.\d+)?)\s*([a-z/]+)?";

static CHEMO_WASHOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(day|week|month)s?.*?since.*?(chemo|treatment|therapy)").unwrap()
});
static SURGERY_WASHOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(day|week|month)s?.*?since.*?(surger|operation)").unwrap()
});

static TREATMENT_NAIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:treatment|chemo|therapy)\s*(?:na[iï]ve|free)\b").unwrap());
static LINES_MIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:received|at least|>=)\s*(\d+)\s*(?:prior)?\s*(?:lines|regimens|therapies)")
        .unwrap()
});
static LINES_MAX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:no more than|up to|<=)\s*(\d+)\s*(?:prior)?\s*(?:lines|regimens|therapies)")
        .unwrap()
});

static CNS_METS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(brain|cns|central nervous system)\s*(metastas|mets|tumor)").unwrap());
static HIV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(hiv|human immunodeficiency virus|aids)\b").unwrap());
static HEPATITIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(hepatitis|hbv|hcv)\b").unwrap());
static PREGNANCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(pregnant|pregnancy|lactating|nursing|breastfeeding)\b").unwrap());
static PRIOR_MALIGNANCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(prior|history of|other)\s*(malignan|cancer|tumor)").unwrap());
static CARDIAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(cardiac|heart failure|myocardial infarction|arrhythmia)\b").unwrap()
});
static RENAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(renal (?:failure|impairment|insufficiency)|dialysis)\b").unwrap());
static HEPATIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(hepatic (?:failure|impairment|insufficiency)|cirrhosis)\b").unwrap()
});
static PULMONARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(pulmonary (?:fibrosis|failure|insufficiency)|copd)\b").unwrap()
});
static AUTOIMMUNE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(autoimmune disease|lupus|rheumatoid arthritis)\b").unwrap());
static ACTIVE_INFECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bactive (?:infection|systemic infection)\b").unwrap());
static BLEEDING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(bleeding disorder|coagulopathy|hemophilia)\b").unwrap());
static SEIZURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(seizure disorder|epilepsy)\b").unwrap());

const LAB_KEYS: &[&str] = &[
    "Creatinine_Level",
    "GFR_Level",
    "Bilirubin_Level",
    "AST_Level",
    "ALT_Level",
    "PSA_Level",
];

fn strip_suffix(key: &str) -> String {
    key.replace("_Gene", "")
        .replace("_Receptor", "")
        .replace("_Level", "")
}

fn to_days(value: u32, unit: &str) -> u32 {
    if unit.starts_with("week") {
        value * 7
    } else if unit.starts_with("month") {
        value * 30
    } else {
        value
    }
}

fn word_boundary_pattern(term: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(&term.to_lowercase()))).ok()
}

/// Parses free-text eligibility criteria into structured form. Pure given
/// `(text, metadata, dictionary)`.
pub fn parse(eligibility_text: &str, metadata: &TrialMetadata, dictionary: &SynonymDictionary) -> ParsedCriteria {
    let mut criteria = ParsedCriteria::empty();
    if eligibility_text.trim().is_empty() {
        apply_metadata_override(&mut criteria, metadata);
        criteria.enforce_disjoint_conditions();
        return criteria;
    }

    let text_lower = eligibility_text.to_lowercase();
    let (inclusion_text, exclusion_text) = split_inclusion_exclusion(&text_lower);

    criteria.age_range = extract_age(&text_lower);
    criteria.sex = Some(extract_sex(&text_lower));
    criteria.required_conditions = extract_conditions(inclusion_text, dictionary);
    criteria.required_biomarkers = extract_biomarkers(&text_lower, dictionary);
    criteria.ecog_allowed = extract_ecog(&text_lower);
    criteria.lab_rules = extract_labs(&text_lower, dictionary);
    criteria.temporal_rules = extract_temporal(&text_lower);
    criteria.lines_of_therapy = Some(extract_lines(&text_lower));
    criteria.hard_exclusions = extract_exclusions(&text_lower, exclusion_text, dictionary);

    apply_metadata_override(&mut criteria, metadata);
    criteria.enforce_disjoint_conditions();
    criteria
}

/// Splits on the "exclusion criteria" heading (or plain "exclusions"); text before is
/// inclusion, text after is exclusion. Falls back to treating the whole text as
/// inclusion when neither heading is found.
fn split_inclusion_exclusion(text_lower: &str) -> (&str, &str) {
    if let Some(idx) = text_lower.find("exclusion criteria") {
        let (before, after) = text_lower.split_at(idx);
        return (before, &after["exclusion criteria".len()..]);
    }
    if let Some(idx) = text_lower.find("exclusions") {
        let (before, after) = text_lower.split_at(idx);
        return (before, &after["exclusions".len()..]);
    }
    (text_lower, "")
}

fn extract_age(text: &str) -> (f64, f64) {
    let mut min_age = 0.0_f64;
    let mut max_age = 120.0_f64;
    if let Some(caps) = MIN_AGE_RE.captures(text) {
        if let Ok(v) = caps[1].parse::<f64>() {
            min_age = v;
        }
    }
    if let Some(caps) = MAX_AGE_RE.captures(text) {
        if let Ok(v) = caps[1].parse::<f64>() {
            max_age = v;
        }
    }
    if min_age > 120.0 {
        min_age = 0.0;
    }
    if max_age > 120.0 {
        max_age = 120.0;
    }
    if min_age > max_age {
        max_age = 120.0;
    }
    (min_age, max_age)
}

fn extract_sex(text: &str) -> crate::model::Sex {
    let has_female = FEMALE_RE.is_match(text);
    let has_male = MALE_RE.is_match(text);
    if has_female && !has_male {
        crate::model::Sex::Female
    } else if has_male && !has_female {
        crate::model::Sex::Male
    } else {
        crate::model::Sex::All
    }
}

fn extract_conditions(text: &str, dictionary: &SynonymDictionary) -> Vec<String> {
    let mut found = Vec::new();
    for entry in dictionary.diseases() {
        for term in &entry.surface_forms {
            if let Some(re) = word_boundary_pattern(term) {
                if re.is_match(text) {
                    found.push(entry.canonical_key.clone());
                    break;
                }
            }
        }
    }
    found
}

fn extract_biomarkers(text: &str, dictionary: &SynonymDictionary) -> Vec<String> {
    let mut found = Vec::new();
    for entry in dictionary.biomarkers() {
        for term in &entry.surface_forms {
            if let Some(re) = word_boundary_pattern(term) {
                if re.is_match(text) {
                    found.push(strip_suffix(&entry.canonical_key));
                    break;
                }
            }
        }
    }
    found
}

fn extract_ecog(text: &str) -> Vec<u8> {
    let mut allowed: BTreeSet<u8> = BTreeSet::new();
    if let Some(caps) = ECOG_RANGE_RE.captures(text) {
        let start: u8 = caps[1].parse().unwrap_or(0);
        let end: u8 = caps[2].parse().unwrap_or(0);
        if start <= end && end <= 5 {
            allowed.extend(start..=end);
        }
    }
    if let Some(caps) = ECOG_LE_RE.captures(text) {
        let limit: u8 = caps[1].parse().unwrap_or(0);
        if limit <= 5 {
            allowed.extend(0..=limit);
        }
    }
    if allowed.is_empty() {
        if let Some(caps) = ECOG_LIST_RE.captures(text) {
            if let (Ok(a), Ok(b)) = (caps[1].parse::<u8>(), caps[2].parse::<u8>()) {
                allowed.insert(a);
                allowed.insert(b);
            }
        }
    }
    allowed.into_iter().collect()
}

fn normalize_lab_operator(raw: &str) -> Operator {
    if raw.contains("greater") || raw.contains('>') || raw.contains('≥') {
        Operator::Ge
    } else if raw.contains("less") || raw.contains('<') || raw.contains('≤') || raw.contains("up to") {
        Operator::Le
    } else {
        Operator::Eq
    }
}

fn extract_labs(text: &str, dictionary: &SynonymDictionary) -> Vec<LabRule> {
    let mut labs = Vec::new();
    for key in LAB_KEYS {
        let surface_forms = dictionary
            .biomarkers()
            .find(|e| e.canonical_key == *key)
            .map(|e| e.surface_forms.clone())
            .unwrap_or_default();
        let clean_name = strip_suffix(key);
        for term in &surface_forms {
            let pattern = format!(
                r"\b{}\b.{{0,20}}?{}",
                regex::escape(&term.to_lowercase()),
                LAB_OP_TAIL
            );
            let Ok(re) = Regex::new(&pattern) else {
                continue;
            };
            if let Some(caps) = re.captures(text) {
                let raw_op = &caps[1];
                let Ok(value) = caps[2].parse::<f64>() else {
                    continue;
                };
                let unit = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                labs.push(LabRule {
                    name: clean_name.clone(),
                    operator: normalize_lab_operator(raw_op),
                    threshold: value,
                    unit,
                });
                break;
            }
        }
    }
    labs
}

fn extract_temporal(text: &str) -> Vec<Temporal> {
    let mut temporal = Vec::new();
    if let Some(caps) = CHEMO_WASHOUT_RE.captures(text) {
        if let Ok(value) = caps[1].parse::<u32>() {
            temporal.push(Temporal {
                description: "chemo_washout".to_string(),
                min_days: to_days(value, &caps[2]),
            });
        }
    }
    if let Some(caps) = SURGERY_WASHOUT_RE.captures(text) {
        if let Ok(value) = caps[1].parse::<u32>() {
            temporal.push(Temporal {
                description: "surgery_washout".to_string(),
                min_days: to_days(value, &caps[2]),
            });
        }
    }
    temporal
}

fn extract_lines(text: &str) -> LinesOfTherapy {
    if TREATMENT_NAIVE_RE.is_match(text) {
        return LinesOfTherapy {
            min_lines: None,
            max_lines: Some(0),
        };
    }
    let min_lines = LINES_MIN_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok());
    let max_lines = LINES_MAX_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok());
    LinesOfTherapy {
        min_lines,
        max_lines,
    }
}

fn extract_exclusions(
    full_text: &str,
    exclusion_half: &str,
    dictionary: &SynonymDictionary,
) -> Vec<String> {
    let mut flags = Vec::new();
    let checks: &[(&LazyLock<Regex>, &str)] = &[
        (&CNS_METS_RE, "CNS_Mets"),
        (&HIV_RE, "HIV"),
        (&HEPATITIS_RE, "Hepatitis"),
        (&PREGNANCY_RE, "Pregnancy"),
        (&PRIOR_MALIGNANCY_RE, "Prior_Malignancy"),
        (&CARDIAC_RE, "Cardiac_Dysfunction"),
        (&RENAL_RE, "Renal_Dysfunction"),
        (&HEPATIC_RE, "Hepatic_Dysfunction"),
        (&PULMONARY_RE, "Pulmonary_Dysfunction"),
        (&AUTOIMMUNE_RE, "Autoimmune_Disease"),
        (&ACTIVE_INFECTION_RE, "Active_Infection"),
        (&BLEEDING_RE, "Bleeding_Disorder"),
        (&SEIZURE_RE, "Seizure_Disorder"),
    ];
    for (re, flag) in checks {
        if re.is_match(full_text) {
            flags.push(flag.to_string());
        }
    }
    for condition in extract_conditions(exclusion_half, dictionary) {
        if !flags.contains(&condition) {
            flags.push(condition);
        }
    }
    flags
}

/// Applies structured trial metadata over parsed values: numeric age bounds and sex
/// replace parsed values when present; structured conditions are unioned in; CUIs are
/// attached verbatim.
///
/// Exposed beyond this module so the orchestrator can re-apply it to a trial's cached
/// `parsed_criteria`, not just criteria freshly parsed here: a cached parse predates
/// this request's metadata, but the override must still be current (SPEC_FULL §9).
pub fn apply_metadata_override(criteria: &mut ParsedCriteria, metadata: &TrialMetadata) {
    if let Some(min) = metadata.min_age_years {
        criteria.age_range.0 = min;
    }
    if let Some(max) = metadata.max_age_years {
        criteria.age_range.1 = max;
    }
    if let Some(sex) = metadata.sex {
        criteria.sex = Some(sex);
    }
    for condition in &metadata.conditions {
        if !criteria.required_conditions.contains(condition) {
            criteria.required_conditions.push(condition.clone());
        }
    }
    criteria.required_conditions_cuis = metadata.conditions_cuis.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sex;

    fn dict() -> SynonymDictionary {
        SynonymDictionary::from_json_str(
            r#"{
                "NSCLC": ["non-small cell lung cancer", "nsclc"],
                "EGFR_Gene": ["egfr", "epidermal growth factor receptor"],
                "Creatinine_Level": ["creatinine"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn extracts_age_bounds_and_clamps_to_120() {
        let text = "patients at least 18 years and up to 75 years of age";
        let (lo, hi) = extract_age(text);
        assert_eq!(lo, 18.0);
        assert_eq!(hi, 75.0);
    }

    #[test]
    fn min_greater_than_max_discards_max() {
        let text = "at least 90 years, up to 30 years";
        let (lo, hi) = extract_age(text);
        assert_eq!(lo, 90.0);
        assert_eq!(hi, 120.0);
    }

    #[test]
    fn both_sexes_present_yields_all() {
        let text = "open to men and women";
        assert_eq!(extract_sex(text), Sex::All);
    }

    #[test]
    fn female_only_tokens_yield_female() {
        assert_eq!(extract_sex("females only"), Sex::Female);
    }

    #[test]
    fn parses_condition_and_biomarker_from_inclusion_text() {
        let text = "eligible: non-small cell lung cancer with EGFR mutation.\nexclusion criteria:\npregnant patients";
        let criteria = parse(text, &TrialMetadata::default(), &dict());
        assert_eq!(criteria.required_conditions, vec!["NSCLC".to_string()]);
        assert_eq!(criteria.required_biomarkers, vec!["EGFR".to_string()]);
        assert!(criteria.hard_exclusions.contains(&"Pregnancy".to_string()));
    }

    #[test]
    fn ecog_range_expands_inclusive() {
        let scores = extract_ecog("ecog performance status 0-2 required");
        assert_eq!(scores, vec![0, 1, 2]);
    }

    #[test]
    fn ecog_le_expands_from_zero() {
        let scores = extract_ecog("ecog up to 1");
        assert_eq!(scores, vec![0, 1]);
    }

    #[test]
    fn lab_rule_parses_operator_value_and_unit() {
        let text = "creatinine < 1.5 mg/dl required";
        let labs = extract_labs(text, &dict());
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].name, "Creatinine");
        assert_eq!(labs[0].threshold, 1.5);
        assert_eq!(labs[0].unit, "mg/dl");
        assert!(matches!(labs[0].operator, Operator::Le));
    }

    #[test]
    fn chemo_washout_converts_weeks_to_days() {
        let temporal = extract_temporal("at least 4 weeks since last chemo");
        assert_eq!(temporal[0].min_days, 28);
    }

    #[test]
    fn treatment_naive_sets_max_lines_zero() {
        let lines = extract_lines("treatment naive patients only");
        assert_eq!(lines.max_lines, Some(0));
        assert_eq!(lines.min_lines, None);
    }

    #[test]
    fn metadata_override_replaces_age_and_sex_and_unions_conditions() {
        let mut criteria = ParsedCriteria::empty();
        criteria.required_conditions = vec!["NSCLC".to_string()];
        let metadata = TrialMetadata {
            min_age_years: Some(21.0),
            max_age_years: Some(80.0),
            sex: Some(Sex::Female),
            conditions: vec!["Melanoma".to_string()],
            conditions_cuis: vec!["C0025202".to_string()],
        };
        apply_metadata_override(&mut criteria, &metadata);
        assert_eq!(criteria.age_range, (21.0, 80.0));
        assert_eq!(criteria.sex, Some(Sex::Female));
        assert!(criteria.required_conditions.contains(&"Melanoma".to_string()));
        assert_eq!(criteria.required_conditions_cuis, vec!["C0025202".to_string()]);
    }

    #[test]
    fn empty_text_with_metadata_still_applies_override() {
        let metadata = TrialMetadata {
            min_age_years: Some(18.0),
            ..Default::default()
        };
        let criteria = parse("", &metadata, &dict());
        assert_eq!(criteria.age_range.0, 18.0);
    }
}
