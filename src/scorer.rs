//! Feasibility scoring of a parsed trial against a patient profile: a nine-rule
//! ordered evaluation producing a 0-100 score, a trivalent verdict, and reasons.

use std::collections::HashSet;

use crate::model::{Feasibility, ParsedCriteria, PatientProfile, TrialMetadata};

const CONDITION_MATCH_WEIGHT: u32 = 40;
const CONDITION_UNCLEAR_WEIGHT: u32 = 5;
const BIOMARKER_MATCH_WEIGHT: u32 = 25;
const ECOG_MATCH_WEIGHT: u32 = 15;
const LAB_PASS_WEIGHT: u32 = 5;
const LAB_CAP: u32 = 15;
const AGE_MATCH_WEIGHT: u32 = 5;
const SEX_MATCH_WEIGHT: u32 = 5;
const WASHOUT_MATCH_WEIGHT: u32 = 5;
const LINES_MATCH_WEIGHT: u32 = 10;

/// Result of scoring one trial against one profile.
#[derive(Debug, Clone)]
pub struct FeasibilityResult {
    pub score: u8,
    pub is_feasible: Feasibility,
    pub reasons: Vec<String>,
}

/// Evaluates `parsed` (merged with `metadata`, which the caller is expected to have
/// already applied during parsing) against `profile`, following a fixed nine-rule
/// order. `patient_cuis` is the once-computed CUI set for the profile's conditions;
/// pass an empty set when no linker is wired up.
pub fn score(
    profile: &PatientProfile,
    parsed: &ParsedCriteria,
    _metadata: &TrialMetadata,
    patient_cuis: &HashSet<String>,
) -> FeasibilityResult {
    let mut reasons = Vec::new();

    // Rule 1: hard exclusion short-circuit.
    let patient_terms = profile.conditions_and_history_lower();
    for exclusion in &parsed.hard_exclusions {
        if patient_terms
            .iter()
            .any(|term| term == &exclusion.to_lowercase())
        {
            return FeasibilityResult {
                score: 0,
                is_feasible: Feasibility::False,
                reasons: vec![format!("Hard Exclusion: {exclusion}")],
            };
        }
    }

    let mut total: u32 = 0;
    let mut feasible = true;

    // Rule 2: condition match.
    if profile.conditions.is_empty() {
        total += CONDITION_UNCLEAR_WEIGHT;
        reasons.push("Condition relevance unclear: no patient conditions provided".to_string());
    } else {
        let cui_overlap = !patient_cuis.is_empty()
            && !parsed.required_conditions_cuis.is_empty()
            && patient_cuis
                .iter()
                .any(|cui| parsed.required_conditions_cuis.contains(cui));
        let substring_overlap = cui_overlap
            || {
                let patient_lower: Vec<String> =
                    profile.conditions.iter().map(|c| c.to_lowercase()).collect();
                parsed
                    .required_conditions
                    .iter()
                    .any(|c| patient_lower.iter().any(|p| p.contains(&c.to_lowercase()) || c.to_lowercase().contains(p)))
            };
        if substring_overlap {
            total += CONDITION_MATCH_WEIGHT;
            reasons.push("Condition match".to_string());
        } else {
            feasible = false;
            reasons.push("No matching condition found".to_string());
        }
    }

    // Rule 3: biomarker match.
    if !parsed.required_biomarkers.is_empty() {
        let patient_biomarkers_lower: HashSet<String> =
            profile.biomarkers.iter().map(|b| b.to_lowercase()).collect();
        let hit = parsed
            .required_biomarkers
            .iter()
            .any(|b| patient_biomarkers_lower.contains(&b.to_lowercase()));
        if hit {
            total += BIOMARKER_MATCH_WEIGHT;
            reasons.push("Biomarker match".to_string());
        }
    }

    // Rule 4: ECOG.
    if !parsed.ecog_allowed.is_empty() {
        if let Some(ecog) = profile.ecog_score {
            if parsed.ecog_allowed.contains(&ecog) {
                total += ECOG_MATCH_WEIGHT;
                reasons.push(format!("ECOG {ecog} within allowed range"));
            } else {
                feasible = false;
                reasons.push(format!("ECOG {ecog} outside allowed range"));
            }
        }
    }

    // Rule 5: lab thresholds, capped.
    let mut lab_total: u32 = 0;
    for rule in &parsed.lab_rules {
        let Some(&value) = profile.labs.get(&rule.name) else {
            continue;
        };
        if rule.operator.matches(value, rule.threshold) {
            lab_total = (lab_total + LAB_PASS_WEIGHT).min(LAB_CAP);
            reasons.push(format!(
                "{} {} {} passes ({value})",
                rule.name,
                rule.operator.as_str(),
                rule.threshold
            ));
        } else {
            feasible = false;
            reasons.push(format!(
                "{} fails required {} {} (patient: {value})",
                rule.name,
                rule.operator.as_str(),
                rule.threshold
            ));
        }
    }
    total += lab_total;

    // Rule 6: age.
    if let Some(age) = profile.age_years {
        if age >= parsed.age_range.0 && age <= parsed.age_range.1 {
            total += AGE_MATCH_WEIGHT;
            reasons.push("Age within trial range".to_string());
        } else {
            feasible = false;
            reasons.push(format!(
                "Age {age} outside trial range [{}, {}]",
                parsed.age_range.0, parsed.age_range.1
            ));
        }
    }

    // Rule 7: sex.
    if let Some(sex) = profile.sex {
        match parsed.sex {
            Some(crate::model::Sex::All) | None => {
                total += SEX_MATCH_WEIGHT;
                reasons.push("Sex: trial open to all".to_string());
            }
            Some(trial_sex) if trial_sex == sex => {
                total += SEX_MATCH_WEIGHT;
                reasons.push("Sex match".to_string());
            }
            Some(_) => {
                feasible = false;
                reasons.push("Sex mismatch".to_string());
            }
        }
    }

    // Rule 8: temporal washout.
    if let Some(days_since) = profile.days_since_last_treatment {
        if let Some(required) = parsed
            .temporal_rules
            .iter()
            .find(|t| t.description == "chemo_washout")
            .map(|t| t.min_days)
        {
            if days_since >= required {
                total += WASHOUT_MATCH_WEIGHT;
                reasons.push("Washout period satisfied".to_string());
            } else {
                feasible = false;
                reasons.push(format!(
                    "Washout not satisfied: {days_since} days since last treatment, {required} required"
                ));
            }
        }
    }

    // Rule 9: lines of therapy.
    if let Some(prior_lines) = profile.prior_lines_of_therapy {
        if let Some(bounds) = &parsed.lines_of_therapy {
            let min = bounds.min_lines.unwrap_or(0);
            let max = bounds.max_lines.unwrap_or(u32::MAX);
            if prior_lines >= min && prior_lines <= max {
                total += LINES_MATCH_WEIGHT;
                reasons.push("Prior lines of therapy within range".to_string());
            } else {
                feasible = false;
                reasons.push(format!(
                    "Prior lines of therapy {prior_lines} outside [{min}, {max}]"
                ));
            }
        }
    }

    let mut score = total.min(100) as u8;
    if !feasible {
        score = 0;
    }

    FeasibilityResult {
        score,
        is_feasible: if feasible {
            Feasibility::True
        } else {
            Feasibility::False
        },
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabRule, LinesOfTherapy, Operator, Sex};

    fn empty_profile() -> PatientProfile {
        PatientProfile::default()
    }

    #[test]
    fn hard_exclusion_short_circuits_to_zero() {
        let profile = PatientProfile {
            conditions: vec!["Pregnancy".to_string()],
            ..empty_profile()
        };
        let mut parsed = ParsedCriteria::empty();
        parsed.hard_exclusions = vec!["Pregnancy".to_string()];
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.score, 0);
        assert_eq!(result.is_feasible, Feasibility::False);
        assert_eq!(result.reasons, vec!["Hard Exclusion: Pregnancy".to_string()]);
    }

    #[test]
    fn condition_only_relevance_scenario_reaches_at_least_fifty() {
        let profile = PatientProfile {
            age_years: Some(60.0),
            sex: Some(Sex::Male),
            conditions: vec!["NSCLC".to_string()],
            ..empty_profile()
        };
        let mut parsed = ParsedCriteria::empty();
        parsed.required_conditions = vec!["NSCLC".to_string()];
        parsed.age_range = (18.0, 99.0);
        parsed.sex = Some(Sex::All);
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.is_feasible, Feasibility::True);
        assert!(result.score >= 50);
    }

    #[test]
    fn ecog_gate_rejects_out_of_range_score() {
        let profile = PatientProfile {
            ecog_score: Some(2),
            ..empty_profile()
        };
        let mut parsed = ParsedCriteria::empty();
        parsed.ecog_allowed = vec![0, 1];
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.is_feasible, Feasibility::False);
        assert_eq!(result.score, 0);
        assert!(result.reasons.iter().any(|r| r.contains("ECOG")));
    }

    #[test]
    fn lab_failure_is_reported_and_forces_infeasible() {
        let mut profile = empty_profile();
        profile.labs.insert("Creatinine".to_string(), 2.0);
        let mut parsed = ParsedCriteria::empty();
        parsed.lab_rules = vec![LabRule {
            name: "Creatinine".to_string(),
            operator: Operator::Lt,
            threshold: 1.5,
            unit: "mg/dl".to_string(),
        }];
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.is_feasible, Feasibility::False);
        assert!(result.reasons.iter().any(|r| r.contains("fails")));
    }

    #[test]
    fn lab_score_is_capped_at_fifteen() {
        let mut profile = empty_profile();
        profile.labs.insert("A".to_string(), 1.0);
        profile.labs.insert("B".to_string(), 1.0);
        profile.labs.insert("C".to_string(), 1.0);
        profile.labs.insert("D".to_string(), 1.0);
        let mut parsed = ParsedCriteria::empty();
        parsed.lab_rules = vec!["A", "B", "C", "D"]
            .into_iter()
            .map(|name| LabRule {
                name: name.to_string(),
                operator: Operator::Le,
                threshold: 5.0,
                unit: String::new(),
            })
            .collect();
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.score, 15);
    }

    #[test]
    fn lines_of_therapy_outside_bounds_is_infeasible() {
        let profile = PatientProfile {
            prior_lines_of_therapy: Some(3),
            ..empty_profile()
        };
        let mut parsed = ParsedCriteria::empty();
        parsed.lines_of_therapy = Some(LinesOfTherapy {
            min_lines: None,
            max_lines: Some(1),
        });
        let result = score(&profile, &parsed, &TrialMetadata::default(), &HashSet::new());
        assert_eq!(result.is_feasible, Feasibility::False);
        assert_eq!(result.score, 0);
    }
}
