//! Markdown rendering of ranking/search results and parser/scorer output, using
//! `minijinja` templates for the tabular output.

use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::error::TrialRankError;
use crate::model::{Feasibility, ParsedCriteria, SearchResponse};
use crate::scorer::FeasibilityResult;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

const HITS_TEMPLATE: &str = r#"# Ranked Trials

{% if hits %}
| # | NCT ID | Title | Feasibility | Score | Final |
|---|--------|-------|-------------|-------|-------|
{% for hit in hits -%}
| {{ loop.index }} | {{ hit.nct_id }} | {{ hit.title }} | {{ hit.feasibility }} | {{ hit.feasibility_score }} | {{ hit.final_score }} |
{% endfor %}
{%- else %}
_No feasible trials matched this request._
{%- endif %}
"#;

fn env() -> Result<&'static Environment<'static>, TrialRankError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }
    let mut env = Environment::new();
    env.add_template("hits", HITS_TEMPLATE)
        .map_err(|err| TrialRankError::validation(err.to_string()))?;
    match ENV.set(env) {
        Ok(()) => Ok(ENV.get().expect("just set")),
        Err(_) => Ok(ENV.get().expect("race: set by another thread")),
    }
}

fn feasibility_label(feasibility: Feasibility) -> &'static str {
    match feasibility {
        Feasibility::True => "feasible",
        Feasibility::False => "infeasible",
        Feasibility::Undetermined => "undetermined",
    }
}

fn pagination_footer(response: &SearchResponse) -> String {
    let start = (response.page.saturating_sub(1)) * response.page_size;
    let end = start + response.hits.len();
    match response.candidate_total {
        Some(total) if response.hits.is_empty() => format!("Showing 0 of {total} candidates."),
        Some(total) => {
            let truncated_note = if response.truncated {
                " (candidate pool truncated)"
            } else {
                ""
            };
            format!(
                "Showing {}-{} of {total} candidates{truncated_note}. Page {} (size {}).",
                start + 1,
                end,
                response.page,
                response.page_size
            )
        }
        None => format!(
            "Showing {} results (total unknown). Page {} (size {}).",
            response.hits.len(),
            response.page,
            response.page_size
        ),
    }
}

/// Renders a `SearchResponse` as a Markdown table with a pagination footer.
pub fn search_response_markdown(response: &SearchResponse) -> Result<String, TrialRankError> {
    let rows: Vec<_> = response
        .hits
        .iter()
        .map(|hit| {
            context! {
                nct_id => hit.trial.nct_id.clone(),
                title => hit.trial.title.clone().unwrap_or_else(|| "(untitled)".to_string()),
                feasibility => feasibility_label(hit.is_feasible),
                feasibility_score => hit.feasibility_score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                final_score => format!("{:.3}", hit.final_score),
            }
        })
        .collect();

    let tmpl = env()?.get_template("hits").map_err(|err| TrialRankError::validation(err.to_string()))?;
    let mut body = tmpl
        .render(context! { hits => rows })
        .map_err(|err| TrialRankError::validation(err.to_string()))?;

    let footer = pagination_footer(response);
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push('\n');
    body.push_str(&footer);
    body.push('\n');
    Ok(body)
}

/// Renders a `ParsedCriteria` as a short Markdown summary (the `parse` subcommand).
pub fn parsed_criteria_markdown(parsed: &ParsedCriteria) -> String {
    let mut out = String::new();
    out.push_str("# Parsed Eligibility Criteria\n\n");
    out.push_str(&format!(
        "- Age range: {}-{}\n",
        parsed.age_range.0, parsed.age_range.1
    ));
    out.push_str(&format!(
        "- Sex: {}\n",
        parsed
            .sex
            .map(|s| format!("{s:?}"))
            .unwrap_or_else(|| "All".to_string())
    ));
    out.push_str(&format!(
        "- Conditions: {}\n",
        join_or_none(&parsed.required_conditions)
    ));
    out.push_str(&format!(
        "- Biomarkers: {}\n",
        join_or_none(&parsed.required_biomarkers)
    ));
    out.push_str(&format!(
        "- ECOG allowed: {}\n",
        if parsed.ecog_allowed.is_empty() {
            "unconstrained".to_string()
        } else {
            parsed
                .ecog_allowed
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }
    ));
    if !parsed.lab_rules.is_empty() {
        out.push_str("- Lab rules:\n");
        for rule in &parsed.lab_rules {
            out.push_str(&format!(
                "  - {} {} {} {}\n",
                rule.name,
                rule.operator.as_str(),
                rule.threshold,
                rule.unit
            ));
        }
    }
    if let Some(lines) = &parsed.lines_of_therapy {
        out.push_str(&format!(
            "- Prior lines of therapy: [{}, {}]\n",
            lines.min_lines.unwrap_or(0),
            lines
                .max_lines
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        ));
    }
    out.push_str(&format!(
        "- Hard exclusions: {}\n",
        join_or_none(&parsed.hard_exclusions)
    ));
    out
}

/// Renders a `FeasibilityResult` as a short Markdown summary (the `score` subcommand).
pub fn feasibility_result_markdown(result: &FeasibilityResult) -> String {
    let mut out = String::new();
    out.push_str("# Feasibility Result\n\n");
    out.push_str(&format!("- Score: {}\n", result.score));
    out.push_str(&format!(
        "- Feasible: {}\n",
        feasibility_label(result.is_feasible)
    ));
    out.push_str("- Reasons:\n");
    for reason in &result.reasons {
        out.push_str(&format!("  - {reason}\n"));
    }
    out
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hit, RankOptions, Sex, TrialDoc};

    fn sample_doc() -> TrialDoc {
        TrialDoc {
            nct_id: "NCT00000001".to_string(),
            title: Some("A Trial of Something".to_string()),
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
            eligibility_criteria_raw: None,
            parsed_criteria: None,
            retrieval_meta: None,
        }
    }

    #[test]
    fn search_response_markdown_lists_hits_and_footer() {
        let response = SearchResponse {
            hits: vec![Hit {
                trial: sample_doc(),
                rrf_score: 0.5,
                lexical_rank: Some(1),
                dense_rank: None,
                feasibility_score: Some(80),
                is_feasible: Feasibility::True,
                reasons: vec!["Condition match".to_string()],
                parsed_criteria: None,
                final_score: 0.75,
            }],
            total: 1,
            page: 1,
            page_size: RankOptions::default().page_size,
            candidate_total: Some(1),
            truncated: false,
            used_dense_fallback: false,
        };
        let md = search_response_markdown(&response).unwrap();
        assert!(md.contains("NCT00000001"));
        assert!(md.contains("feasible"));
        assert!(md.contains("Showing 1-1 of 1 candidates"));
    }

    #[test]
    fn empty_hits_render_placeholder() {
        let response = SearchResponse {
            hits: Vec::new(),
            total: 0,
            page: 1,
            page_size: RankOptions::default().page_size,
            candidate_total: Some(0),
            truncated: false,
            used_dense_fallback: false,
        };
        let md = search_response_markdown(&response).unwrap();
        assert!(md.contains("No feasible trials matched"));
    }

    #[test]
    fn parsed_criteria_markdown_includes_age_and_conditions() {
        let mut parsed = ParsedCriteria::empty();
        parsed.age_range = (18.0, 75.0);
        parsed.required_conditions = vec!["NSCLC".to_string()];
        let md = parsed_criteria_markdown(&parsed);
        assert!(md.contains("18-75"));
        assert!(md.contains("NSCLC"));
    }
}
