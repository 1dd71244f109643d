//! Demonstration/operator CLI: exercises `Rank`/`Search`/`Parse`/`Score` against
//! local fixtures or a configured lexical backend. Has no network listener of its
//! own — it's a thin client over the library, not a server.

pub mod fixtures;
pub mod health;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dictionary::SynonymDictionary;
use crate::model::{PatientProfile, RankFilters, RankOptions, TrialMetadata};
use crate::orchestrator::Orchestrator;
use crate::render;
use crate::retrieval::{
    DenseIndex, FlatInnerProductIndex, HashingEncoder, HttpLexicalIndex, LexicalIndex,
    StaticLexicalIndex,
};

#[derive(Parser)]
#[command(
    name = "trialrank",
    version,
    about = "Rank and search clinical trials against a patient profile (demonstration CLI)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank trials against a patient profile.
    Rank(RankArgs),
    /// Search trials by free-text query, without feasibility scoring.
    Search(SearchArgs),
    /// Parse free-text eligibility criteria into structured form.
    Parse(ParseArgs),
    /// Score a single trial's parsed criteria against a patient profile.
    Score(ScoreArgs),
    /// Check lexical backend reachability and dense artifact readiness.
    Health(HealthArgs),
}

#[derive(Args)]
struct BackendArgs {
    /// Use a live HTTP lexical backend instead of the bundled sample corpus.
    #[arg(long)]
    live: bool,
    /// Lexical backend base URL (overrides TRIALRANK_LEXICAL_BASE).
    #[arg(long)]
    lexical_base: Option<String>,
    /// Dense vector index file path (overrides TRIALRANK_DENSE_INDEX_PATH).
    #[arg(long)]
    dense_index: Option<PathBuf>,
    /// Dense metadata sidecar path (overrides TRIALRANK_DENSE_META_PATH).
    #[arg(long)]
    dense_meta: Option<PathBuf>,
    /// Synonym dictionary path (overrides TRIALRANK_SYNONYM_DICT; falls back to the
    /// bundled sample dictionary when unset and the file does not exist).
    #[arg(long)]
    dictionary: Option<PathBuf>,
}

#[derive(Args)]
pub struct RankArgs {
    #[command(flatten)]
    backend: BackendArgs,
    /// Path to a JSON-encoded PatientProfile.
    #[arg(long)]
    profile: PathBuf,
    #[arg(long)]
    phase: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    condition: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long, default_value_t = 1000)]
    candidate_size: usize,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 10)]
    size: usize,
    #[arg(long, default_value_t = 0.6)]
    feasibility_weight: f64,
    #[arg(long, default_value_t = 0.5)]
    bm25_weight: f64,
    /// Print raw JSON instead of a Markdown table.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    #[command(flatten)]
    backend: BackendArgs,
    /// Free-text query; omit for a match-all search.
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    phase: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    condition: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 10)]
    size: usize,
    #[arg(long, default_value_t = 0.5)]
    bm25_weight: f64,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ParseArgs {
    /// Path to a plain-text file containing eligibility criteria.
    #[arg(long)]
    file: PathBuf,
    /// Merge in structured metadata from this sample-corpus trial, if present.
    #[arg(long)]
    trial: Option<String>,
    #[arg(long)]
    dictionary: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Path to a JSON-encoded PatientProfile.
    #[arg(long)]
    profile: PathBuf,
    /// NCT id of a trial in the bundled sample corpus to score against.
    #[arg(long)]
    trial: String,
    #[arg(long)]
    dictionary: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct HealthArgs {
    #[arg(long)]
    json: bool,
}

fn load_dictionary(override_path: &Option<PathBuf>) -> Result<SynonymDictionary> {
    let path = override_path.clone().or_else(|| {
        std::env::var("TRIALRANK_SYNONYM_DICT")
            .ok()
            .map(PathBuf::from)
    });
    match path {
        Some(path) if path.exists() => SynonymDictionary::load(&path)
            .with_context(|| format!("loading synonym dictionary from {}", path.display())),
        _ => Ok(fixtures::sample_dictionary()),
    }
}

fn build_lexical(config: &Config, backend: &BackendArgs) -> Result<Arc<dyn LexicalIndex>> {
    if backend.live {
        let base = backend
            .lexical_base
            .clone()
            .unwrap_or_else(|| config.lexical_base_url.clone());
        let index = HttpLexicalIndex::new(base, config.lexical_index_name.clone())?;
        Ok(Arc::new(index))
    } else {
        Ok(Arc::new(StaticLexicalIndex::new(fixtures::sample_corpus())))
    }
}

fn build_dense(config: &Config, backend: &BackendArgs) -> Arc<dyn DenseIndex> {
    let vector_path = backend.dense_index.clone().or_else(|| config.dense_index_path.clone());
    let meta_path = backend.dense_meta.clone().or_else(|| config.dense_meta_path.clone());
    let encoder = Box::new(HashingEncoder::new(256));
    match (vector_path, meta_path) {
        (Some(vector_path), Some(meta_path)) => {
            Arc::new(FlatInnerProductIndex::load(&vector_path, &meta_path, encoder))
        }
        _ => Arc::new(FlatInnerProductIndex::not_ready(encoder)),
    }
}

fn load_profile(path: &PathBuf) -> Result<PatientProfile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading patient profile from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing patient profile JSON from {}", path.display()))
}

fn rank_options(
    filters: RankFilters,
    candidate_size: usize,
    page: usize,
    size: usize,
    feasibility_weight: f64,
    bm25_weight: f64,
) -> RankOptions {
    RankOptions {
        page,
        page_size: size,
        candidate_size,
        bm25_weight,
        feasibility_weight,
        use_candidate_total: true,
        filters,
    }
}

async fn run_rank(args: RankArgs) -> Result<String> {
    let config = Config::from_env();
    let lexical = build_lexical(&config, &args.backend)?;
    let dense = build_dense(&config, &args.backend);
    let dictionary = Arc::new(load_dictionary(&args.backend.dictionary)?);
    let orchestrator = Orchestrator::new(lexical, dense, dictionary);

    let profile = load_profile(&args.profile)?;
    let filters = RankFilters {
        phase: args.phase,
        overall_status: args.status,
        condition: args.condition,
        country: args.country,
    };
    let options = rank_options(
        filters,
        args.candidate_size,
        args.page,
        args.size,
        args.feasibility_weight,
        args.bm25_weight,
    );

    let response = orchestrator
        .rank(&profile, &options, &CancellationToken::new())
        .await?;

    if args.json {
        Ok(render::json::to_pretty(&response)?)
    } else {
        Ok(render::markdown::search_response_markdown(&response)?)
    }
}

async fn run_search(args: SearchArgs) -> Result<String> {
    let config = Config::from_env();
    let lexical = build_lexical(&config, &args.backend)?;
    let dense = build_dense(&config, &args.backend);
    let dictionary = Arc::new(load_dictionary(&args.backend.dictionary)?);
    let orchestrator = Orchestrator::new(lexical, dense, dictionary);

    let filters = RankFilters {
        phase: args.phase,
        overall_status: args.status,
        condition: args.condition,
        country: args.country,
    };
    let candidate_size = (args.page * args.size).max(50);
    let options = rank_options(filters, candidate_size, args.page, args.size, 0.0, args.bm25_weight);

    let response = orchestrator
        .search(args.query.as_deref(), &options, &CancellationToken::new())
        .await?;

    if args.json {
        Ok(render::json::to_pretty(&response)?)
    } else {
        Ok(render::markdown::search_response_markdown(&response)?)
    }
}

fn run_parse(args: ParseArgs) -> Result<String> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading eligibility text from {}", args.file.display()))?;
    let dictionary = load_dictionary(&args.dictionary)?;
    let metadata = args
        .trial
        .as_deref()
        .and_then(|nct_id| fixtures::sample_corpus().into_iter().find(|d| d.nct_id == nct_id))
        .map(|doc| doc.metadata())
        .unwrap_or_else(TrialMetadata::default);

    let parsed = crate::parser::parse(&text, &metadata, &dictionary);
    if args.json {
        Ok(render::json::to_pretty(&parsed)?)
    } else {
        Ok(render::markdown::parsed_criteria_markdown(&parsed))
    }
}

fn run_score(args: ScoreArgs) -> Result<String> {
    let profile = load_profile(&args.profile)?;
    let dictionary = load_dictionary(&args.dictionary)?;
    let trial = fixtures::sample_corpus()
        .into_iter()
        .find(|d| d.nct_id == args.trial)
        .with_context(|| format!("no trial {} in the sample corpus", args.trial))?;

    let metadata = trial.metadata();
    let raw_text = trial.eligibility_criteria_raw.as_deref().unwrap_or("");
    let parsed = trial
        .parsed_criteria
        .clone()
        .unwrap_or_else(|| crate::parser::parse(raw_text, &metadata, &dictionary));

    let result = crate::scorer::score(&profile, &parsed, &metadata, &Default::default());
    if args.json {
        #[derive(serde::Serialize)]
        struct ScoreJson<'a> {
            score: u8,
            is_feasible: &'a crate::model::Feasibility,
            reasons: &'a [String],
        }
        Ok(render::json::to_pretty(&ScoreJson {
            score: result.score,
            is_feasible: &result.is_feasible,
            reasons: &result.reasons,
        })?)
    } else {
        Ok(render::markdown::feasibility_result_markdown(&result))
    }
}

async fn run_health(args: HealthArgs) -> Result<String> {
    let config = Config::from_env();
    let report = health::check(&config).await;
    if args.json {
        Ok(render::json::to_pretty(&report)?)
    } else {
        Ok(report.to_markdown())
    }
}

/// Dispatches a parsed `Cli` to the matching subcommand, returning the rendered
/// output the caller prints to stdout.
pub async fn run(cli: Cli) -> Result<String> {
    match cli.command {
        Commands::Rank(args) => run_rank(args).await,
        Commands::Search(args) => run_search(args).await,
        Commands::Parse(args) => run_parse(args),
        Commands::Score(args) => run_score(args),
        Commands::Health(args) => run_health(args).await,
    }
}
