//! Environment-driven configuration.
//!
//! No config-file crate: every setting has a hard default and can be overridden by a
//! single environment variable.

use std::path::PathBuf;

const DEFAULT_LEXICAL_BASE: &str = "http://localhost:9200";
const LEXICAL_BASE_ENV: &str = "TRIALRANK_LEXICAL_BASE";
const LEXICAL_INDEX_ENV: &str = "TRIALRANK_LEXICAL_INDEX";
const DEFAULT_LEXICAL_INDEX: &str = "trials";

const DENSE_INDEX_PATH_ENV: &str = "TRIALRANK_DENSE_INDEX_PATH";
const DENSE_META_PATH_ENV: &str = "TRIALRANK_DENSE_META_PATH";

const SYNONYM_DICT_PATH_ENV: &str = "TRIALRANK_SYNONYM_DICT";
const DEFAULT_SYNONYM_DICT: &str = "clinical_synonyms.json";

const RANK_CANDIDATE_SIZE_ENV: &str = "TRIALRANK_RANK_CANDIDATE_SIZE";
const DEFAULT_RANK_CANDIDATE_SIZE: usize = 1000;
const SEARCH_MIN_CANDIDATE_SIZE_ENV: &str = "TRIALRANK_SEARCH_MIN_CANDIDATE_SIZE";
const DEFAULT_SEARCH_MIN_CANDIDATE_SIZE: usize = 50;

/// Runtime configuration for the lexical/dense backends and the synonym dictionary.
///
/// Constructed once (typically in `main()` or by the embedding server) and shared
/// read-only across requests.
#[derive(Debug, Clone)]
pub struct Config {
    pub lexical_base_url: String,
    pub lexical_index_name: String,
    pub dense_index_path: Option<PathBuf>,
    pub dense_meta_path: Option<PathBuf>,
    pub synonym_dict_path: PathBuf,
    pub rank_candidate_size: usize,
    pub search_min_candidate_size: usize,
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn env_usize(var: &str, default: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Builds configuration from environment variables, falling back to defaults
    /// suitable for a local development stack.
    pub fn from_env() -> Self {
        Self {
            lexical_base_url: env_string(LEXICAL_BASE_ENV, DEFAULT_LEXICAL_BASE),
            lexical_index_name: env_string(LEXICAL_INDEX_ENV, DEFAULT_LEXICAL_INDEX),
            dense_index_path: env_path(DENSE_INDEX_PATH_ENV),
            dense_meta_path: env_path(DENSE_META_PATH_ENV),
            synonym_dict_path: env_path(SYNONYM_DICT_PATH_ENV)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYNONYM_DICT)),
            rank_candidate_size: env_usize(RANK_CANDIDATE_SIZE_ENV, DEFAULT_RANK_CANDIDATE_SIZE),
            search_min_candidate_size: env_usize(
                SEARCH_MIN_CANDIDATE_SIZE_ENV,
                DEFAULT_SEARCH_MIN_CANDIDATE_SIZE,
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lexical_base_url: DEFAULT_LEXICAL_BASE.to_string(),
            lexical_index_name: DEFAULT_LEXICAL_INDEX.to_string(),
            dense_index_path: None,
            dense_meta_path: None,
            synonym_dict_path: PathBuf::from(DEFAULT_SYNONYM_DICT),
            rank_candidate_size: DEFAULT_RANK_CANDIDATE_SIZE,
            search_min_candidate_size: DEFAULT_SEARCH_MIN_CANDIDATE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn default_config_has_sane_pool_sizes() {
        let cfg = Config::default();
        assert!(cfg.rank_candidate_size >= cfg.search_min_candidate_size);
        assert_eq!(cfg.lexical_index_name, "trials");
    }
}
