//! `health` subcommand: read-only diagnostic of the lexical backend and dense
//! artifacts. Not part of the ranking contract itself.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::TrialRankError;
use crate::retrieval::{FlatInnerProductIndex, HashingEncoder};

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub component: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Health Check\n\n");
        out.push_str("| Component | Status | Latency |\n");
        out.push_str("|-----------|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.component, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} components healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

fn health_http_client() -> Result<reqwest::Client, TrialRankError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("trialrank-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(TrialRankError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| TrialRankError::LexicalBackend("health HTTP client init race".into())),
    }
}

async fn check_lexical_backend(config: &Config) -> HealthRow {
    let start = Instant::now();
    let client = match health_http_client() {
        Ok(client) => client,
        Err(err) => {
            return HealthRow {
                component: "Lexical backend".to_string(),
                status: "error".to_string(),
                latency: err.to_string(),
            };
        }
    };

    let url = format!(
        "{}/{}/_search?size=0",
        config.lexical_base_url.trim_end_matches('/'),
        config.lexical_index_name
    );
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => HealthRow {
            component: format!("Lexical backend ({})", config.lexical_base_url),
            status: "ok".to_string(),
            latency: format!("{}ms", start.elapsed().as_millis()),
        },
        Ok(resp) => HealthRow {
            component: format!("Lexical backend ({})", config.lexical_base_url),
            status: "error".to_string(),
            latency: format!("HTTP {}", resp.status()),
        },
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                component: format!("Lexical backend ({})", config.lexical_base_url),
                status: "error".to_string(),
                latency: reason.to_string(),
            }
        }
    }
}

fn check_dense_artifacts(config: &Config) -> HealthRow {
    let start = Instant::now();
    match (&config.dense_index_path, &config.dense_meta_path) {
        (Some(vector_path), Some(meta_path)) => {
            let index = FlatInnerProductIndex::load(
                vector_path,
                meta_path,
                Box::new(HashingEncoder::new(256)),
            );
            if index.is_ready() {
                HealthRow {
                    component: "Dense artifacts".to_string(),
                    status: "ok".to_string(),
                    latency: format!("{}ms", start.elapsed().as_millis()),
                }
            } else {
                HealthRow {
                    component: "Dense artifacts".to_string(),
                    status: "not ready".to_string(),
                    latency: format!("{}ms", start.elapsed().as_millis()),
                }
            }
        }
        _ => HealthRow {
            component: "Dense artifacts".to_string(),
            status: "not configured".to_string(),
            latency: "-".to_string(),
        },
    }
}

/// Checks lexical backend reachability and dense artifact loadability. A
/// "not configured"/"not ready" dense row is not counted as unhealthy: the
/// orchestrator treats dense-not-ready as a supported degraded mode.
pub async fn check(config: &Config) -> HealthReport {
    let lexical_row = check_lexical_backend(config).await;
    let dense_row = check_dense_artifacts(config);

    let healthy = usize::from(lexical_row.status == "ok")
        + usize::from(dense_row.status != "error");
    let rows = vec![lexical_row, dense_row];
    HealthReport {
        healthy,
        total: rows.len(),
        rows,
    }
}
