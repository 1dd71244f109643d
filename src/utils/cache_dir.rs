use std::path::PathBuf;

/// XDG-ish cache directory for the lexical HTTP client's on-disk cache
/// (grounded on `examples/fei0810-biomcp/src/utils/download.rs::biomcp_cache_dir`).
pub fn trialrank_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("trialrank"),
        None => std::env::temp_dir().join("trialrank"),
    }
}
