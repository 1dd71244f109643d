//! Output rendering for the demonstration CLI: Markdown tables by default, raw JSON
//! behind `--json`.

pub mod json;
pub mod markdown;
