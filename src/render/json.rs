//! Raw JSON rendering, selected with the CLI's `--json` flag.

use serde::Serialize;

use crate::error::TrialRankError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, TrialRankError> {
    Ok(serde_json::to_string_pretty(value)?)
}
