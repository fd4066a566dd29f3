//! Coverage endpoint probing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{is_success, DroverError, DroverResult, HttpDispatcher};

/// Point-in-time executed/total ratio reported by the target. The target
/// also sends a preformatted percentage string; the ratio is recomputed from
/// the counts instead of trusting it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub covered: u64,
    pub total: u64,
    pub percentage: f64,
}

impl CoverageSnapshot {
    pub fn from_counts(covered: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            100.0 * covered as f64 / total as f64
        };
        Self {
            covered,
            total,
            percentage,
        }
    }

    pub fn pretty(&self) -> String {
        format!("{}/{} ({:.2}%)", self.covered, self.total, self.percentage)
    }
}

/// One GET to the target's coverage endpoint. Every failure mode maps to
/// `CoverageUnavailable`; the caller logs and moves on.
pub fn probe(dispatcher: &mut HttpDispatcher, coverage_path: &str) -> DroverResult<CoverageSnapshot> {
    let response = dispatcher
        .dispatch("GET", coverage_path, None)
        .map_err(|err| DroverError::CoverageUnavailable(err.to_string()))?;
    if !is_success(response.status) {
        return Err(DroverError::CoverageUnavailable(format!(
            "GET {coverage_path} returned status {}",
            response.status
        )));
    }

    let value: Value = serde_json::from_str(&response.body).map_err(|err| {
        DroverError::CoverageUnavailable(format!("malformed coverage body: {err}"))
    })?;
    let covered = value.get("count").and_then(Value::as_u64).ok_or_else(|| {
        DroverError::CoverageUnavailable("coverage body has no integer `count`".to_string())
    })?;
    let total = value.get("stmt").and_then(Value::as_u64).ok_or_else(|| {
        DroverError::CoverageUnavailable("coverage body has no integer `stmt`".to_string())
    })?;
    Ok(CoverageSnapshot::from_counts(covered, total))
}
