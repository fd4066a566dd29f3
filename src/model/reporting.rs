//! Run reporting types and renderers.

use serde::{Deserialize, Serialize};

use std::time::SystemTime;

use crate::CoverageSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Pass,
    Fail,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Transport,
    Status,
    Correlation,
    Coverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationCounts {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSummary {
    pub status: ExitStatus,
    pub identity: RunIdentity,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub iterations: IterationCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

impl DriveSummary {
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "status={:?} runId={} seed={}\n",
            self.status, self.identity.run_id, self.identity.seed
        ));
        out.push_str(&format!(
            "iterations: completed={} failed={}\n",
            self.iterations.completed, self.iterations.failed
        ));
        match &self.coverage {
            Some(snapshot) => out.push_str(&format!("coverage: {}\n", snapshot.pretty())),
            None => out.push_str("coverage: unavailable\n"),
        }
        for finding in &self.findings {
            out.push_str(&format!(
                "  [{:?}] {}: {}\n",
                finding.kind, finding.title, finding.message
            ));
        }
        out.trim_end().to_string()
    }
}

/// Wall-clock stamp for run metadata, never for execution decisions.
pub fn wall_time_iso_utc() -> String {
    let now = SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
