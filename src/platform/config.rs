//! `drover.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{parse_duration, DroverResult, HttpBackend, Reporter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Base URL of the target API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Spec document the catalog is built from.
    #[serde(default = "default_spec_path")]
    pub spec_path: PathBuf,

    /// Coverage report endpoint on the target.
    #[serde(default = "default_coverage_path")]
    pub coverage_path: String,

    /// Optional terminal endpoint invoked after a bounded run.
    #[serde(default)]
    pub exit_path: Option<String>,

    /// Per-call timeout (e.g. "10s").
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Delay between iterations (e.g. "500ms").
    #[serde(default = "default_pace")]
    pub pace: String,

    /// Bearer token attached to every request when set.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Dot-path of the correlation field in create responses.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Chain variable retained across iterations.
    #[serde(default)]
    pub carry: Option<String>,

    /// HTTP backend for issued calls.
    #[serde(default = "default_http_backend")]
    pub http_backend: HttpBackend,

    /// Default reporter for CLI commands.
    #[serde(default = "default_reporter")]
    pub reporter: Reporter,
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_spec_path() -> PathBuf {
    PathBuf::from("swagger.json")
}

fn default_coverage_path() -> String {
    "/coverage".to_string()
}

fn default_timeout() -> String {
    "10s".to_string()
}

fn default_pace() -> String {
    "500ms".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_http_backend() -> HttpBackend {
    HttpBackend::Host
}

fn default_reporter() -> Reporter {
    Reporter::Pretty
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            spec_path: default_spec_path(),
            coverage_path: default_coverage_path(),
            exit_path: None,
            timeout: default_timeout(),
            pace: default_pace(),
            auth_token: None,
            id_field: default_id_field(),
            carry: None,
            http_backend: default_http_backend(),
            reporter: default_reporter(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> DroverResult<Duration> {
        parse_duration(&self.timeout)
    }

    pub fn pace(&self) -> DroverResult<Duration> {
        parse_duration(&self.pace)
    }
}
