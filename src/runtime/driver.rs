//! Top-level drive loop: build the plan once, then iterate lifecycle passes
//! and coverage probes until the bound or stop flag is hit.

use uuid::Uuid;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::{
    gen_seed, probe, rng_from_seed, run_iteration, wall_time_iso_utc, Catalog, ChainContext,
    Config, CoverageSnapshot, DriveSummary, DroverResult, ExitStatus, Finding, FindingKind,
    Generator, HttpDispatcher, IterationCounts, IterationReport, LifecyclePlan, Reporter,
    RunIdentity,
};

#[derive(Debug, Clone)]
pub struct DriveOptions {
    /// Iteration bound; `None` runs until the stop flag is raised.
    pub iterations: Option<u64>,
    pub seed: Option<u64>,
    /// Delay between iterations.
    pub pace: Option<Duration>,
    pub reporter: Reporter,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            iterations: None,
            seed: None,
            pace: None,
            reporter: Reporter::Pretty,
        }
    }
}

#[derive(Debug)]
pub struct DriveOutcome {
    pub summary: DriveSummary,
    pub reports: Vec<IterationReport>,
}

/// Run the drive loop. Startup failures (no usable plan) are errors;
/// everything that happens inside an iteration is recorded and survived.
pub fn drive(
    config: &Config,
    catalog: &Catalog,
    dispatcher: &mut HttpDispatcher,
    opt: &DriveOptions,
    stop: &AtomicBool,
) -> DroverResult<DriveOutcome> {
    let seed = opt.seed.unwrap_or_else(gen_seed);
    let run_id = Uuid::new_v4().to_string();
    let started_at = wall_time_iso_utc();
    let started = Instant::now();

    let plan = LifecyclePlan::from_catalog(&catalog.endpoints)?;
    let generator = Generator::new();
    let mut rng = rng_from_seed(seed);

    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut findings: Vec<Finding> = Vec::new();
    let mut coverage: Option<CoverageSnapshot> = None;
    let mut reports: Vec<IterationReport> = Vec::new();
    let mut carried: Option<(String, serde_json::Value)> = None;

    let mut iteration = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("stop requested after {iteration} iterations");
            break;
        }
        if let Some(limit) = opt.iterations {
            if iteration >= limit {
                break;
            }
        }
        iteration += 1;

        let mut ctx = ChainContext::default();
        if let Some((name, value)) = &carried {
            ctx.bind(name.clone(), value.clone());
        }

        match run_iteration(
            &plan,
            &generator,
            dispatcher,
            &config.id_field,
            &mut ctx,
            &mut rng,
        ) {
            Ok(report) => {
                if report.completed {
                    completed += 1;
                } else {
                    failed += 1;
                }
                if let Some(name) = &config.carry {
                    if let Some(value) = ctx.get(name) {
                        carried = Some((name.clone(), value.clone()));
                    }
                }
                findings.extend(report.findings.iter().cloned());
                reports.push(report);
            }
            Err(err) => {
                failed += 1;
                tracing::warn!("iteration {iteration} aborted: {err}");
                findings.push(Finding {
                    kind: FindingKind::Transport,
                    title: "iteration_error".to_string(),
                    message: err.to_string(),
                });
            }
        }

        match probe(dispatcher, &config.coverage_path) {
            Ok(snapshot) => {
                tracing::info!(
                    covered = snapshot.covered,
                    total = snapshot.total,
                    percentage = snapshot.percentage,
                    "coverage"
                );
                coverage = Some(snapshot);
            }
            Err(err) => {
                tracing::warn!("coverage probe failed: {err}");
                findings.push(Finding {
                    kind: FindingKind::Coverage,
                    title: "coverage_unavailable".to_string(),
                    message: err.to_string(),
                });
            }
        }

        let more_to_do =
            opt.iterations.map_or(true, |limit| iteration < limit) && !stop.load(Ordering::Relaxed);
        if let (Some(pace), true) = (opt.pace, more_to_do) {
            std::thread::sleep(pace);
        }
    }

    // Terminal convenience: tell a bounded target to shut itself down.
    if let (Some(exit_path), Some(_)) = (&config.exit_path, opt.iterations) {
        if let Err(err) = dispatcher.dispatch("GET", exit_path, None) {
            tracing::warn!("exit call failed: {err}");
        }
    }

    let status = if failed == 0 {
        ExitStatus::Pass
    } else {
        ExitStatus::Fail
    };
    let summary = DriveSummary {
        status,
        identity: RunIdentity { run_id, seed },
        started_at,
        finished_at: wall_time_iso_utc(),
        duration_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
        iterations: IterationCounts { completed, failed },
        coverage,
        findings,
    };
    Ok(DriveOutcome { summary, reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpBackend, ScriptedRule, SpecDocument};

    fn widget_catalog() -> Catalog {
        let doc = serde_json::json!({
            "paths": {
                "/widget": {
                    "post": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}
                    }
                },
                "/widget/{id}": {
                    "get": {"responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}},
                    "put": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}
                    },
                    "delete": {"responses": {"200": {"description": "gone"}}}
                }
            },
            "definitions": {
                "WidgetInput": {"type": "object", "properties": {"name": {"type": "string"}}},
                "Widget": {"type": "object", "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "string"}
                }}
            }
        });
        let spec = SpecDocument::parse(doc.to_string().as_bytes()).expect("spec");
        Catalog::build(&spec).expect("catalog")
    }

    fn scripted_target() -> HttpDispatcher {
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new("post", "/widget", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("put", "/widget/7", 200, "{}"));
        dispatcher.script(ScriptedRule::new("get", "/widget/7", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("delete", "/widget/7", 200, "\"gone\""));
        dispatcher.script(ScriptedRule::new(
            "get",
            "/coverage",
            200,
            r#"{"count": 40, "stmt": 50, "coverage": "80.00%"}"#,
        ));
        dispatcher
    }

    #[test]
    fn bounded_drive_passes_and_probes_coverage_each_iteration() {
        let catalog = widget_catalog();
        let mut dispatcher = scripted_target();
        assert_eq!(dispatcher.backend(), HttpBackend::Scripted);
        let config = Config::default();
        let stop = AtomicBool::new(false);
        let outcome = drive(
            &config,
            &catalog,
            &mut dispatcher,
            &DriveOptions {
                iterations: Some(2),
                seed: Some(7),
                pace: None,
                reporter: Reporter::Json,
            },
            &stop,
        )
        .expect("drive");

        assert_eq!(outcome.summary.status, ExitStatus::Pass);
        assert_eq!(outcome.summary.iterations.completed, 2);
        assert_eq!(outcome.summary.iterations.failed, 0);
        let coverage = outcome.summary.coverage.expect("coverage");
        assert_eq!(coverage.percentage, 80.0);
        let probes = dispatcher
            .calls()
            .iter()
            .filter(|c| c.path == "/coverage")
            .count();
        assert_eq!(probes, 2);
    }

    #[test]
    fn raised_stop_flag_prevents_any_iteration() {
        let catalog = widget_catalog();
        let mut dispatcher = scripted_target();
        let config = Config::default();
        let stop = AtomicBool::new(true);
        let outcome = drive(
            &config,
            &catalog,
            &mut dispatcher,
            &DriveOptions {
                iterations: None,
                seed: Some(7),
                pace: None,
                reporter: Reporter::Json,
            },
            &stop,
        )
        .expect("drive");
        assert_eq!(outcome.reports.len(), 0);
        assert!(dispatcher.calls().is_empty());
    }

    #[test]
    fn coverage_failure_is_survived() {
        let catalog = widget_catalog();
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new("post", "/widget", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("put", "/widget/7", 200, "{}"));
        dispatcher.script(ScriptedRule::new("get", "/widget/7", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("delete", "/widget/7", 200, "\"gone\""));
        // No /coverage rule: every probe fails.
        let config = Config::default();
        let stop = AtomicBool::new(false);
        let outcome = drive(
            &config,
            &catalog,
            &mut dispatcher,
            &DriveOptions {
                iterations: Some(1),
                seed: Some(7),
                pace: None,
                reporter: Reporter::Json,
            },
            &stop,
        )
        .expect("drive");
        assert_eq!(outcome.summary.iterations.completed, 1);
        assert!(outcome.summary.coverage.is_none());
        assert!(outcome
            .summary
            .findings
            .iter()
            .any(|f| f.title == "coverage_unavailable"));
    }

    #[test]
    fn exit_path_is_called_after_a_bounded_run() {
        let catalog = widget_catalog();
        let mut dispatcher = scripted_target();
        dispatcher.script(ScriptedRule::new("get", "/exit", 200, "\"bye\""));
        let config = Config {
            exit_path: Some("/exit".to_string()),
            ..Config::default()
        };
        let stop = AtomicBool::new(false);
        drive(
            &config,
            &catalog,
            &mut dispatcher,
            &DriveOptions {
                iterations: Some(1),
                seed: Some(7),
                pace: None,
                reporter: Reporter::Json,
            },
            &stop,
        )
        .expect("drive");
        assert!(dispatcher.calls().iter().any(|c| c.path == "/exit"));
    }
}
