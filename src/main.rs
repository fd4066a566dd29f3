//! Drover CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use drover::{
    drive, probe, rng_from_seed, Catalog, ChainContext, Config, DriveOptions, DroverDuration,
    DroverError, ExitStatus, Generator, HttpBackend, HttpDispatcher, Reporter, ResolverContext,
    SpecDocument,
};

#[derive(Debug, Parser)]
#[command(name = "drover")]
#[command(about = "specification-driven API exerciser with coverage feedback")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "drover.toml")]
    config: PathBuf,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive the documented endpoints against a running target
    Run {
        /// Spec document (overrides the config's spec_path).
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Target base URL (overrides the config).
        #[arg(long)]
        base_url: Option<String>,

        /// Iteration bound; omit to run until externally stopped.
        #[arg(long)]
        iterations: Option<u64>,

        /// Seed for synthetic data (or to make a run reproducible).
        #[arg(long)]
        seed: Option<u64>,

        /// Delay between iterations.
        #[arg(long)]
        pace: Option<DroverDuration>,

        /// Per-call timeout.
        #[arg(long)]
        timeout: Option<DroverDuration>,

        /// Reporter format.
        #[arg(long, default_value = "pretty")]
        reporter: Reporter,

        /// HTTP backend for issued calls.
        #[arg(long)]
        http_backend: Option<HttpBackend>,
    },

    /// Print the endpoint catalog derived from a spec
    Catalog {
        #[arg(long)]
        spec: Option<PathBuf>,
    },

    /// Print a synthesized payload for a named definition
    Generate {
        definition: String,

        #[arg(long)]
        spec: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Issue one coverage probe against the target
    Probe {
        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        timeout: Option<DroverDuration>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        // Tracing is best-effort; if it fails, we still continue.
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Run {
            spec,
            base_url,
            iterations,
            seed,
            pace,
            timeout,
            reporter,
            http_backend,
        } => {
            let mut config = config.clone();
            if let Some(spec) = spec {
                config.spec_path = spec.clone();
            }
            if let Some(base_url) = base_url {
                config.base_url = base_url.clone();
            }

            let spec = SpecDocument::load_file(&config.spec_path)?;
            let catalog = Catalog::build(&spec)?;

            let timeout = match timeout {
                Some(d) => d.0,
                None => config.timeout()?,
            };
            let pace = match pace {
                Some(d) => Some(d.0),
                None => Some(config.pace()?),
            };
            let backend = http_backend.unwrap_or(config.http_backend);
            let mut dispatcher = match backend {
                HttpBackend::Host => {
                    HttpDispatcher::host(&config.base_url, timeout, config.auth_token.clone())
                }
                HttpBackend::Scripted => HttpDispatcher::scripted(),
            };

            let stop = AtomicBool::new(false);
            let outcome = drive(
                &config,
                &catalog,
                &mut dispatcher,
                &DriveOptions {
                    iterations: *iterations,
                    seed: *seed,
                    pace,
                    reporter: *reporter,
                },
                &stop,
            )?;
            print_summary(cli, *reporter, &outcome.summary)?;
            Ok(exit_code_for_status(outcome.summary.status))
        }

        Command::Catalog { spec } => {
            let path = spec.as_ref().unwrap_or(&config.spec_path);
            let spec = SpecDocument::load_file(path)?;
            let catalog = Catalog::build(&spec)?;
            if cli.json {
                println!("{}", serde_json::to_string(&catalog.endpoints)?);
            } else {
                for endpoint in &catalog.endpoints {
                    println!("{}", endpoint.pretty());
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Generate {
            definition,
            spec,
            seed,
        } => {
            let path = spec.as_ref().unwrap_or(&config.spec_path);
            let spec = SpecDocument::load_file(path)?;
            let node = spec.definitions().get(definition).ok_or_else(|| {
                DroverError::InvalidArgument(format!("no definition named {definition:?}"))
            })?;
            let resolver = ResolverContext::new(spec.definitions());
            let resolved = resolver.resolve(node)?;

            let generator = Generator::new();
            let ctx = ChainContext::default();
            let mut rng = rng_from_seed(seed.unwrap_or_else(drover::gen_seed));
            let value = generator.generate(&resolved, None, &ctx, &mut rng)?;
            if cli.json {
                println!("{}", serde_json::to_string(&value)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Probe { base_url, timeout } => {
            let base_url = base_url.as_ref().unwrap_or(&config.base_url);
            let timeout = match timeout {
                Some(d) => d.0,
                None => config.timeout()?,
            };
            let mut dispatcher =
                HttpDispatcher::host(base_url, timeout, config.auth_token.clone());
            let snapshot = probe(&mut dispatcher, &config.coverage_path)?;
            if cli.json {
                println!("{}", serde_json::to_string(&snapshot)?);
            } else {
                println!("{}", snapshot.pretty());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_summary(
    cli: &Cli,
    reporter: Reporter,
    summary: &drover::DriveSummary,
) -> anyhow::Result<()> {
    if cli.json || matches!(reporter, Reporter::Json) {
        println!("{}", serde_json::to_string(summary)?);
    } else {
        println!("{}", summary.pretty());
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}

fn exit_code_for_status(status: ExitStatus) -> ExitCode {
    match status {
        ExitStatus::Pass => ExitCode::SUCCESS,
        ExitStatus::Fail => ExitCode::from(1),
        ExitStatus::Error => ExitCode::from(2),
    }
}
