//! case-harvest: entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use case_harvest::renderer::chromium::ChromiumDriver;
use case_harvest::sink::{RecordSink, SqliteSink};
use case_harvest::solver::{CaptchaSolver, RemoteSolver};
use case_harvest::{HarvestConfig, Harvester, PortalKind, PortalProfile};
use case_harvest_cli::config::{resolve_database, resolve_output_root, resolve_solver_url};
use case_harvest_cli::doctor;
use case_harvest_cli::prompt::PromptSolver;

const SOLVER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "case-harvest",
    about = "Extract case records and documents from court case portals",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more cases by CNR number.
    Fetch {
        /// CNR numbers to look up.
        #[arg(required = true)]
        cnr: Vec<String>,

        /// Portal to query (district, high, supreme).
        #[arg(short, long, default_value = "district")]
        portal: String,

        /// Output root for case directories.
        /// Also reads from CASE_HARVEST_OUTPUT.
        #[arg(short, long)]
        output: Option<String>,

        /// SQLite database for persisted records.
        /// Also reads from CASE_HARVEST_DB.
        #[arg(long)]
        db: Option<String>,

        /// Do not persist records.
        #[arg(long)]
        no_db: bool,

        /// Remote CAPTCHA solver endpoint. Without one the CAPTCHA is prompted for.
        /// Also reads from CASE_HARVEST_SOLVER_URL.
        #[arg(long)]
        solver_url: Option<String>,

        /// JSON file with run settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON file with portal profiles overriding the built-ins.
        #[arg(long)]
        profile_file: Option<PathBuf>,

        /// Parallel document downloads (1-8).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Abort a lookup after this many seconds.
        #[arg(long)]
        deadline: Option<u64>,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,

        /// Skip the business-history note.
        #[arg(long)]
        skip_history: bool,
    },

    /// Print portal profiles as JSON.
    Profiles {
        /// JSON file with portal profiles overriding the built-ins.
        #[arg(long)]
        profile_file: Option<PathBuf>,
    },

    /// Check that Chromium and the output locations are usable.
    Doctor {
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long)]
        db: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   case-harvest completions bash > ~/.local/share/bash-completion/completions/case-harvest
    ///   case-harvest completions zsh > ~/.zfunc/_case-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_profiles(path: Option<&PathBuf>) -> anyhow::Result<Vec<PortalProfile>> {
    match path {
        Some(path) => PortalProfile::load_file(path)
            .with_context(|| format!("failed to load profiles from {}", path.display())),
        None => Ok(Vec::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Fetch {
            cnr,
            portal,
            output,
            db,
            no_db,
            solver_url,
            config,
            profile_file,
            concurrency,
            deadline,
            headed,
            skip_history,
        } => {
            let kind: PortalKind = portal.parse()?;
            let mut cfg = match &config {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str::<HarvestConfig>(&raw)
                        .with_context(|| format!("invalid config {}", path.display()))?
                }
                None => HarvestConfig::default(),
            };
            if output.is_some() || config.is_none() {
                cfg.output_root = resolve_output_root(output.as_deref());
            }
            cfg.database = (!no_db).then(|| resolve_database(db.as_deref()));
            if let Some(n) = concurrency {
                cfg.concurrency = n;
            }
            if deadline.is_some() {
                cfg.deadline_secs = deadline;
            }
            cfg.headless = cfg.headless && !headed;
            cfg.skip_history = cfg.skip_history || skip_history;

            let overrides = load_profiles(profile_file.as_ref())?;
            let profile = PortalProfile::select(kind, &overrides);

            let solver: Arc<dyn CaptchaSolver> = match resolve_solver_url(solver_url.as_deref()) {
                Some(url) => Arc::new(
                    RemoteSolver::new(&url, SOLVER_TIMEOUT)
                        .with_context(|| format!("invalid solver endpoint {url}"))?,
                ),
                None => Arc::new(PromptSolver::new(cfg.output_root.join("captcha.png"))),
            };

            let headless = cfg.headless;
            let sink = match &cfg.database {
                Some(path) => {
                    let sink = SqliteSink::open(path, profile.persist.clone())
                        .with_context(|| format!("failed to open database {}", path.display()))?;
                    Some(Arc::new(sink) as Arc<dyn RecordSink>)
                }
                None => None,
            };
            let mut harvester = Harvester::new(profile, cfg, solver)?;
            if let Some(sink) = sink {
                harvester = harvester.with_sink(sink);
            }

            let mut failed = 0usize;
            for id in &cnr {
                let driver = ChromiumDriver::launch(headless)
                    .await
                    .context("failed to start Chromium")?;
                match harvester.run(Arc::new(driver), id).await {
                    Ok(run) => {
                        println!(
                            "{id}: {} fields, {} documents, {} gaps -> {}",
                            run.report.fields,
                            run.report.documents.len(),
                            run.report.gaps.len(),
                            run.storage.dir().display()
                        );
                    }
                    Err(e) => {
                        tracing::error!(cnr = %id, error = %e, "case lookup failed");
                        eprintln!("{id}: {e}");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Profiles { profile_file } => {
            let overrides = load_profiles(profile_file.as_ref())?;
            let profiles: Vec<PortalProfile> = PortalKind::ALL
                .into_iter()
                .map(|kind| PortalProfile::select(kind, &overrides))
                .collect();
            println!("{}", serde_json::to_string_pretty(&profiles)?);
        }

        Commands::Doctor { output, db } => {
            let ready = doctor::run(
                &resolve_output_root(output.as_deref()),
                &resolve_database(db.as_deref()),
            )?;
            if !ready {
                std::process::exit(1);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "case-harvest", &mut std::io::stdout());
        }
    }

    Ok(())
}
