use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use codemeter_core::analyzer::AnalyzerRegistry;
use codemeter_core::config::{Config, CONFIG_FILE};
use codemeter_core::language::detect_language;
use codemeter_go::GoAnalyzer;
use codemeter_report::{json, text};
use codemeter_service::memory::{
    InMemoryCache, InMemoryEventBus, InMemoryJobStore, InMemoryMetricsStore,
};
use codemeter_service::{AnalysisJob, AnalysisOrchestrator, Collaborators, JobStatus};

mod fs;

use fs::FsProjectLookup;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "codemeter")]
#[command(about = "Measure complexity, maintainability, and technical debt of a codebase")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a directory and print a metrics report
    Analyze {
        /// Path to the project root
        path: PathBuf,
        /// Config file path (defaults to .codemeter.toml in the project or a parent)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the detected language of a file
    Detect {
        file: PathBuf,
    },
    /// Create a default .codemeter.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            path,
            config,
            format,
        } => cmd_analyze(&path, config.as_deref(), format).await,
        Commands::Detect { file } => cmd_detect(&file),
        Commands::Init { force } => cmd_init(force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

async fn cmd_analyze(path: &Path, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(path, config_path)?;
    init_tracing(&config.logging.level);

    let root = path
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let job = run_analysis(root, &config, format).await?;
    if job.status != JobStatus::Completed {
        process::exit(1);
    }
    Ok(())
}

async fn run_analysis(root: PathBuf, config: &Config, format: OutputFormat) -> Result<AnalysisJob> {
    let projects = Arc::new(FsProjectLookup::new(root));
    let metrics = Arc::new(InMemoryMetricsStore::new());
    let collaborators = Collaborators {
        projects: projects.clone(),
        jobs: Arc::new(InMemoryJobStore::new()),
        metrics: metrics.clone(),
        cache: Arc::new(InMemoryCache::new()),
        events: Arc::new(InMemoryEventBus::new()),
    };

    let go = GoAnalyzer::new().context("failed to initialize Go analyzer")?;
    let registry = AnalyzerRegistry::new().with(Arc::new(go));
    let orchestrator = AnalysisOrchestrator::new(registry, collaborators, config);
    debug!(workers = orchestrator.worker_count(), "orchestrator ready");

    let started = orchestrator.start_analysis(projects.project_id()).await?;
    let job = wait_for_job(&orchestrator, &started.id).await?;

    let saved = metrics.get(&job.id);
    let (results, aggregate) = match &saved {
        Some(s) => (s.results.as_slice(), Some(&s.aggregate)),
        None => (&[][..], None),
    };

    let report = match format {
        OutputFormat::Text => text::format_report(&job, results, aggregate),
        OutputFormat::Json => {
            json::format_report(&job, results, aggregate, false).context("failed to encode report")?
        }
    };
    println!("{report}");

    Ok(job)
}

/// Poll until the job finishes. The first Ctrl-C cancels it.
async fn wait_for_job(orchestrator: &AnalysisOrchestrator, job_id: &str) -> Result<AnalysisJob> {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let job = orchestrator.get_analysis(job_id).await?;
                if job.status.is_terminal() {
                    return Ok(job);
                }
            }
            signal = &mut ctrl_c, if !cancel_requested => {
                signal.context("failed to listen for Ctrl-C")?;
                cancel_requested = true;
                eprintln!("{}", "Cancelling analysis...".yellow());
                orchestrator.cancel_analysis(job_id).await?;
            }
        }
    }
}

fn cmd_detect(file: &Path) -> Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    println!("{}", detect_language(file, &content));
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

fn load_config(project_path: &Path, config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(p) => Config::load(p),
        None => Config::load_or_default(project_path),
    }
}

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
